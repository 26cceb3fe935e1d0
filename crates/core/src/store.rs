//! Collaborator contracts the engines persist through.
//!
//! The engines only ever touch storage via these traits, so the in-memory
//! backend used by the daemon and the tests can be swapped for a database
//! without touching scheduling or matching code.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RelanceResult;
use crate::types::{Campaign, Document, Execution, Line};

#[async_trait]
pub trait LineStore: Send + Sync {
    /// Fails with `NotFound` when the line does not exist.
    async fn get_line(&self, id: Uuid) -> RelanceResult<Line>;
    /// Overwrites the line if `line.version` matches the stored version,
    /// otherwise fails with `Conflict`. Returns the stored row with its
    /// bumped version.
    async fn update_line(&self, line: &Line) -> RelanceResult<Line>;
    /// Every line whose responsible party is `client_id`, in any status.
    async fn list_lines_for_client(&self, client_id: Uuid) -> RelanceResult<Vec<Line>>;
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Tenants owning at least one active campaign.
    async fn active_tenants(&self) -> RelanceResult<Vec<Uuid>>;
    /// Active campaigns of a tenant, steps sorted by order.
    async fn list_active(&self, tenant_id: Uuid) -> RelanceResult<Vec<Campaign>>;
    /// Fails with `NotFound` when the campaign does not exist.
    async fn get_campaign(&self, id: Uuid) -> RelanceResult<Campaign>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Fails with `Conflict` if an execution already exists for the
    /// (campaign, line) pair.
    async fn create_execution(&self, execution: &Execution) -> RelanceResult<()>;
    /// Overwrites the mutable fields if `execution.version` matches the stored
    /// version, otherwise fails with `Conflict`. Returns the stored row with
    /// its bumped version.
    async fn update_execution(&self, execution: &Execution) -> RelanceResult<Execution>;
    /// Executions in status pending or running.
    async fn find_active(&self) -> RelanceResult<Vec<Execution>>;
    /// Pending lines of the tenant with no execution for the campaign.
    async fn find_unenrolled_lines(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
    ) -> RelanceResult<Vec<Uuid>>;
    async fn list_for_campaign(&self, campaign_id: Uuid) -> RelanceResult<Vec<Execution>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, id: Uuid) -> RelanceResult<Document>;
    async fn update_document(&self, document: &Document) -> RelanceResult<()>;
}
