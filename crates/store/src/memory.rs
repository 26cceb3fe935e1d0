//! DashMap-backed store implementing every collaborator contract.
//! Serves the daemon's single-node mode and the engine tests.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use relance_core::error::{RelanceError, RelanceResult};
use relance_core::store::{CampaignStore, DocumentStore, ExecutionStore, LineStore};
use relance_core::types::{Campaign, Document, Execution, Line, LineStatus};

/// Lock-free concurrent store. The `(campaign, line)` enrollment index
/// enforces one execution per pair; execution updates are versioned.
#[derive(Default)]
pub struct InMemoryStore {
    lines: DashMap<Uuid, Line>,
    campaigns: DashMap<Uuid, Campaign>,
    executions: DashMap<Uuid, Execution>,
    enrollments: DashMap<(Uuid, Uuid), Uuid>,
    documents: DashMap<Uuid, Document>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_line(&self, line: Line) {
        self.lines.insert(line.id, line);
    }

    pub fn insert_campaign(&self, mut campaign: Campaign) {
        campaign.steps.sort_by_key(|s| s.order);
        self.campaigns.insert(campaign.id, campaign);
    }

    pub fn insert_document(&self, document: Document) {
        self.documents.insert(document.id, document);
    }

    pub fn line(&self, id: &Uuid) -> Option<Line> {
        self.lines.get(id).map(|l| l.clone())
    }

    pub fn document(&self, id: &Uuid) -> Option<Document> {
        self.documents.get(id).map(|d| d.clone())
    }

    pub fn execution_for(&self, campaign_id: Uuid, line_id: Uuid) -> Option<Execution> {
        let id = *self.enrollments.get(&(campaign_id, line_id))?;
        self.executions.get(&id).map(|e| e.clone())
    }

    /// Removes a line, leaving its executions dangling.
    pub fn remove_line(&self, id: &Uuid) -> Option<Line> {
        self.lines.remove(id).map(|(_, l)| l)
    }

    pub fn set_campaign_active(&self, id: &Uuid, active: bool) -> bool {
        match self.campaigns.get_mut(id) {
            Some(mut c) => {
                c.is_active = active;
                c.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }

}

#[async_trait]
impl LineStore for InMemoryStore {
    async fn get_line(&self, id: Uuid) -> RelanceResult<Line> {
        self.line(&id)
            .ok_or_else(|| RelanceError::not_found("line", id))
    }

    async fn update_line(&self, line: &Line) -> RelanceResult<Line> {
        let mut stored = self
            .lines
            .get_mut(&line.id)
            .ok_or_else(|| RelanceError::not_found("line", line.id))?;

        if stored.version != line.version {
            return Err(RelanceError::Conflict(format!(
                "line {} is at version {}, update was based on {}",
                line.id, stored.version, line.version
            )));
        }

        *stored = line.clone();
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn list_lines_for_client(&self, client_id: Uuid) -> RelanceResult<Vec<Line>> {
        let mut lines: Vec<Line> = self
            .lines
            .iter()
            .filter(|l| l.client_id == Some(client_id))
            .map(|l| l.value().clone())
            .collect();
        lines.sort_by_key(|l| (l.created_at, l.id));
        Ok(lines)
    }
}

#[async_trait]
impl CampaignStore for InMemoryStore {
    async fn active_tenants(&self) -> RelanceResult<Vec<Uuid>> {
        let mut tenants: Vec<Uuid> = self
            .campaigns
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.tenant_id)
            .collect();
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }

    async fn list_active(&self, tenant_id: Uuid) -> RelanceResult<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|c| c.is_active && c.tenant_id == tenant_id)
            .map(|c| c.value().clone())
            .collect();
        campaigns.sort_by_key(|c| (c.created_at, c.id));
        Ok(campaigns)
    }

    async fn get_campaign(&self, id: Uuid) -> RelanceResult<Campaign> {
        self.campaigns
            .get(&id)
            .map(|c| c.clone())
            .ok_or_else(|| RelanceError::not_found("campaign", id))
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn create_execution(&self, execution: &Execution) -> RelanceResult<()> {
        match self
            .enrollments
            .entry((execution.campaign_id, execution.line_id))
        {
            Entry::Occupied(existing) => Err(RelanceError::Conflict(format!(
                "line {} already enrolled in campaign {} (execution {})",
                execution.line_id,
                execution.campaign_id,
                existing.get()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(execution.id);
                self.executions.insert(execution.id, execution.clone());
                debug!(
                    execution_id = %execution.id,
                    campaign_id = %execution.campaign_id,
                    line_id = %execution.line_id,
                    "Execution created"
                );
                Ok(())
            }
        }
    }

    async fn update_execution(&self, execution: &Execution) -> RelanceResult<Execution> {
        let mut stored = self
            .executions
            .get_mut(&execution.id)
            .ok_or_else(|| RelanceError::not_found("execution", execution.id))?;

        if stored.version != execution.version {
            return Err(RelanceError::Conflict(format!(
                "execution {} is at version {}, update was based on {}",
                execution.id, stored.version, execution.version
            )));
        }

        stored.current_step_order = execution.current_step_order;
        stored.status = execution.status;
        stored.stop_reason = execution.stop_reason;
        stored.last_step_executed_at = execution.last_step_executed_at;
        stored.next_step_scheduled_at = execution.next_step_scheduled_at;
        stored.updated_at = execution.updated_at;
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn find_active(&self) -> RelanceResult<Vec<Execution>> {
        let mut active: Vec<Execution> = self
            .executions
            .iter()
            .filter(|e| e.status.is_active())
            .map(|e| e.value().clone())
            .collect();
        active.sort_by_key(|e| (e.created_at, e.id));
        Ok(active)
    }

    async fn find_unenrolled_lines(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
    ) -> RelanceResult<Vec<Uuid>> {
        let mut pending: Vec<(chrono::DateTime<Utc>, Uuid)> = self
            .lines
            .iter()
            .filter(|l| l.tenant_id == tenant_id && l.status == LineStatus::Pending)
            .filter(|l| !self.enrollments.contains_key(&(campaign_id, l.id)))
            .map(|l| (l.created_at, l.id))
            .collect();
        pending.sort();
        Ok(pending.into_iter().map(|(_, id)| id).collect())
    }

    async fn list_for_campaign(&self, campaign_id: Uuid) -> RelanceResult<Vec<Execution>> {
        let mut execs: Vec<Execution> = self
            .executions
            .iter()
            .filter(|e| e.campaign_id == campaign_id)
            .map(|e| e.value().clone())
            .collect();
        execs.sort_by_key(|e| (e.created_at, e.id));
        Ok(execs)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_document(&self, id: Uuid) -> RelanceResult<Document> {
        self.document(&id)
            .ok_or_else(|| RelanceError::not_found("document", id))
    }

    async fn update_document(&self, document: &Document) -> RelanceResult<()> {
        match self.documents.get_mut(&document.id) {
            Some(mut stored) => {
                *stored = document.clone();
                Ok(())
            }
            None => Err(RelanceError::not_found("document", document.id)),
        }
    }
}
