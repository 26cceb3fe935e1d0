use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::OutreachChannel;
use crate::error::{RelanceError, RelanceResult};

// ─── Lines ──────────────────────────────────────────────────────────────────

/// Lifecycle status of a tracked transaction line. Transitions are governed
/// by [`crate::state_machine::LineStateMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Pending,
    Contacted,
    Received,
    Validated,
    Rejected,
    Expired,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Pending => "pending",
            LineStatus::Contacted => "contacted",
            LineStatus::Received => "received",
            LineStatus::Validated => "validated",
            LineStatus::Rejected => "rejected",
            LineStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for LineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bank or ledger transaction still lacking its justificative document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Responsible party: the client who owes the document and receives outreach.
    pub client_id: Option<Uuid>,
    pub amount: Decimal,
    pub transaction_date: NaiveDate,
    pub label: String,
    pub status: LineStatus,
    pub contact_count: u32,
    pub last_contacted_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by the store on every update.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Line {
    pub fn new(
        tenant_id: Uuid,
        client_id: Option<Uuid>,
        amount: Decimal,
        transaction_date: NaiveDate,
        label: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            client_id,
            amount,
            transaction_date,
            label: label.into(),
            status: LineStatus::Pending,
            contact_count: 0,
            last_contacted_at: None,
            version: 0,
            created_at,
            updated_at: created_at,
        }
    }
}

// ─── Documents ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Reconciliation state of a document against the client's open lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    AutoMatched,
    Approved,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::AutoMatched => "auto_matched",
            MatchStatus::Approved => "approved",
            MatchStatus::Rejected => "rejected",
        }
    }
}

/// An inbound justificative plus the fields extracted from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub client_id: Option<Uuid>,
    pub line_id: Option<Uuid>,
    pub file_name: String,
    pub amount: Option<Decimal>,
    pub document_date: Option<NaiveDate>,
    pub vendor: Option<String>,
    pub ocr_status: OcrStatus,
    pub match_status: MatchStatus,
    pub match_confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Structured output of the document extraction collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub client_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub date: Option<NaiveDate>,
    pub vendor: Option<String>,
}

impl Document {
    /// Builds a document from a completed extraction, ready for matching.
    pub fn from_extraction(
        file_name: impl Into<String>,
        extraction: Extraction,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: extraction.client_id,
            line_id: None,
            file_name: file_name.into(),
            amount: extraction.amount,
            document_date: extraction.date,
            vendor: extraction.vendor,
            ocr_status: OcrStatus::Completed,
            match_status: MatchStatus::Pending,
            match_confidence: None,
            created_at,
            updated_at: created_at,
        }
    }
}

// ─── Campaigns ──────────────────────────────────────────────────────────────

/// What enrolls a line into a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignTrigger {
    OnLinePending,
}

/// A tenant-scoped outreach sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub trigger: CampaignTrigger,
    pub is_active: bool,
    pub quiet_hours: bool,
    pub steps: Vec<CampaignStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One outreach action. `delay_hours` is measured from the previous step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStep {
    pub order: u32,
    pub delay_hours: u32,
    pub channel: OutreachChannel,
    pub template_id: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Campaign {
    /// Step with exactly the given order. A gap yields `None`.
    pub fn step(&self, order: u32) -> Option<&CampaignStep> {
        self.steps.iter().find(|s| s.order == order)
    }

    pub fn max_step_order(&self) -> u32 {
        self.steps.iter().map(|s| s.order).max().unwrap_or(0)
    }

    /// Step orders must be 1-based and contiguous.
    pub fn validate(&self) -> RelanceResult<()> {
        if self.steps.is_empty() {
            return Err(RelanceError::Validation(format!(
                "campaign {} has no steps",
                self.id
            )));
        }
        let mut orders: Vec<u32> = self.steps.iter().map(|s| s.order).collect();
        orders.sort_unstable();
        for (idx, order) in orders.iter().enumerate() {
            let expected = idx as u32 + 1;
            if *order != expected {
                return Err(RelanceError::Validation(format!(
                    "campaign {} step orders are not contiguous: expected {}, found {}",
                    self.id, expected, order
                )));
            }
        }
        Ok(())
    }
}

// ─── Executions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Stopped,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Pending and running executions are revisited every cycle.
    pub fn is_active(&self) -> bool {
        matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Stopped => "stopped",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    ResolvedByDocument,
    ManuallyValidated,
    ClientRefusal,
    LineExpired,
    SequenceExhausted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::ResolvedByDocument => "resolved-by-document",
            StopReason::ManuallyValidated => "manually-validated",
            StopReason::ClientRefusal => "client-refusal",
            StopReason::LineExpired => "line-expired",
            StopReason::SequenceExhausted => "sequence-exhausted",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one line through one campaign. At most one per (campaign, line).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub line_id: Uuid,
    /// Order of the last executed step; 0 until the first dispatch.
    pub current_step_order: u32,
    pub status: ExecutionStatus,
    pub stop_reason: Option<StopReason>,
    pub last_step_executed_at: Option<DateTime<Utc>>,
    pub next_step_scheduled_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by the store on every update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// A fresh enrollment, due immediately.
    pub fn enroll(campaign_id: Uuid, line_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            line_id,
            current_step_order: 0,
            status: ExecutionStatus::Pending,
            stop_reason: None,
            last_step_executed_at: None,
            next_step_scheduled_at: Some(now),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.next_step_scheduled_at, Some(at) if at <= now)
    }
}
