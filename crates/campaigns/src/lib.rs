//! Campaign execution engine: periodic scheduler that enrolls pending
//! lines into outreach campaigns, advances due executions one step per
//! tick, and stops them once the line is resolved.

pub mod engine;
pub mod quiet_hours;
pub mod state_machine;
pub mod stop_policy;
pub mod types;

pub use engine::CampaignEngine;
pub use quiet_hours::QuietHoursPolicy;
pub use stop_policy::{StopDecision, StopPolicy};
pub use types::{AdvanceOutcome, CampaignStats, CycleReport};
