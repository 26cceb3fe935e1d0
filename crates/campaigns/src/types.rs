use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relance_core::types::StopReason;

/// What happened to one execution during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvanceOutcome {
    Stopped(StopReason),
    NotDue,
    /// Due, but inside quiet hours.
    Deferred,
    /// A step went out; `completed` when it was the last one.
    Dispatched { order: u32, completed: bool },
    /// No step at `current + 1`.
    Exhausted,
    /// Line or campaign no longer exists.
    Failed,
}

/// Tally of one `run_cycle`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Another cycle held the run lock; nothing was done.
    pub skipped: bool,
    pub enrolled: u32,
    pub dispatched: u32,
    pub deferred: u32,
    pub not_due: u32,
    pub stopped: u32,
    pub completed: u32,
    pub failed: u32,
    pub errors: u32,
}

impl CycleReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: AdvanceOutcome) {
        match outcome {
            AdvanceOutcome::Stopped(_) => self.stopped += 1,
            AdvanceOutcome::NotDue => self.not_due += 1,
            AdvanceOutcome::Deferred => self.deferred += 1,
            AdvanceOutcome::Dispatched { completed, .. } => {
                self.dispatched += 1;
                if completed {
                    self.completed += 1;
                }
            }
            AdvanceOutcome::Exhausted => self.completed += 1,
            AdvanceOutcome::Failed => self.failed += 1,
        }
    }
}

/// Aggregate statistics for a campaign's executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStats {
    pub campaign_id: Uuid,
    pub total_enrolled: u64,
    pub pending: u64,
    pub running: u64,
    pub stopped: u64,
    pub completed: u64,
    pub failed: u64,
    pub stop_reasons: HashMap<String, u64>,
    pub avg_steps_executed: f64,
}
