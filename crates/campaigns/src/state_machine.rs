use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relance_core::error::{RelanceError, RelanceResult};
use relance_core::types::{Execution, ExecutionStatus, StopReason};

/// Describes a single valid state transition for an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTransition {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
    pub trigger: String,
}

/// Guards execution lifecycle by enforcing a finite set of valid
/// state transitions. Stopped, completed and failed are terminal.
#[derive(Debug, Clone)]
pub struct ExecutionStateMachine {
    pub transitions: Vec<ExecutionTransition>,
}

impl ExecutionStateMachine {
    pub fn new() -> Self {
        let edge = |from, to, trigger: &str| ExecutionTransition {
            from,
            to,
            trigger: trigger.to_string(),
        };
        let transitions = vec![
            // Pending ->
            edge(ExecutionStatus::Pending, ExecutionStatus::Running, "step_dispatched"),
            edge(ExecutionStatus::Pending, ExecutionStatus::Completed, "sequence_exhausted"),
            edge(ExecutionStatus::Pending, ExecutionStatus::Stopped, "stop_condition"),
            edge(ExecutionStatus::Pending, ExecutionStatus::Failed, "missing_reference"),
            // Running ->
            edge(ExecutionStatus::Running, ExecutionStatus::Running, "step_dispatched"),
            edge(ExecutionStatus::Running, ExecutionStatus::Completed, "sequence_exhausted"),
            edge(ExecutionStatus::Running, ExecutionStatus::Stopped, "stop_condition"),
            edge(ExecutionStatus::Running, ExecutionStatus::Failed, "missing_reference"),
        ];
        Self { transitions }
    }

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(&self, from: ExecutionStatus, to: ExecutionStatus) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.to == to)
    }

    /// Moves `execution` to `to`. A stop reason is recorded only for stopped
    /// and completed executions; terminal states clear the next schedule.
    pub fn apply(
        &self,
        execution: &mut Execution,
        to: ExecutionStatus,
        reason: Option<StopReason>,
        now: DateTime<Utc>,
    ) -> RelanceResult<()> {
        if !self.can_transition(execution.status, to) {
            return Err(RelanceError::InvalidTransition {
                entity: "execution",
                from: execution.status.to_string(),
                to: to.to_string(),
            });
        }
        execution.status = to;
        execution.stop_reason = match to {
            ExecutionStatus::Stopped | ExecutionStatus::Completed => reason,
            _ => None,
        };
        if !to.is_active() {
            execution.next_step_scheduled_at = None;
        }
        execution.updated_at = now;
        Ok(())
    }
}

impl Default for ExecutionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_terminal_states_are_final() {
        let sm = ExecutionStateMachine::new();
        for terminal in [
            ExecutionStatus::Stopped,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
        ] {
            for to in [
                ExecutionStatus::Pending,
                ExecutionStatus::Running,
                ExecutionStatus::Stopped,
                ExecutionStatus::Completed,
                ExecutionStatus::Failed,
            ] {
                assert!(!sm.can_transition(terminal, to));
            }
        }
    }

    #[test]
    fn test_apply_stop_records_reason_and_clears_schedule() {
        let sm = ExecutionStateMachine::new();
        let now = Utc::now();
        let mut exec = Execution::enroll(Uuid::new_v4(), Uuid::new_v4(), now);
        sm.apply(&mut exec, ExecutionStatus::Stopped, Some(StopReason::ClientRefusal), now)
            .unwrap();
        assert_eq!(exec.status, ExecutionStatus::Stopped);
        assert_eq!(exec.stop_reason, Some(StopReason::ClientRefusal));
        assert!(exec.next_step_scheduled_at.is_none());

        assert!(sm
            .apply(&mut exec, ExecutionStatus::Running, None, now)
            .is_err());
    }

    #[test]
    fn test_failed_has_no_stop_reason() {
        let sm = ExecutionStateMachine::new();
        let now = Utc::now();
        let mut exec = Execution::enroll(Uuid::new_v4(), Uuid::new_v4(), now);
        sm.apply(
            &mut exec,
            ExecutionStatus::Failed,
            Some(StopReason::SequenceExhausted),
            now,
        )
        .unwrap();
        assert!(exec.stop_reason.is_none());
    }
}
