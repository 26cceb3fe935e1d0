use chrono::{DateTime, Utc};

use crate::error::{RelanceError, RelanceResult};
use crate::types::{Line, LineStatus};

/// Describes a single valid status transition for a line.
#[derive(Debug, Clone, Copy)]
pub struct LineTransition {
    pub from: LineStatus,
    pub to: LineStatus,
    pub trigger: &'static str,
}

const fn edge(from: LineStatus, to: LineStatus, trigger: &'static str) -> LineTransition {
    LineTransition { from, to, trigger }
}

/// The one authoritative transition table for line statuses. Engine,
/// matching and review code consult it instead of comparing statuses
/// ad hoc.
pub struct LineStateMachine;

impl LineStateMachine {
    pub const TRANSITIONS: &'static [LineTransition] = &[
        // Pending ->
        edge(LineStatus::Pending, LineStatus::Contacted, "outreach_sent"),
        edge(LineStatus::Pending, LineStatus::Received, "document_matched"),
        edge(LineStatus::Pending, LineStatus::Validated, "manual_validation"),
        edge(LineStatus::Pending, LineStatus::Rejected, "client_refusal"),
        edge(LineStatus::Pending, LineStatus::Expired, "expiry"),
        // Contacted ->
        edge(LineStatus::Contacted, LineStatus::Contacted, "outreach_sent"),
        edge(LineStatus::Contacted, LineStatus::Received, "document_matched"),
        edge(LineStatus::Contacted, LineStatus::Validated, "manual_validation"),
        edge(LineStatus::Contacted, LineStatus::Rejected, "client_refusal"),
        edge(LineStatus::Contacted, LineStatus::Expired, "expiry"),
        // Received ->
        edge(LineStatus::Received, LineStatus::Validated, "manual_validation"),
        edge(LineStatus::Received, LineStatus::Rejected, "document_refused"),
    ];

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(from: LineStatus, to: LineStatus) -> bool {
        Self::TRANSITIONS
            .iter()
            .any(|t| t.from == from && t.to == to)
    }

    /// Validated, rejected and expired lines never move again.
    pub fn is_terminal(status: LineStatus) -> bool {
        !Self::TRANSITIONS.iter().any(|t| t.from == status)
    }

    /// Lines that may still be claimed by an inbound document.
    pub fn is_matchable(status: LineStatus) -> bool {
        status != LineStatus::Validated
    }

    /// Lines whose status allows another outreach attempt. A received line
    /// only gets one when the stop policy lets outreach continue.
    pub fn accepts_outreach(status: LineStatus) -> bool {
        status == LineStatus::Received || Self::can_transition(status, LineStatus::Contacted)
    }
}

impl Line {
    /// Moves the line to `to`, rejecting transitions absent from the table.
    pub fn transition_to(&mut self, to: LineStatus, now: DateTime<Utc>) -> RelanceResult<()> {
        if !LineStateMachine::can_transition(self.status, to) {
            tracing::debug!(line_id = %self.id, from = %self.status, to = %to, "Line transition rejected");
            return Err(RelanceError::InvalidTransition {
                entity: "line",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Records one outreach attempt. A received line keeps its status so the
    /// pending document review is not lost.
    pub fn mark_contacted(&mut self, now: DateTime<Utc>) -> RelanceResult<()> {
        if self.status != LineStatus::Received {
            self.transition_to(LineStatus::Contacted, now)?;
        }
        self.contact_count += 1;
        self.last_contacted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn line() -> Line {
        Line::new(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            Decimal::new(10000, 2),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            "CB AMAZON",
            Utc::now(),
        )
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(LineStateMachine::is_terminal(LineStatus::Validated));
        assert!(LineStateMachine::is_terminal(LineStatus::Rejected));
        assert!(LineStateMachine::is_terminal(LineStatus::Expired));
        assert!(!LineStateMachine::is_terminal(LineStatus::Pending));
        assert!(!LineStateMachine::is_terminal(LineStatus::Received));
    }

    #[test]
    fn test_forward_transitions() {
        let mut l = line();
        let now = Utc::now();
        l.transition_to(LineStatus::Received, now).unwrap();
        l.transition_to(LineStatus::Validated, now).unwrap();
        assert_eq!(l.status, LineStatus::Validated);

        let err = l.transition_to(LineStatus::Pending, now).unwrap_err();
        assert!(matches!(err, RelanceError::InvalidTransition { .. }));
    }

    #[test]
    fn test_no_transition_back_to_pending() {
        for status in [
            LineStatus::Contacted,
            LineStatus::Received,
            LineStatus::Validated,
            LineStatus::Rejected,
            LineStatus::Expired,
        ] {
            assert!(!LineStateMachine::can_transition(status, LineStatus::Pending));
        }
    }

    #[test]
    fn test_rejected_transition_leaves_line_untouched() {
        let mut l = line();
        let before = l.updated_at;
        l.transition_to(LineStatus::Expired, Utc::now()).unwrap();
        let expired_at = l.updated_at;

        assert!(l.transition_to(LineStatus::Received, Utc::now()).is_err());
        assert_eq!(l.status, LineStatus::Expired);
        assert_eq!(l.updated_at, expired_at);
        assert!(expired_at >= before);
    }

    #[test]
    fn test_mark_contacted_increments_counter() {
        let mut l = line();
        let now = Utc::now();
        l.mark_contacted(now).unwrap();
        l.mark_contacted(now).unwrap();
        assert_eq!(l.status, LineStatus::Contacted);
        assert_eq!(l.contact_count, 2);
        assert_eq!(l.last_contacted_at, Some(now));
    }

    #[test]
    fn test_mark_contacted_keeps_received() {
        let mut l = line();
        let now = Utc::now();
        l.transition_to(LineStatus::Received, now).unwrap();
        l.mark_contacted(now).unwrap();
        assert_eq!(l.status, LineStatus::Received);
        assert_eq!(l.contact_count, 1);

        l.transition_to(LineStatus::Validated, now).unwrap();
        assert!(l.mark_contacted(now).is_err());
    }
}
