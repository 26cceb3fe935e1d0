//! Stop conditions, driven entirely by the referenced line's status.

use serde::{Deserialize, Serialize};

use relance_core::config::StopPolicyConfig;
use relance_core::types::{LineStatus, StopReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopDecision {
    Continue,
    Stop(StopReason),
}

#[derive(Debug, Clone)]
pub struct StopPolicy {
    pub stop_on_document_received: bool,
    pub stop_on_expired: bool,
}

impl StopPolicy {
    pub fn from_config(config: &StopPolicyConfig) -> Self {
        Self {
            stop_on_document_received: config.stop_on_document_received,
            stop_on_expired: config.stop_on_expired,
        }
    }

    pub fn evaluate(&self, status: LineStatus) -> StopDecision {
        match status {
            LineStatus::Pending | LineStatus::Contacted => StopDecision::Continue,
            LineStatus::Received if self.stop_on_document_received => {
                StopDecision::Stop(StopReason::ResolvedByDocument)
            }
            LineStatus::Received => StopDecision::Continue,
            LineStatus::Validated => StopDecision::Stop(StopReason::ManuallyValidated),
            LineStatus::Rejected => StopDecision::Stop(StopReason::ClientRefusal),
            LineStatus::Expired if self.stop_on_expired => {
                StopDecision::Stop(StopReason::LineExpired)
            }
            LineStatus::Expired => StopDecision::Continue,
        }
    }
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self::from_config(&StopPolicyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let policy = StopPolicy::default();
        assert_eq!(policy.evaluate(LineStatus::Pending), StopDecision::Continue);
        assert_eq!(policy.evaluate(LineStatus::Contacted), StopDecision::Continue);
        assert_eq!(
            policy.evaluate(LineStatus::Received),
            StopDecision::Stop(StopReason::ResolvedByDocument)
        );
        assert_eq!(
            policy.evaluate(LineStatus::Validated),
            StopDecision::Stop(StopReason::ManuallyValidated)
        );
        assert_eq!(
            policy.evaluate(LineStatus::Rejected),
            StopDecision::Stop(StopReason::ClientRefusal)
        );
        assert_eq!(
            policy.evaluate(LineStatus::Expired),
            StopDecision::Stop(StopReason::LineExpired)
        );
    }

    #[test]
    fn test_received_can_keep_outreach_running() {
        let policy = StopPolicy {
            stop_on_document_received: false,
            stop_on_expired: true,
        };
        assert_eq!(policy.evaluate(LineStatus::Received), StopDecision::Continue);
        assert_eq!(
            policy.evaluate(LineStatus::Validated),
            StopDecision::Stop(StopReason::ManuallyValidated)
        );
    }
}
