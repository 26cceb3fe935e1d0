//! Outreach channels a campaign step can be delivered through.

use serde::{Deserialize, Serialize};

/// Closed set of delivery channels. Each variant is backed by one external
/// provider behind the same `send` contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutreachChannel {
    Message,
    Voice,
    Notification,
    TemplatedMessage,
}

impl OutreachChannel {
    pub const ALL: [OutreachChannel; 4] = [
        OutreachChannel::Message,
        OutreachChannel::Voice,
        OutreachChannel::Notification,
        OutreachChannel::TemplatedMessage,
    ];

    /// Stable label used in metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutreachChannel::Message => "message",
            OutreachChannel::Voice => "voice",
            OutreachChannel::Notification => "notification",
            OutreachChannel::TemplatedMessage => "templated_message",
        }
    }
}

impl std::fmt::Display for OutreachChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
