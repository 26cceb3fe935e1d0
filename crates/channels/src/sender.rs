use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relance_core::channels::OutreachChannel;

/// Everything a provider needs to deliver one campaign step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub channel: OutreachChannel,
    pub template_id: String,
    pub config: serde_json::Value,
    /// Responsible party of the line being chased.
    pub recipient: Uuid,
}

/// Uniform delivery contract implemented once per channel variant.
/// Returns the provider's message identifier.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, request: &SendRequest) -> anyhow::Result<String>;
}
