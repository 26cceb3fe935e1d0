//! In-app / push notifications to the client's portal account.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sender::{ChannelSender, SendRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub app_id: String,
    pub default_ttl_seconds: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            app_id: "relance-portal".to_string(),
            default_ttl_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationUrgency {
    Low,
    Normal,
    High,
}

impl NotificationUrgency {
    fn from_config(config: &serde_json::Value) -> Self {
        match config.get("urgency").and_then(|v| v.as_str()) {
            Some("high") => Self::High,
            Some("low") => Self::Low,
            _ => Self::Normal,
        }
    }
}

pub struct NotificationProvider {
    config: NotificationConfig,
}

impl NotificationProvider {
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ChannelSender for NotificationProvider {
    async fn send(&self, request: &SendRequest) -> anyhow::Result<String> {
        let urgency = NotificationUrgency::from_config(&request.config);
        let title = request
            .config
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("Justificatif manquant");
        let id = Uuid::new_v4().to_string();

        tracing::info!(
            notification_id = %id,
            recipient = %request.recipient,
            app_id = %self.config.app_id,
            template = %request.template_id,
            title,
            urgency = ?urgency,
            ttl_seconds = self.config.default_ttl_seconds,
            "Sending notification"
        );
        Ok(id)
    }
}
