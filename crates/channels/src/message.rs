//! Conversational messaging provider (WhatsApp Business style API) for free
//! text and pre-approved template messages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sender::{ChannelSender, SendRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    pub api_base_url: String,
    pub access_token: String,
    pub phone_number_id: String,
    #[serde(default = "default_language")]
    pub default_language: String,
}

fn default_language() -> String {
    "fr".to_string()
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://graph.facebook.com/v19.0".to_string(),
            access_token: String::new(),
            phone_number_id: String::new(),
            default_language: default_language(),
        }
    }
}

/// Shared transport for both text and template messages.
struct MessagingClient {
    config: MessagingConfig,
}

impl MessagingClient {
    /// Step config may override the account language per message.
    fn language<'a>(&'a self, request: &'a SendRequest) -> &'a str {
        request
            .config
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.config.default_language)
    }

    fn push(&self, request: &SendRequest, kind: &'static str, parts: usize) -> String {
        let id = format!("wamid.{}", Uuid::new_v4().simple());
        tracing::info!(
            message_id = %id,
            recipient = %request.recipient,
            template = %request.template_id,
            kind,
            parts,
            language = %self.language(request),
            phone_id = %self.config.phone_number_id,
            base = %self.config.api_base_url,
            "Sending message"
        );
        id
    }
}

/// Free-text messages. The body comes from the step config (`body`) or
/// falls back to the template identifier.
pub struct MessageProvider {
    client: MessagingClient,
}

impl MessageProvider {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            client: MessagingClient { config },
        }
    }
}

fn message_body(request: &SendRequest) -> &str {
    request
        .config
        .get("body")
        .and_then(|v| v.as_str())
        .unwrap_or(&request.template_id)
}

#[async_trait]
impl ChannelSender for MessageProvider {
    async fn send(&self, request: &SendRequest) -> anyhow::Result<String> {
        let body = message_body(request);
        if body.trim().is_empty() {
            anyhow::bail!("message body is empty for template {}", request.template_id);
        }
        Ok(self.client.push(request, "text", body.chars().count()))
    }
}

/// Pre-approved template messages, required outside the 24h customer
/// service window.
pub struct TemplatedMessageProvider {
    client: MessagingClient,
}

impl TemplatedMessageProvider {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            client: MessagingClient { config },
        }
    }
}

fn template_parameters(request: &SendRequest) -> Vec<&str> {
    request
        .config
        .get("parameters")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|p| p.as_str()).collect())
        .unwrap_or_default()
}

#[async_trait]
impl ChannelSender for TemplatedMessageProvider {
    async fn send(&self, request: &SendRequest) -> anyhow::Result<String> {
        if request.template_id.is_empty() {
            anyhow::bail!("templated message requires a template id");
        }
        let parameters = template_parameters(request);
        Ok(self.client.push(request, "template", parameters.len()))
    }
}
