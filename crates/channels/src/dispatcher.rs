//! Channel dispatcher: routes a campaign step to the provider registered
//! for its channel and normalises provider failures into dispatch errors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use relance_core::channels::OutreachChannel;
use relance_core::error::{RelanceError, RelanceResult};

use crate::message::{MessageProvider, MessagingConfig, TemplatedMessageProvider};
use crate::notification::{NotificationConfig, NotificationProvider};
use crate::sender::{ChannelSender, SendRequest};
use crate::voice::{VoiceConfig, VoiceProvider};

pub struct ChannelDispatcher {
    senders: HashMap<OutreachChannel, Arc<dyn ChannelSender>>,
    enabled_channels: Vec<OutreachChannel>,
}

impl ChannelDispatcher {
    pub fn new(enabled_channels: Vec<OutreachChannel>) -> Self {
        info!(channels = ?enabled_channels, "Channel dispatcher initialized");
        Self {
            senders: HashMap::new(),
            enabled_channels,
        }
    }

    /// Registers the provider backing `channel`, replacing any previous one.
    pub fn with_sender(mut self, channel: OutreachChannel, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(channel, sender);
        self
    }

    /// Dispatcher wired to the built-in providers with default settings.
    pub fn with_default_providers(enabled_channels: Vec<OutreachChannel>) -> Self {
        Self::new(enabled_channels)
            .with_sender(
                OutreachChannel::Message,
                Arc::new(MessageProvider::new(MessagingConfig::default())),
            )
            .with_sender(
                OutreachChannel::TemplatedMessage,
                Arc::new(TemplatedMessageProvider::new(MessagingConfig::default())),
            )
            .with_sender(
                OutreachChannel::Voice,
                Arc::new(VoiceProvider::new(VoiceConfig::default())),
            )
            .with_sender(
                OutreachChannel::Notification,
                Arc::new(NotificationProvider::new(NotificationConfig::default())),
            )
    }

    /// Routes every channel to the same sender.
    pub fn single(sender: Arc<dyn ChannelSender>) -> Self {
        OutreachChannel::ALL
            .iter()
            .fold(Self::new(OutreachChannel::ALL.to_vec()), |d, ch| {
                d.with_sender(*ch, sender.clone())
            })
    }

    pub fn is_enabled(&self, channel: OutreachChannel) -> bool {
        self.enabled_channels.contains(&channel) && self.senders.contains_key(&channel)
    }

    /// Sends one step to `recipient` and returns the provider message id.
    pub async fn send(
        &self,
        channel: OutreachChannel,
        template_id: &str,
        config: &serde_json::Value,
        recipient: Uuid,
    ) -> RelanceResult<String> {
        let sender = match self.senders.get(&channel) {
            Some(sender) if self.enabled_channels.contains(&channel) => sender,
            _ => {
                metrics::counter!("outreach.dispatch_failed", "channel" => channel.as_str())
                    .increment(1);
                return Err(RelanceError::Dispatch(format!(
                    "channel {} is not enabled",
                    channel
                )));
            }
        };

        let request = SendRequest {
            channel,
            template_id: template_id.to_string(),
            config: config.clone(),
            recipient,
        };

        let start = std::time::Instant::now();
        let result = sender.send(&request).await;
        metrics::histogram!("outreach.dispatch_latency_ms", "channel" => channel.as_str())
            .record(start.elapsed().as_millis() as f64);

        match result {
            Ok(message_id) => {
                metrics::counter!("outreach.dispatched", "channel" => channel.as_str())
                    .increment(1);
                debug!(
                    channel = %channel,
                    recipient = %recipient,
                    message_id = %message_id,
                    "Step dispatched"
                );
                Ok(message_id)
            }
            Err(e) => {
                metrics::counter!("outreach.dispatch_failed", "channel" => channel.as_str())
                    .increment(1);
                warn!(channel = %channel, recipient = %recipient, error = %e, "Dispatch failed");
                Err(RelanceError::Dispatch(format!("{}: {}", channel, e)))
            }
        }
    }
}
