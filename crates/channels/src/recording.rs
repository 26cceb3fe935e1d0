//! Sender that records every request instead of delivering it. Used by the
//! daemon's dry-run mode and by engine tests, which can also make it fail.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::sender::{ChannelSender, SendRequest};

#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SendRequest>>,
    failing: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send fails without being recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SendRequest> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    async fn send(&self, request: &SendRequest) -> anyhow::Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("{} provider unavailable", request.channel);
        }
        self.sent.lock().push(request.clone());
        Ok(Uuid::new_v4().to_string())
    }
}
