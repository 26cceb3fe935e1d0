//! Outreach delivery: one provider per channel variant behind a uniform
//! `ChannelSender` contract, and the dispatcher the campaign engine calls.

pub mod dispatcher;
pub mod message;
pub mod notification;
pub mod recording;
pub mod sender;
pub mod voice;

pub use dispatcher::ChannelDispatcher;
pub use message::{MessageProvider, TemplatedMessageProvider};
pub use notification::NotificationProvider;
pub use recording::RecordingSender;
pub use sender::{ChannelSender, SendRequest};
pub use voice::VoiceProvider;
