//! Shared data model, error taxonomy, configuration and collaborator
//! contracts for the justificative-collection engine.

pub mod channels;
pub mod clock;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod state_machine;
pub mod store;
pub mod types;

pub use channels::OutreachChannel;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{RelanceError, RelanceResult};
