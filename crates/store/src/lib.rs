#![warn(clippy::unwrap_used)]

//! In-process persistence for lines, campaigns, executions and documents.

pub mod memory;

pub use memory::InMemoryStore;
