//! Reconciliation of inbound justificatives against a client's open lines:
//! confidence scoring, auto-match above a high threshold, and human review
//! of lower-confidence proposals.

pub mod engine;
pub mod normalize;
pub mod scoring;

pub use engine::{MatchDecision, MatchingEngine};
pub use scoring::{MatchProposal, MatchScorer, ScoreBreakdown};
