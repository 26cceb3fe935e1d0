use thiserror::Error;
use uuid::Uuid;

pub type RelanceResult<T> = Result<T, RelanceError>;

#[derive(Error, Debug)]
pub enum RelanceError {
    /// Malformed campaign or step definition, or an input the engine cannot act on.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Channel dispatcher failure. Treated as transient: the step is retried.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Stale optimistic version or duplicate (campaign, line) enrollment.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RelanceError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        RelanceError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RelanceError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RelanceError::Conflict(_))
    }

    /// Transient errors leave state untouched so the work is retried next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, RelanceError::Dispatch(_) | RelanceError::Persistence(_))
    }
}

impl From<config::ConfigError> for RelanceError {
    fn from(err: config::ConfigError) -> Self {
        RelanceError::Config(err.to_string())
    }
}
