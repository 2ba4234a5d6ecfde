use thiserror::Error;

/// Error taxonomy surfaced across the dispatch core's public API.
///
/// Internal plumbing (repository calls, routing-client calls) uses
/// `anyhow::Result` with `.context(...)` chains; only the boundary
/// functions on `Store`, `Dispatcher`, and the state-machine layer
/// construct one of these variants directly.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("forbidden: {reason}")]
    Forbidden { reason: &'static str },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("tenant trial has expired")]
    TrialExpired,

    #[error("internal error: {0}")]
    InternalError(String),
}

impl DispatchError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn forbidden(reason: &'static str) -> Self {
        Self::Forbidden { reason }
    }
}

/// Maps a lower-layer failure (repository, routing client) into the
/// public taxonomy. Anything that isn't already a `DispatchError`
/// is reported as `InternalError`, never leaked verbatim to the caller.
pub fn to_internal(err: anyhow::Error) -> DispatchError {
    match err.downcast::<DispatchError>() {
        Ok(known) => known,
        Err(other) => DispatchError::InternalError(other.to_string()),
    }
}
