//! Error types for liveboard
//!
//! Every engine operation returns a tagged result; nothing panics across
//! the public boundary. The four mutation-facing kinds are:
//! - `NotFound`: unknown id, or an id not under the claimed parent
//! - `Forbidden`: the actor may not write to the owning board
//! - `Invalid`: malformed request (empty reorder list, bad target)
//! - `Transient`: storage contention or timeout; retried internally a
//!   bounded number of times before being surfaced as retryable

use thiserror::Error;

/// Result alias used throughout liveboard
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for liveboard operations
#[derive(Error, Debug)]
pub enum Error {
    // Structural client errors (never retried)
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    // Retryable
    #[error("Transient failure: {0}")]
    Transient(String),

    // Ambient failures (config IO, payload shaping)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Build a `NotFound` for an entity kind and id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for failures the engine may retry transparently.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}
