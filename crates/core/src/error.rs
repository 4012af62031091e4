//! Error types for the deskhive domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::worker::WorkerRole;

/// The top-level error type for all deskhive operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Worker lifecycle errors ---
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    // --- Context budget errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Remote client errors ---
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors raised by the worker lifecycle manager.
///
/// Validation variants (`UnknownRole`, `MessageTooLong`, `InvalidModel`) are
/// surfaced immediately and never retried. `Unavailable` is surfaced after
/// one internal start attempt; transient remote failures feed the restart
/// machinery instead of the caller.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("Unknown worker role: {0}")]
    UnknownRole(String),

    #[error("Message too long: {len} chars (max {max})")]
    MessageTooLong { len: usize, max: usize },

    #[error("Model not recognized by the remote API: {0}")]
    InvalidModel(String),

    #[error("No API credential configured")]
    NoCredential,

    #[error("Worker '{role}' is unavailable")]
    Unavailable { role: WorkerRole },

    #[error("Worker '{role}' request failed: {reason}")]
    RequestFailed { role: WorkerRole, reason: String },
}

/// Errors raised by the context budget engine.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Layer not found: {0}")]
    NotFound(String),

    #[error("Layer is immutable: {0}")]
    ImmutableViolation(String),

    #[error("Invalid promotion tier: {0} (promote targets core, active or reference)")]
    InvalidPromotionTier(String),
}

/// Errors raised by the remote worker client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by remote API, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Client not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_displays_correctly() {
        let err = Error::Client(ClientError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn worker_error_displays_correctly() {
        let err = Error::Worker(WorkerError::MessageTooLong { len: 70_000, max: 65_536 });
        assert!(err.to_string().contains("70000"));
        assert!(err.to_string().contains("65536"));
    }

    #[test]
    fn context_error_displays_correctly() {
        let err = Error::Context(ContextError::ImmutableViolation("layer_42".into()));
        assert!(err.to_string().contains("immutable"));
        assert!(err.to_string().contains("layer_42"));
    }
}
