use serde::{Deserialize, Serialize};

/// Errors returned by service IPC operations.
///
/// `Unavailable` is the critical variant: every domain operation returns it
/// while the service is not `Ready`, and every call that arrives during
/// teardown returns it instead of blocking. Callers must be able to tell it
/// apart from engine-reported failures (`Engine`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum IpcError {
    #[error("unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("initialization already in flight")]
    AlreadyInitializing,

    #[error("engine error: {message}")]
    Engine { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("timeout: {operation}")]
    Timeout { operation: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("transport error: {message}")]
    Transport { message: String },
}

impl IpcError {
    /// Returns `true` for transient errors that may succeed on retry.
    ///
    /// `AlreadyInitializing` is retryable by definition: the colliding cycle
    /// will settle into `Ready` or `Error` and the caller can try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. }
                | Self::AlreadyInitializing
                | Self::Timeout { .. }
                | Self::Transport { .. }
        )
    }

    /// Convenience constructor for `Unavailable`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for `Engine`.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}
