use pigeon_ipc::IpcError;

use crate::engine::EngineError;

/// Service-internal errors. The subset that crosses the process boundary is
/// converted to [`IpcError`] at the binder.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// The engine capability is not usable: the handle is absent or the
    /// teardown kill switch is set. Callers treat this as "service
    /// unavailable", never as a reason to retry against the same engine.
    #[error("engine unavailable")]
    EngineUnavailable,

    #[error("initialization already in flight")]
    AlreadyInitializing,

    #[error("engine error: {message}")]
    Engine { message: String },

    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("timed out waiting for {operation}")]
    Timeout { operation: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        Self::Engine {
            message: err.to_string(),
        }
    }
}

impl From<ServiceError> for IpcError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::EngineUnavailable => IpcError::unavailable("engine unavailable"),
            ServiceError::AlreadyInitializing => IpcError::AlreadyInitializing,
            ServiceError::Engine { message } => IpcError::Engine { message },
            ServiceError::InvalidConfig { message } | ServiceError::InvalidRequest { message } => {
                IpcError::InvalidRequest { message }
            }
            ServiceError::Timeout { operation } => IpcError::Timeout { operation },
            ServiceError::Io(err) => IpcError::Internal {
                message: err.to_string(),
            },
        }
    }
}
