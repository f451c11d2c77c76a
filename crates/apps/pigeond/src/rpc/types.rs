use pigeon_ipc::IpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    pub params: Option<JsonValue>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RpcResponse {
    pub id: u64,
    pub result: Option<JsonValue>,
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: JsonValue) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RpcError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl RpcError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new("INVALID_REQUEST", message, false)
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new("UNKNOWN_METHOD", format!("unknown method: {method}"), false)
    }
}

impl From<IpcError> for RpcError {
    fn from(err: IpcError) -> Self {
        let retryable = err.is_retryable();
        let code = match &err {
            IpcError::Unavailable { .. } => "UNAVAILABLE",
            IpcError::AlreadyInitializing => "ALREADY_INITIALIZING",
            IpcError::Engine { .. } => "ENGINE",
            IpcError::InvalidRequest { .. } => "INVALID_REQUEST",
            IpcError::NotFound { .. } => "NOT_FOUND",
            IpcError::Timeout { .. } => "TIMEOUT",
            IpcError::Transport { .. } => "TRANSPORT",
            _ => "INTERNAL",
        };
        Self::new(code, err.to_string(), retryable)
    }
}
