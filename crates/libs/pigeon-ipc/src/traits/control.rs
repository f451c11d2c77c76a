use std::sync::Arc;

use async_trait::async_trait;

use crate::error::IpcError;
use crate::types::{DebugInfo, InitResult};

/// Asynchronous completion channel for `initialize`.
///
/// `initialize` returns as soon as the cycle is accepted; the outcome arrives
/// here. Implementations must hold registrations weakly on the service side —
/// a callback must never extend the lifetime of the client that supplied it.
pub trait ServiceCallback: Send + Sync {
    fn on_initialization_complete(&self, result: InitResult);
    fn on_initialization_error(&self, error: &str);
}

/// Service lifecycle and introspection.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    /// Start an initialization cycle from a JSON configuration blob.
    ///
    /// Returns once the cycle is accepted (status `INITIALIZING`); the result
    /// is delivered through `callback`. Fails fast with
    /// [`IpcError::AlreadyInitializing`] when a cycle is already in flight.
    async fn initialize(
        &self,
        config_json: &str,
        callback: Arc<dyn ServiceCallback>,
    ) -> Result<(), IpcError>;

    /// Begin engine teardown. A second call against an already shut down
    /// service is a no-op, not an error.
    async fn shutdown(&self) -> Result<(), IpcError>;

    /// Current status in its wire-string form (`"READY"`, `"ERROR:<msg>"`, ...).
    async fn get_status(&self) -> Result<String, IpcError>;

    /// Diagnostic snapshot of the service and, when attached, the engine.
    async fn get_debug_info(&self) -> Result<DebugInfo, IpcError>;
}
