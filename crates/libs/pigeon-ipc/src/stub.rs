use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::IpcError;
use crate::traits::*;
use crate::types::*;

/// A service implementation that returns `Unavailable` for every method.
///
/// This is the permanently-shut-down service: useful as a placeholder while
/// wiring transports, and as the semantic baseline for what callers see
/// before the first `initialize`.
pub struct StubService;

fn not_running(method: &str) -> IpcError {
    IpcError::unavailable(format!("service not running: {method}"))
}

#[async_trait]
impl ServiceControl for StubService {
    async fn initialize(
        &self,
        _config_json: &str,
        _callback: Arc<dyn ServiceCallback>,
    ) -> Result<(), IpcError> {
        Err(not_running("initialize"))
    }

    async fn shutdown(&self) -> Result<(), IpcError> {
        Ok(())
    }

    async fn get_status(&self) -> Result<String, IpcError> {
        Ok(ServiceStatus::Shutdown.to_string())
    }

    async fn get_debug_info(&self) -> Result<DebugInfo, IpcError> {
        Ok(DebugInfo {
            status: ServiceStatus::Shutdown.to_string(),
            ..DebugInfo::default()
        })
    }
}

#[async_trait]
impl ServiceMessaging for StubService {
    async fn send_message(&self, _request: SendMessageRequest) -> Result<MessageId, IpcError> {
        Err(not_running("send_message"))
    }
}

#[async_trait]
impl ServiceRouting for StubService {
    async fn has_path(&self, _destination_hash: &str) -> Result<bool, IpcError> {
        Err(not_running("has_path"))
    }

    async fn request_path(&self, _destination_hash: &str) -> Result<(), IpcError> {
        Err(not_running("request_path"))
    }

    async fn hop_count(&self, _destination_hash: &str) -> Result<Option<u32>, IpcError> {
        Err(not_running("hop_count"))
    }

    async fn path_table(&self) -> Result<Vec<PathInfo>, IpcError> {
        Err(not_running("path_table"))
    }

    async fn announce(&self) -> Result<(), IpcError> {
        Err(not_running("announce"))
    }
}

#[async_trait]
impl ServiceIdentity for StubService {
    async fn get_identity(&self) -> Result<IdentityInfo, IpcError> {
        Err(not_running("get_identity"))
    }

    async fn store_peer_identity(
        &self,
        _identity_hash: &str,
        _public_key: &[u8],
    ) -> Result<(), IpcError> {
        Err(not_running("store_peer_identity"))
    }
}

#[async_trait]
impl ServiceEvents for StubService {
    async fn subscribe(&self) -> Result<broadcast::Receiver<ServiceEvent>, IpcError> {
        Err(not_running("subscribe"))
    }
}
