//! The embedded protocol-engine boundary.
//!
//! The engine (the Reticulum/LXMF stack) lives behind [`ProtocolEngine`] as a
//! capability: valid only between a successful `start` and the moment the
//! teardown kill switch is set. Nothing outside
//! [`crate::lifecycle::EngineLifecycle`] constructs or destroys it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use pigeon_ipc::{
    AnnounceInfo, IdentityInfo, MessageId, MessageInfo, PathInfo, SendMessageRequest,
    ServiceConfig,
};
use serde_json::json;

/// Errors reported by the engine itself. Startup failures surface verbatim in
/// the `ERROR:<message>` status; call failures map to domain errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("startup failed: {message}")]
    Startup { message: String },

    #[error("{message}")]
    Call { message: String },
}

impl EngineError {
    pub fn startup(message: impl Into<String>) -> Self {
        Self::Startup {
            message: message.into(),
        }
    }

    pub fn call(message: impl Into<String>) -> Self {
        Self::Call {
            message: message.into(),
        }
    }
}

/// Asynchronous events the engine queues for the service to drain.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    MessageReceived(MessageInfo),
    AnnounceReceived(AnnounceInfo),
}

/// The embedded protocol stack, seen from the service process.
///
/// The engine serializes calls internally; the surrounding management logic
/// still has to guarantee no call is dispatched once teardown has begun,
/// which is the kill switch's job, not this trait's.
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Bring the stack up with the given configuration. Seconds-scale.
    async fn start(&self, config: &ServiceConfig) -> Result<(), EngineError>;

    /// Tear the stack down. Not preemptible; seconds-scale.
    async fn stop(&self) -> Result<(), EngineError>;

    /// Liveness probe: returns the engine's heartbeat timestamp (unix
    /// seconds). A wedged interpreter stops advancing it.
    async fn probe(&self) -> Result<f64, EngineError>;

    /// Broadcast a presence announce for the local delivery destination.
    async fn announce(&self) -> Result<(), EngineError>;

    async fn send_message(&self, request: &SendMessageRequest) -> Result<MessageId, EngineError>;

    async fn has_path(&self, destination_hash: &str) -> Result<bool, EngineError>;

    async fn request_path(&self, destination_hash: &str) -> Result<(), EngineError>;

    async fn hop_count(&self, destination_hash: &str) -> Result<Option<u32>, EngineError>;

    async fn path_table(&self) -> Result<Vec<PathInfo>, EngineError>;

    async fn local_identity(&self) -> Result<IdentityInfo, EngineError>;

    async fn store_peer_identity(
        &self,
        identity_hash: &str,
        public_key: &[u8],
    ) -> Result<(), EngineError>;

    /// Drain queued inbound messages and announces. Returns an empty vec when
    /// nothing is pending; never blocks waiting for traffic.
    async fn poll_events(&self) -> Result<Vec<EngineEvent>, EngineError>;

    async fn debug_info(&self) -> Result<serde_json::Value, EngineError>;
}

/// The exclusively owned handle to a started engine instance.
///
/// Non-null in [`crate::state::ServiceState`] iff an initialization completed
/// successfully and teardown has not begun.
pub struct EngineHandle {
    engine: std::sync::Arc<dyn ProtocolEngine>,
    attached_at: Instant,
}

impl EngineHandle {
    pub fn new(engine: std::sync::Arc<dyn ProtocolEngine>) -> Self {
        Self {
            engine,
            attached_at: Instant::now(),
        }
    }

    pub fn engine(&self) -> &dyn ProtocolEngine {
        self.engine.as_ref()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.attached_at.elapsed().as_secs()
    }
}

/// Builds engine instances for initialization cycles. Each cycle gets a fresh
/// instance; a superseded or torn-down engine is never reused.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> std::sync::Arc<dyn ProtocolEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> std::sync::Arc<dyn ProtocolEngine> + Send + Sync,
{
    fn create(&self) -> std::sync::Arc<dyn ProtocolEngine> {
        self()
    }
}

/// An inert engine: starts and stops cleanly, answers probes, delivers
/// nothing. This is what the daemon runs until a real stack binding is linked
/// in, and the baseline for exercising the lifecycle machinery.
#[derive(Default)]
pub struct StubEngine {
    next_message_id: AtomicU64,
}

fn unix_now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[async_trait]
impl ProtocolEngine for StubEngine {
    async fn start(&self, config: &ServiceConfig) -> Result<(), EngineError> {
        if config.storage_path.trim().is_empty() {
            return Err(EngineError::startup("storage path is empty"));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn probe(&self) -> Result<f64, EngineError> {
        Ok(unix_now_secs())
    }

    async fn announce(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<MessageId, EngineError> {
        if request.destination_hash.trim().is_empty() {
            return Err(EngineError::call("destination hash is empty"));
        }
        let seq = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        Ok(format!("stub-{seq:016x}"))
    }

    async fn has_path(&self, _destination_hash: &str) -> Result<bool, EngineError> {
        Ok(false)
    }

    async fn request_path(&self, _destination_hash: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn hop_count(&self, _destination_hash: &str) -> Result<Option<u32>, EngineError> {
        Ok(None)
    }

    async fn path_table(&self) -> Result<Vec<PathInfo>, EngineError> {
        Ok(Vec::new())
    }

    async fn local_identity(&self) -> Result<IdentityInfo, EngineError> {
        Ok(IdentityInfo {
            identity_hash: "0000000000000000".into(),
            destination_hash: "0000000000000000".into(),
            display_name: None,
        })
    }

    async fn store_peer_identity(
        &self,
        _identity_hash: &str,
        _public_key: &[u8],
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn poll_events(&self) -> Result<Vec<EngineEvent>, EngineError> {
        Ok(Vec::new())
    }

    async fn debug_info(&self) -> Result<serde_json::Value, EngineError> {
        Ok(json!({ "engine": "stub", "transport_enabled": false }))
    }
}
