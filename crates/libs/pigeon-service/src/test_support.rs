//! Shared fakes for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pigeon_ipc::{IdentityInfo, MessageId, PathInfo, SendMessageRequest, ServiceConfig};

use crate::engine::{EngineError, EngineEvent, EngineFactory, ProtocolEngine};

/// Hands out pre-built engines in order; panics when a test creates more
/// cycles than it scripted.
pub(crate) struct SequenceFactory {
    engines: Mutex<VecDeque<Arc<dyn ProtocolEngine>>>,
}

impl SequenceFactory {
    pub fn of(engines: Vec<Arc<FakeEngine>>) -> Arc<Self> {
        Arc::new(Self {
            engines: Mutex::new(
                engines
                    .into_iter()
                    .map(|e| e as Arc<dyn ProtocolEngine>)
                    .collect(),
            ),
        })
    }
}

impl EngineFactory for SequenceFactory {
    fn create(&self) -> Arc<dyn ProtocolEngine> {
        self.engines
            .lock()
            .expect("engines")
            .pop_front()
            .expect("factory exhausted")
    }
}

/// A controllable engine: scripted start/probe behavior, counted calls,
/// queued events.
#[derive(Default)]
pub(crate) struct FakeEngine {
    pub start_error: Mutex<Option<String>>,
    pub start_delay: Mutex<Option<Duration>>,
    pub started_configs: Mutex<Vec<ServiceConfig>>,
    pub start_count: AtomicUsize,
    pub stop_delay: Mutex<Option<Duration>>,
    /// Counts completed stops; a delayed stop shows up only after its delay.
    pub stop_count: AtomicUsize,
    pub announce_count: AtomicUsize,
    pub probe_count: AtomicUsize,
    pub probe_hangs: AtomicBool,
    /// Played back in order; once empty, probes succeed.
    pub probe_script: Mutex<VecDeque<Result<f64, EngineError>>>,
    pub queued_events: Mutex<VecDeque<EngineEvent>>,
    next_message_id: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_start(message: &str) -> Arc<Self> {
        let engine = Self::default();
        *engine.start_error.lock().expect("start_error") = Some(message.to_string());
        Arc::new(engine)
    }

    pub fn slow_start(delay: Duration) -> Arc<Self> {
        let engine = Self::default();
        *engine.start_delay.lock().expect("start_delay") = Some(delay);
        Arc::new(engine)
    }

    pub fn slow_stop(delay: Duration) -> Arc<Self> {
        let engine = Self::default();
        *engine.stop_delay.lock().expect("stop_delay") = Some(delay);
        Arc::new(engine)
    }

    pub fn script_probe_failures(&self, times: usize) {
        let mut script = self.probe_script.lock().expect("probe_script");
        for _ in 0..times {
            script.push_back(Err(EngineError::call("no heartbeat")));
        }
    }

    pub fn queue_event(&self, event: EngineEvent) {
        self.queued_events
            .lock()
            .expect("queued_events")
            .push_back(event);
    }
}

#[async_trait]
impl ProtocolEngine for FakeEngine {
    async fn start(&self, config: &ServiceConfig) -> Result<(), EngineError> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        let delay = *self.start_delay.lock().expect("start_delay");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.start_error.lock().expect("start_error").clone() {
            return Err(EngineError::startup(message));
        }
        self.started_configs
            .lock()
            .expect("started_configs")
            .push(config.clone());
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        let delay = *self.stop_delay.lock().expect("stop_delay");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn probe(&self) -> Result<f64, EngineError> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        if self.probe_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.probe_script
            .lock()
            .expect("probe_script")
            .pop_front()
            .unwrap_or(Ok(1.0))
    }

    async fn announce(&self) -> Result<(), EngineError> {
        self.announce_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<MessageId, EngineError> {
        if request.destination_hash.trim().is_empty() {
            return Err(EngineError::call("destination hash is empty"));
        }
        let seq = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("fake-{seq}"))
    }

    async fn has_path(&self, _destination_hash: &str) -> Result<bool, EngineError> {
        Ok(true)
    }

    async fn request_path(&self, _destination_hash: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn hop_count(&self, _destination_hash: &str) -> Result<Option<u32>, EngineError> {
        Ok(Some(2))
    }

    async fn path_table(&self) -> Result<Vec<PathInfo>, EngineError> {
        Ok(Vec::new())
    }

    async fn local_identity(&self) -> Result<IdentityInfo, EngineError> {
        Ok(IdentityInfo {
            identity_hash: "feedfacefeedface".into(),
            destination_hash: "deadbeefdeadbeef".into(),
            display_name: Some("Fake Node".into()),
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
        let mut queued = self.queued_events.lock().expect("queued_events");
        Ok(queued.drain(..).collect())
    }

    async fn debug_info(&self) -> Result<serde_json::Value, EngineError> {
        Ok(serde_json::json!({ "engine": "fake" }))
    }
}
