//! Draining and fan-out of asynchronous engine events.
//!
//! The engine queues inbound messages and announces internally; this loop
//! drains them, persists each one to the on-disk event log, and fans them
//! out to bound clients. A failure handling one event is logged and skipped —
//! it must never take the loop (or message handling as a whole) down.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pigeon_ipc::ServiceEvent;

use crate::broadcast::CallbackBroadcaster;
use crate::engine::EngineEvent;
use crate::resolver::display_name_from_app_data;
use crate::state::ServiceState;

/// Polling cadence while a conversation screen is in the foreground.
pub const ACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Polling cadence otherwise.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// File-per-event JSON log under the storage root.
pub struct EventLog {
    root: PathBuf,
    sequence: AtomicU64,
}

impl EventLog {
    pub fn new(root: &Path) -> std::io::Result<Self> {
        let root = root.join("events");
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn append(&self, event: &ServiceEvent) -> std::io::Result<PathBuf> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let path = self.root.join(format!("{millis:013}-{seq:06}.json"));
        let body = serde_json::to_vec(event).map_err(std::io::Error::other)?;
        fs::write(&path, body)?;
        Ok(path)
    }
}

pub struct EventHandler {
    state: Arc<ServiceState>,
    broadcaster: Arc<CallbackBroadcaster>,
    event_log: Option<EventLog>,
    active_interval: Duration,
    idle_interval: Duration,
}

impl EventHandler {
    pub fn new(
        state: Arc<ServiceState>,
        broadcaster: Arc<CallbackBroadcaster>,
        event_log: Option<EventLog>,
    ) -> Self {
        Self {
            state,
            broadcaster,
            event_log,
            active_interval: ACTIVE_POLL_INTERVAL,
            idle_interval: IDLE_POLL_INTERVAL,
        }
    }

    pub fn with_intervals(mut self, active: Duration, idle: Duration) -> Self {
        self.active_interval = active;
        self.idle_interval = idle;
        self
    }

    fn poll_interval(&self) -> Duration {
        if self.state.conversation_active() {
            self.active_interval
        } else {
            self.idle_interval
        }
    }

    /// Drain until the engine becomes unreachable (kill switch or detach).
    pub async fn run(&self) {
        loop {
            let Some(handle) = self.state.engine() else {
                log::debug!("events: engine gone, stopping drain loop");
                break;
            };
            match handle.engine().poll_events().await {
                Ok(events) => {
                    for event in events {
                        self.handle_event(event);
                    }
                }
                Err(err) => {
                    log::warn!("events: poll failed: {err}");
                }
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    fn handle_event(&self, event: EngineEvent) {
        let event = match event {
            EngineEvent::MessageReceived(message) => ServiceEvent::MessageReceived { message },
            EngineEvent::AnnounceReceived(mut announce) => {
                // Announces from older nodes carry the name only in app data.
                if announce.display_name.is_none() {
                    announce.display_name = announce
                        .app_data
                        .as_deref()
                        .and_then(display_name_from_app_data);
                }
                ServiceEvent::AnnounceReceived { announce }
            }
        };
        if let Some(log) = &self.event_log {
            if let Err(err) = log.append(&event) {
                log::warn!("events: failed to persist event: {err}");
            }
        }
        self.broadcaster.publish(event);
    }
}
