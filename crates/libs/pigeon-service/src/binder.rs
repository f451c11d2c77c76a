//! The process-boundary surface of the service.
//!
//! [`ServiceBinder`] implements the `pigeon_ipc` traits over the lifecycle
//! owner and the domain managers, and supervises the background loops that
//! only make sense while an engine is attached: event draining, health
//! probing (with its restart policy) and network-change handling. Domain
//! calls are admitted only in `READY`; everything else maps to
//! [`IpcError::Unavailable`] so clients can tell "not now" from "broken".

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use pigeon_ipc::{
    DebugInfo, IdentityInfo, IpcError, MessageId, PathInfo, SendMessageRequest, ServiceCallback,
    ServiceControl, ServiceEvent, ServiceEvents, ServiceIdentity, ServiceMessaging,
    ServiceRouting,
};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::broadcast::CallbackBroadcaster;
use crate::config::{parse_config, ConfigApplyFlag};
use crate::engine::EngineFactory;
use crate::events::{EventHandler, EventLog};
use crate::health::{HealthCheckManager, HealthConfig};
use crate::lifecycle::EngineLifecycle;
use crate::locks::{LockManager, PlatformLocks};
use crate::managers::{IdentityManager, MessagingManager, RoutingManager};
use crate::netwatch::{Connectivity, NetworkChangeAction, NetworkChangeManager};
use crate::resolver::{NameLookup, PeerNameResolver};
use crate::state::ServiceState;

/// Display names learned from announces, kept as a resolver lookup stage.
#[derive(Default)]
struct AnnounceNameTable {
    names: Mutex<HashMap<String, String>>,
}

impl AnnounceNameTable {
    fn record(&self, peer_hash: &str, name: &str) {
        self.names
            .lock()
            .expect("announce names mutex poisoned")
            .insert(peer_hash.to_string(), name.to_string());
    }
}

impl NameLookup for AnnounceNameTable {
    fn contact_alias(&self, _peer_hash: &str) -> Result<Option<String>, crate::ServiceError> {
        Ok(None)
    }

    fn announce_name(&self, peer_hash: &str) -> Result<Option<String>, crate::ServiceError> {
        Ok(self
            .names
            .lock()
            .expect("announce names mutex poisoned")
            .get(peer_hash)
            .cloned())
    }

    fn conversation_name(&self, _peer_hash: &str) -> Result<Option<String>, crate::ServiceError> {
        Ok(None)
    }
}

/// Reconnect reaction: re-announce presence through the gated engine.
struct AnnounceOnReconnect {
    state: Arc<ServiceState>,
}

#[async_trait]
impl NetworkChangeAction for AnnounceOnReconnect {
    async fn on_network_changed(&self) {
        let Some(handle) = self.state.engine() else {
            return;
        };
        if let Err(err) = handle.engine().announce().await {
            log::warn!("binder: re-announce after reconnect failed: {err}");
        }
    }
}

pub struct ServiceBinder {
    state: Arc<ServiceState>,
    lifecycle: Arc<EngineLifecycle>,
    broadcaster: Arc<CallbackBroadcaster>,
    locks: Arc<LockManager>,
    messaging: MessagingManager,
    routing: RoutingManager,
    identity: IdentityManager,
    resolver: PeerNameResolver,
    announce_names: Arc<AnnounceNameTable>,
    health_config: HealthConfig,
    connectivity: watch::Sender<Connectivity>,
    supervision: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ServiceBinder {
    pub fn new(factory: Arc<dyn EngineFactory>, platform: Arc<dyn PlatformLocks>) -> Arc<Self> {
        Self::with_health_config(factory, platform, HealthConfig::default())
    }

    pub fn with_health_config(
        factory: Arc<dyn EngineFactory>,
        platform: Arc<dyn PlatformLocks>,
        health_config: HealthConfig,
    ) -> Arc<Self> {
        let state = ServiceState::new();
        let broadcaster = Arc::new(CallbackBroadcaster::new());
        let lifecycle = Arc::new(EngineLifecycle::new(
            Arc::clone(&state),
            Arc::clone(&broadcaster),
            factory,
        ));
        let announce_names = Arc::new(AnnounceNameTable::default());
        let (connectivity, _initial_rx) = watch::channel(Connectivity::Disconnected);

        let binder = Arc::new(Self {
            messaging: MessagingManager::new(Arc::clone(&state)),
            routing: RoutingManager::new(Arc::clone(&state)),
            identity: IdentityManager::new(Arc::clone(&state)),
            resolver: PeerNameResolver::new(
                Arc::clone(&announce_names) as Arc<dyn NameLookup>
            ),
            state,
            lifecycle,
            broadcaster,
            locks: Arc::new(LockManager::new(platform)),
            announce_names,
            health_config,
            connectivity,
            supervision: Arc::new(Mutex::new(Vec::new())),
        });
        binder.spawn_announce_recorder();
        binder
    }

    /// Record announce display names for the resolver. Lives as long as the
    /// binder's event channel does.
    fn spawn_announce_recorder(&self) {
        let mut rx = self.broadcaster.subscribe();
        let names = Arc::clone(&self.announce_names);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ServiceEvent::AnnounceReceived { announce }) => {
                        if let Some(name) = announce.display_name.as_deref() {
                            names.record(&announce.destination_hash, name);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("binder: announce recorder lagged, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ── Supervision ───────────────────────────────────────────────────────

    fn detach_supervision(&self) {
        let mut guard = self
            .supervision
            .lock()
            .expect("supervision mutex poisoned");
        for job in guard.drain(..) {
            job.abort();
        }
    }

    // ── Platform notifications ────────────────────────────────────────────

    /// Feed a connectivity observation from the platform.
    pub fn notify_connectivity(&self, connectivity: Connectivity) {
        let _ = self.connectivity.send(connectivity);
    }

    /// Tighten or relax the event-polling cadence.
    pub fn set_conversation_active(&self, active: bool) {
        self.state.set_conversation_active(active);
    }

    /// Register a long-lived callback for initialization outcomes. Held
    /// weakly: dropping the client's strong reference unregisters it.
    pub fn register_callback(&self, callback: Weak<dyn ServiceCallback>) {
        self.broadcaster.register(callback);
    }

    /// Resolve a peer display name through the layered lookup chain.
    pub fn resolve_peer_name(&self, peer_hash: &str, cached: Option<&str>) -> String {
        self.resolver.resolve(peer_hash, cached)
    }

    fn ensure_ready(&self) -> Result<(), IpcError> {
        let status = self.state.status();
        if !status.accepts_domain_calls() {
            return Err(IpcError::unavailable(format!("service not ready: {status}")));
        }
        Ok(())
    }
}

// ── IPC trait implementations ─────────────────────────────────────────────────

#[async_trait]
impl ServiceControl for ServiceBinder {
    async fn initialize(
        &self,
        config_json: &str,
        callback: Arc<dyn ServiceCallback>,
    ) -> Result<(), IpcError> {
        let config = parse_config(config_json).map_err(IpcError::from)?;
        let ticket = self.lifecycle.begin_initialize().await.map_err(IpcError::from)?;

        let storage_root = PathBuf::from(&config.storage_path);
        let apply_flag = ConfigApplyFlag::new(&storage_root);
        if let Err(err) = apply_flag.mark() {
            log::warn!("binder: could not persist config-apply flag: {err}");
        }

        let lifecycle = Arc::clone(&self.lifecycle);
        let binder = self.clone_for_tasks();
        tokio::spawn(async move {
            let outcome = lifecycle.run_initialize(ticket, config, Some(callback)).await;
            if let Err(err) = apply_flag.clear() {
                log::warn!("binder: could not clear config-apply flag: {err}");
            }
            match outcome {
                Ok(true) => binder.attach_ready_tasks(storage_root),
                Ok(false) => log::info!("binder: initialization cycle superseded"),
                // Already surfaced through status and the callback.
                Err(err) => log::debug!("binder: initialization cycle failed: {err}"),
            }
        });
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), IpcError> {
        self.lifecycle.shutdown().await.map_err(IpcError::from)?;
        self.detach_supervision();
        if let Err(err) = self.locks.release().await {
            log::warn!("binder: lock release failed: {err}");
        }
        Ok(())
    }

    async fn get_status(&self) -> Result<String, IpcError> {
        Ok(self.state.status().to_string())
    }

    async fn get_debug_info(&self) -> Result<DebugInfo, IpcError> {
        let last_config = self.lifecycle.last_config();
        let handle = self.state.engine();
        let engine = match &handle {
            Some(handle) => handle.engine().debug_info().await.ok(),
            None => None,
        };
        Ok(DebugInfo {
            status: self.state.status().to_string(),
            generation: self.state.current_generation(),
            engine_attached: self.state.is_engine_call_safe(),
            teardown_started: self.state.teardown_started(),
            uptime_secs: handle.map(|handle| handle.uptime_secs()),
            storage_path: last_config.as_ref().map(|c| c.storage_path.clone()),
            interfaces: last_config
                .map(|c| c.enabled_interfaces)
                .unwrap_or_default(),
            engine,
        })
    }
}

#[async_trait]
impl ServiceMessaging for ServiceBinder {
    async fn send_message(&self, request: SendMessageRequest) -> Result<MessageId, IpcError> {
        self.ensure_ready()?;
        self.messaging
            .send_message(request)
            .await
            .map_err(IpcError::from)
    }
}

#[async_trait]
impl ServiceRouting for ServiceBinder {
    async fn has_path(&self, destination_hash: &str) -> Result<bool, IpcError> {
        self.ensure_ready()?;
        self.routing
            .has_path(destination_hash)
            .await
            .map_err(IpcError::from)
    }

    async fn request_path(&self, destination_hash: &str) -> Result<(), IpcError> {
        self.ensure_ready()?;
        self.routing
            .request_path(destination_hash)
            .await
            .map_err(IpcError::from)
    }

    async fn hop_count(&self, destination_hash: &str) -> Result<Option<u32>, IpcError> {
        self.ensure_ready()?;
        self.routing
            .hop_count(destination_hash)
            .await
            .map_err(IpcError::from)
    }

    async fn path_table(&self) -> Result<Vec<PathInfo>, IpcError> {
        self.ensure_ready()?;
        self.routing.path_table().await.map_err(IpcError::from)
    }

    async fn announce(&self) -> Result<(), IpcError> {
        self.ensure_ready()?;
        self.routing.announce().await.map_err(IpcError::from)
    }
}

#[async_trait]
impl ServiceIdentity for ServiceBinder {
    async fn get_identity(&self) -> Result<IdentityInfo, IpcError> {
        self.ensure_ready()?;
        self.identity.get_identity().await.map_err(IpcError::from)
    }

    async fn store_peer_identity(
        &self,
        identity_hash: &str,
        public_key: &[u8],
    ) -> Result<(), IpcError> {
        self.ensure_ready()?;
        self.identity
            .store_peer_identity(identity_hash, public_key)
            .await
            .map_err(IpcError::from)
    }
}

#[async_trait]
impl ServiceEvents for ServiceBinder {
    async fn subscribe(&self) -> Result<broadcast::Receiver<ServiceEvent>, IpcError> {
        Ok(self.broadcaster.subscribe())
    }
}

impl ServiceBinder {
    /// A slim clone of the pieces background tasks need; the binder itself
    /// is not wrapped in an extra `Arc` layer by its owner.
    fn clone_for_tasks(&self) -> TaskBinder {
        TaskBinder {
            state: Arc::clone(&self.state),
            lifecycle: Arc::clone(&self.lifecycle),
            broadcaster: Arc::clone(&self.broadcaster),
            locks: Arc::clone(&self.locks),
            health_config: self.health_config.clone(),
            connectivity: self.connectivity.clone(),
            supervision: Arc::clone(&self.supervision),
        }
    }
}

/// The subset of the binder that post-initialization supervision needs.
struct TaskBinder {
    state: Arc<ServiceState>,
    lifecycle: Arc<EngineLifecycle>,
    broadcaster: Arc<CallbackBroadcaster>,
    locks: Arc<LockManager>,
    health_config: HealthConfig,
    connectivity: watch::Sender<Connectivity>,
    supervision: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

/// Spawn the event drain for the currently attached engine and store it as
/// the state's polling job. Called on the initialize path and again after a
/// restart, which replaces the engine but not its drain.
fn spawn_event_drain(
    state: &Arc<ServiceState>,
    broadcaster: &Arc<CallbackBroadcaster>,
    storage_root: &std::path::Path,
) {
    let event_log = match EventLog::new(storage_root) {
        Ok(event_log) => Some(event_log),
        Err(err) => {
            log::warn!("binder: event log unavailable under {storage_root:?}: {err}");
            None
        }
    };
    let handler = EventHandler::new(Arc::clone(state), Arc::clone(broadcaster), event_log);
    state.set_polling_job(tokio::spawn(async move { handler.run().await }));
}

impl TaskBinder {
    fn attach_ready_tasks(&self, storage_root: PathBuf) {
        let locks = Arc::clone(&self.locks);
        tokio::spawn(async move {
            if let Err(err) = locks.acquire().await {
                log::warn!("binder: lock acquisition failed: {err}");
            }
        });

        spawn_event_drain(&self.state, &self.broadcaster, &storage_root);

        let (signal_tx, mut signal_rx) = mpsc::channel(4);
        let health =
            HealthCheckManager::with_config(Arc::clone(&self.state), self.health_config.clone());
        let health_job = tokio::spawn(async move { health.run(signal_tx).await });

        let restart_lifecycle = Arc::clone(&self.lifecycle);
        let restart_state = Arc::clone(&self.state);
        let restart_broadcaster = Arc::clone(&self.broadcaster);
        let restart_storage = storage_root;
        let restart_job = tokio::spawn(async move {
            while signal_rx.recv().await.is_some() {
                match restart_lifecycle.restart().await {
                    Ok(true) => {
                        log::warn!("binder: engine restarted after stale heartbeat");
                        spawn_event_drain(&restart_state, &restart_broadcaster, &restart_storage);
                    }
                    Ok(false) => log::info!("binder: restart skipped, service no longer ready"),
                    Err(err) => log::error!("binder: restart after stale heartbeat failed: {err}"),
                }
            }
        });

        let netwatch = NetworkChangeManager::new(
            Arc::clone(&self.state),
            Arc::clone(&self.locks),
            Arc::new(AnnounceOnReconnect {
                state: Arc::clone(&self.state),
            }),
        );
        let connectivity_rx = self.connectivity.subscribe();
        let net_job = tokio::spawn(async move { netwatch.run(connectivity_rx).await });

        let mut guard = self
            .supervision
            .lock()
            .expect("supervision mutex poisoned");
        for job in guard.drain(..) {
            job.abort();
        }
        guard.extend([health_job, restart_job, net_job]);
    }
}
