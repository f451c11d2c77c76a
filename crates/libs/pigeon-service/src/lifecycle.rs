//! Engine lifecycle: initialize, shutdown, restart.
//!
//! [`EngineLifecycle`] is the only code allowed to start or stop engine
//! instances and the only writer of the engine slot. Everything here is built
//! around two races that really happen on devices:
//!
//! - a slow initialization being superseded by a shutdown (or a later
//!   initialization) before the engine finishes starting — resolved by the
//!   generation counter: the stale cycle's completion is discarded and its
//!   engine quietly stopped;
//! - a call reaching the engine while teardown is mid-flight — resolved by
//!   setting the kill switch before the first teardown side effect.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pigeon_ipc::{InitResult, ServiceCallback, ServiceConfig, ServiceEvent, ServiceStatus};

use crate::broadcast::CallbackBroadcaster;
use crate::engine::{EngineFactory, EngineHandle, ProtocolEngine};
use crate::error::ServiceError;
use crate::state::ServiceState;

/// How long a new initialization waits for the prior shutdown job to join
/// before giving up.
pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Admission token for one initialization cycle. Holding one means the
/// fail-fast checks passed and the generation it carries was current at
/// admission time.
#[derive(Debug)]
pub struct InitTicket {
    generation: u64,
}

impl InitTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct EngineLifecycle {
    state: Arc<ServiceState>,
    broadcaster: Arc<CallbackBroadcaster>,
    factory: Arc<dyn EngineFactory>,
    last_config: Mutex<Option<ServiceConfig>>,
    /// Serializes admission: the fail-fast check, the shutdown join and the
    /// generation bump must not interleave across callers.
    admission: tokio::sync::Mutex<()>,
    shutdown_join_timeout: Duration,
}

impl EngineLifecycle {
    pub fn new(
        state: Arc<ServiceState>,
        broadcaster: Arc<CallbackBroadcaster>,
        factory: Arc<dyn EngineFactory>,
    ) -> Self {
        Self {
            state,
            broadcaster,
            factory,
            last_config: Mutex::new(None),
            admission: tokio::sync::Mutex::new(()),
            shutdown_join_timeout: SHUTDOWN_JOIN_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_shutdown_join_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_join_timeout = timeout;
        self
    }

    /// The configuration of the last successful initialization, if any.
    pub fn last_config(&self) -> Option<ServiceConfig> {
        self.last_config
            .lock()
            .expect("last_config mutex poisoned")
            .clone()
    }

    fn publish_status(&self) {
        self.broadcaster.publish(ServiceEvent::StatusChanged {
            status: self.state.status().to_string(),
        });
    }

    // ── Initialize ────────────────────────────────────────────────────────

    /// Fail-fast admission for an initialization cycle.
    ///
    /// Rejects immediately while another initialization is in flight; joins
    /// the prior shutdown job (bounded) so two engines can never coexist;
    /// then advances the generation, flips status to `Initializing` and
    /// clears the kill switch. Admission is serialized, so a caller parked
    /// on the shutdown join cannot be overtaken by a second admission that
    /// would clear the kill switch mid-teardown.
    pub async fn begin_initialize(&self) -> Result<InitTicket, ServiceError> {
        let _admission = self.admission.lock().await;
        if self.state.status() == ServiceStatus::Initializing {
            return Err(ServiceError::AlreadyInitializing);
        }
        self.join_prior_shutdown().await?;

        let generation = self.state.begin_generation();
        self.state.clear_teardown();
        self.state
            .set_status_if_current(generation, ServiceStatus::Initializing);
        log::info!("lifecycle: initialization admitted, generation {generation}");
        self.publish_status();
        Ok(InitTicket { generation })
    }

    async fn join_prior_shutdown(&self) -> Result<(), ServiceError> {
        let Some(mut job) = self.state.take_shutdown_job() else {
            return Ok(());
        };
        match tokio::time::timeout(self.shutdown_join_timeout, &mut job).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                log::warn!("lifecycle: prior shutdown job panicked: {err}");
                Ok(())
            }
            Err(_elapsed) => {
                // Leave the job in place so a retry waits for it again
                // instead of racing a still-live teardown.
                self.state.set_shutdown_job(job);
                Err(ServiceError::Timeout {
                    operation: "prior shutdown join".to_string(),
                })
            }
        }
    }

    /// The slow part of an initialization cycle: start a fresh engine and,
    /// if this cycle is still current, commit it as `Ready`.
    ///
    /// Returns `Ok(true)` when this cycle became the visible state and
    /// `Ok(false)` when it was superseded mid-flight (its engine is stopped,
    /// nothing else is observable).
    pub async fn run_initialize(
        &self,
        ticket: InitTicket,
        config: ServiceConfig,
        callback: Option<Arc<dyn ServiceCallback>>,
    ) -> Result<bool, ServiceError> {
        let generation = ticket.generation;
        let engine = self.factory.create();

        match engine.start(&config).await {
            Ok(()) => {
                self.commit_started_engine(generation, engine, config, callback)
                    .await
            }
            Err(err) => {
                let message = err.to_string();
                if self
                    .state
                    .set_status_if_current(generation, ServiceStatus::Error(message.clone()))
                {
                    log::error!("lifecycle: initialization failed: {message}");
                    self.publish_status();
                    if let Some(callback) = &callback {
                        callback.on_initialization_error(&message);
                    }
                    self.broadcaster.publish(ServiceEvent::InitializationError {
                        error: message.clone(),
                    });
                }
                Err(ServiceError::Engine { message })
            }
        }
    }

    async fn commit_started_engine(
        &self,
        generation: u64,
        engine: Arc<dyn ProtocolEngine>,
        config: ServiceConfig,
        callback: Option<Arc<dyn ServiceCallback>>,
    ) -> Result<bool, ServiceError> {
        // Identity is part of the completion payload; fetch it before the
        // commit so a committed cycle always has its result at hand.
        let identity = match engine.local_identity().await {
            Ok(identity) => Some(identity),
            Err(err) => {
                log::warn!("lifecycle: identity unavailable after start: {err}");
                None
            }
        };

        let handle = Arc::new(EngineHandle::new(engine.clone()));
        if !self.state.commit_ready(generation, handle) {
            // Superseded while starting. The stale engine must not linger.
            log::info!("lifecycle: generation {generation} superseded, stopping its engine");
            if let Err(err) = engine.stop().await {
                log::warn!("lifecycle: superseded engine teardown reported: {err}");
            }
            return Ok(false);
        }

        *self.last_config.lock().expect("last_config mutex poisoned") = Some(config);
        log::info!("lifecycle: generation {generation} ready");
        self.publish_status();

        let result = InitResult {
            generation,
            identity,
        };
        if let Some(callback) = &callback {
            callback.on_initialization_complete(result.clone());
        }
        self.broadcaster
            .publish(ServiceEvent::InitializationComplete { result });
        Ok(true)
    }

    /// Admission and execution in one call, for callers that do not need to
    /// spawn the slow part separately.
    pub async fn initialize(
        &self,
        config: ServiceConfig,
        callback: Option<Arc<dyn ServiceCallback>>,
    ) -> Result<bool, ServiceError> {
        let ticket = self.begin_initialize().await?;
        self.run_initialize(ticket, config, callback).await
    }

    // ── Shutdown ──────────────────────────────────────────────────────────

    /// Begin teardown. Returns as soon as the engine is detached; the
    /// blocking engine stop runs on a background job that a later
    /// initialization joins.
    ///
    /// A shutdown against an already shut-down service is a no-op, not an
    /// error — it happens on every unbind/destroy path.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        if self.state.teardown_started()
            || (self.state.status() == ServiceStatus::Shutdown && self.state.engine().is_none())
        {
            log::debug!("lifecycle: shutdown requested with nothing to tear down");
            return Ok(());
        }

        // Kill switch first: from this line on no new call reaches the
        // engine, including from jobs already scheduled.
        self.state.begin_teardown();
        if let Some(job) = self.state.take_polling_job() {
            job.abort();
        }

        let generation = self.state.current_generation();
        let handle = self.state.take_engine();
        let state = Arc::clone(&self.state);
        let broadcaster = Arc::clone(&self.broadcaster);
        let job = tokio::spawn(async move {
            if let Some(handle) = handle {
                if let Err(err) = handle.engine().stop().await {
                    log::warn!("lifecycle: engine teardown reported: {err}");
                }
            }
            if state.set_status_if_current(generation, ServiceStatus::Shutdown) {
                log::info!("lifecycle: generation {generation} shut down");
                broadcaster.publish(ServiceEvent::StatusChanged {
                    status: ServiceStatus::Shutdown.to_string(),
                });
            }
        });
        self.state.set_shutdown_job(job);
        Ok(())
    }

    // ── Restart ───────────────────────────────────────────────────────────

    /// Tear the current engine down and bring a fresh one up with the last
    /// successful configuration.
    ///
    /// The whole span reads `Restarting` — no observer may see `Ready`
    /// while the old engine is dead and the new one is not up yet. Returns
    /// `Ok(false)` when the service was not in a restartable state.
    pub async fn restart(&self) -> Result<bool, ServiceError> {
        let _admission = self.admission.lock().await;
        let config = self.last_config().ok_or_else(|| ServiceError::InvalidRequest {
            message: "restart requested before any successful initialization".to_string(),
        })?;

        if self.state.status() != ServiceStatus::Ready {
            log::info!("lifecycle: restart skipped, service not ready");
            return Ok(false);
        }
        let pre_generation = self.state.current_generation();
        if !self
            .state
            .set_status_if_current(pre_generation, ServiceStatus::Restarting)
        {
            return Ok(false);
        }
        log::warn!("lifecycle: restarting engine, generation {pre_generation}");
        self.publish_status();

        // Inline teardown: restart owns the whole span, nothing to join.
        self.state.begin_teardown();
        if let Some(job) = self.state.take_polling_job() {
            job.abort();
        }
        if let Some(handle) = self.state.take_engine() {
            if let Err(err) = handle.engine().stop().await {
                log::warn!("lifecycle: engine teardown during restart reported: {err}");
            }
        }

        let generation = self.state.begin_generation();
        self.state.clear_teardown();
        let ticket = InitTicket { generation };
        self.run_initialize(ticket, config, None).await
    }
}
