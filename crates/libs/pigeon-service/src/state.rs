//! Centralized mutable state for the service process.
//!
//! One [`ServiceState`] exists per process, created when the service starts
//! and living until process teardown. All managers hold a reference; only
//! [`crate::lifecycle::EngineLifecycle`] mutates the engine slot.
//!
//! Two invariants are enforced here rather than trusted to callers:
//!
//! - **Generation ordering**: every initialization attempt advances the
//!   generation counter. A completion (init or shutdown) that captured an
//!   earlier generation cannot mutate visible status —
//!   [`ServiceState::set_status_if_current`] silently discards it.
//! - **Kill switch before teardown**: once `begin_teardown` is called, the
//!   safety gate fails and no engine reference leaves this struct until a
//!   later cycle clears the switch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use pigeon_ipc::ServiceStatus;
use tokio::task::JoinHandle;

use crate::engine::EngineHandle;
use crate::error::ServiceError;

pub struct ServiceState {
    status: Mutex<ServiceStatus>,
    generation: AtomicU64,
    teardown_started: AtomicBool,
    conversation_active: AtomicBool,
    engine: Mutex<Option<Arc<EngineHandle>>>,
    polling_job: Mutex<Option<JoinHandle<()>>>,
    shutdown_job: Mutex<Option<JoinHandle<()>>>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            status: Mutex::new(ServiceStatus::Shutdown),
            generation: AtomicU64::new(0),
            teardown_started: AtomicBool::new(false),
            conversation_active: AtomicBool::new(false),
            engine: Mutex::new(None),
            polling_job: Mutex::new(None),
            shutdown_job: Mutex::new(None),
        }
    }
}

impl ServiceState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ── Status ────────────────────────────────────────────────────────────

    pub fn status(&self) -> ServiceStatus {
        self.status.lock().expect("status mutex poisoned").clone()
    }

    /// Generation-guarded status write. Returns `false` (and changes
    /// nothing) when `generation` is no longer current — the stale
    /// completion's effect is discarded, never surfaced as an error.
    ///
    /// The generation check happens under the status lock so a concurrent
    /// `begin_generation` cannot slip between check and write.
    pub fn set_status_if_current(&self, generation: u64, status: ServiceStatus) -> bool {
        let mut guard = self.status.lock().expect("status mutex poisoned");
        if self.generation.load(Ordering::SeqCst) != generation {
            log::debug!(
                "state: discarding stale status write {status} from generation {generation}"
            );
            return false;
        }
        *guard = status;
        true
    }

    // ── Generation counter ────────────────────────────────────────────────

    /// Advance to a fresh generation at the start of an initialization
    /// attempt and return it. Holds the status lock so the bump is ordered
    /// against concurrent guarded writes.
    pub fn begin_generation(&self) -> u64 {
        let _guard = self.status.lock().expect("status mutex poisoned");
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    // ── Kill switch ───────────────────────────────────────────────────────

    /// Set before any teardown call reaches the engine. Single-word check,
    /// cheap enough to guard every call site including hot paths.
    pub fn begin_teardown(&self) {
        self.teardown_started.store(true, Ordering::SeqCst);
    }

    /// Cleared only once a new initialization has confirmed the prior
    /// shutdown fully joined.
    pub fn clear_teardown(&self) {
        self.teardown_started.store(false, Ordering::SeqCst);
    }

    pub fn teardown_started(&self) -> bool {
        self.teardown_started.load(Ordering::SeqCst)
    }

    // ── Engine slot ───────────────────────────────────────────────────────

    /// Install the engine handle for `generation`. Refused when a newer
    /// cycle has started or teardown has begun in the meantime.
    pub fn install_engine(&self, generation: u64, handle: Arc<EngineHandle>) -> bool {
        let mut slot = self.engine.lock().expect("engine mutex poisoned");
        if self.generation.load(Ordering::SeqCst) != generation || self.teardown_started() {
            return false;
        }
        *slot = Some(handle);
        true
    }

    /// Install the engine and flip to `Ready` as one step. Both the slot
    /// write and the status write are guarded by the same generation check,
    /// so a cycle can never leave an engine installed without becoming the
    /// visible status (or vice versa).
    pub fn commit_ready(&self, generation: u64, handle: Arc<EngineHandle>) -> bool {
        let mut status = self.status.lock().expect("status mutex poisoned");
        if self.generation.load(Ordering::SeqCst) != generation || self.teardown_started() {
            log::debug!("state: refusing ready commit from stale generation {generation}");
            return false;
        }
        *self.engine.lock().expect("engine mutex poisoned") = Some(handle);
        *status = ServiceStatus::Ready;
        true
    }

    /// Remove and return the engine handle. Only the lifecycle owner calls
    /// this, after setting the kill switch.
    pub fn take_engine(&self) -> Option<Arc<EngineHandle>> {
        self.engine.lock().expect("engine mutex poisoned").take()
    }

    /// True iff the kill switch is clear and an engine is attached. Pure
    /// function of current state, no side effects.
    pub fn is_engine_call_safe(&self) -> bool {
        !self.teardown_started()
            && self
                .engine
                .lock()
                .expect("engine mutex poisoned")
                .is_some()
    }

    /// Safety-gated engine access: the only path to the engine for anything
    /// other than the lifecycle owner.
    pub fn engine(&self) -> Option<Arc<EngineHandle>> {
        if self.teardown_started() {
            return None;
        }
        self.engine.lock().expect("engine mutex poisoned").clone()
    }

    /// Like [`Self::engine`] but with the caller-facing error. Reaching the
    /// engine while unsafe is a caller bug prevented here, not retried.
    pub fn engine_checked(&self) -> Result<Arc<EngineHandle>, ServiceError> {
        self.engine().ok_or(ServiceError::EngineUnavailable)
    }

    // ── Conversation polling cadence ──────────────────────────────────────

    pub fn set_conversation_active(&self, active: bool) {
        self.conversation_active.store(active, Ordering::Relaxed);
    }

    pub fn conversation_active(&self) -> bool {
        self.conversation_active.load(Ordering::Relaxed)
    }

    // ── Background job handles ────────────────────────────────────────────

    pub fn set_polling_job(&self, job: JoinHandle<()>) {
        let mut slot = self.polling_job.lock().expect("polling job mutex poisoned");
        if let Some(previous) = slot.replace(job) {
            previous.abort();
        }
    }

    pub fn take_polling_job(&self) -> Option<JoinHandle<()>> {
        self.polling_job
            .lock()
            .expect("polling job mutex poisoned")
            .take()
    }

    pub fn set_shutdown_job(&self, job: JoinHandle<()>) {
        *self
            .shutdown_job
            .lock()
            .expect("shutdown job mutex poisoned") = Some(job);
    }

    pub fn take_shutdown_job(&self) -> Option<JoinHandle<()>> {
        self.shutdown_job
            .lock()
            .expect("shutdown job mutex poisoned")
            .take()
    }
}
