//! Connectivity transition handling.
//!
//! Radios flap: a single physical reconnect often surfaces as a burst of
//! connectivity notifications. The manager coalesces everything inside a
//! debounce window into one action — reacquire the locks (idempotent) and
//! fire the injected re-announce callback — so a flapping link cannot cause
//! an announce storm.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pigeon_ipc::ServiceStatus;
use tokio::sync::watch;

use crate::locks::LockManager;
use crate::state::ServiceState;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    Disconnected,
    Connected,
}

/// Injected reaction to a settled disconnected-to-connected transition.
/// The usual implementation asks the engine to re-announce presence.
#[async_trait]
pub trait NetworkChangeAction: Send + Sync {
    async fn on_network_changed(&self);
}

pub struct NetworkChangeManager {
    state: Arc<ServiceState>,
    locks: Arc<LockManager>,
    action: Arc<dyn NetworkChangeAction>,
    debounce: Duration,
}

impl NetworkChangeManager {
    pub fn new(
        state: Arc<ServiceState>,
        locks: Arc<LockManager>,
        action: Arc<dyn NetworkChangeAction>,
    ) -> Self {
        Self::with_debounce(state, locks, action, DEBOUNCE_WINDOW)
    }

    pub fn with_debounce(
        state: Arc<ServiceState>,
        locks: Arc<LockManager>,
        action: Arc<dyn NetworkChangeAction>,
        debounce: Duration,
    ) -> Self {
        Self {
            state,
            locks,
            action,
            debounce,
        }
    }

    /// Consume connectivity notifications until the sender goes away or the
    /// kill switch is set.
    pub async fn run(&self, mut connectivity: watch::Receiver<Connectivity>) {
        // The service comes up before connectivity is confirmed, so the
        // baseline is Disconnected; a Connected already sitting in the
        // channel when the loop first polls still counts as a transition.
        let mut last = Connectivity::Disconnected;
        loop {
            let now = *connectivity.borrow_and_update();
            let reconnected = last == Connectivity::Disconnected && now == Connectivity::Connected;
            last = now;
            if !reconnected {
                if connectivity.changed().await.is_err() {
                    break;
                }
                continue;
            }

            // Let the flap settle; whatever the state is at the end of the
            // window decides whether we act at all.
            tokio::time::sleep(self.debounce).await;
            while connectivity.has_changed().unwrap_or(false) {
                last = *connectivity.borrow_and_update();
            }
            if last != Connectivity::Connected {
                continue;
            }
            if self.state.teardown_started() {
                // A restart tears down transiently; only a real shutdown
                // ends the watch.
                if self.state.status() == ServiceStatus::Restarting {
                    continue;
                }
                break;
            }

            if let Err(err) = self.locks.acquire().await {
                log::warn!("netwatch: lock reacquisition failed: {err}");
            }
            log::info!("netwatch: connectivity restored, re-announcing");
            self.action.on_network_changed().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::NoopLocks;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingAction {
        invocations: AtomicUsize,
    }

    #[async_trait]
    impl NetworkChangeAction for CountingAction {
        async fn on_network_changed(&self) {
            self.invocations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(
        state: Arc<ServiceState>,
        action: Arc<CountingAction>,
    ) -> NetworkChangeManager {
        NetworkChangeManager::with_debounce(
            state,
            Arc::new(LockManager::new(Arc::new(NoopLocks))),
            action,
            Duration::from_millis(200),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_fires_one_action() {
        let action = Arc::new(CountingAction::default());
        let manager = manager(ServiceState::new(), action.clone());
        let (tx, rx) = watch::channel(Connectivity::Disconnected);
        let job = tokio::spawn(async move { manager.run(rx).await });

        tx.send(Connectivity::Connected).expect("send");
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(action.invocations.load(Ordering::SeqCst), 1);
        drop(tx);
        job.await.expect("netwatch loop exits");
    }

    #[tokio::test(start_paused = true)]
    async fn transition_sent_before_the_loop_starts_still_fires() {
        let action = Arc::new(CountingAction::default());
        let manager = manager(ServiceState::new(), action.clone());
        let (tx, rx) = watch::channel(Connectivity::Disconnected);
        // The platform reports the link up before the watch loop polls.
        tx.send(Connectivity::Connected).expect("send");
        let job = tokio::spawn(async move { manager.run(rx).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(action.invocations.load(Ordering::SeqCst), 1);
        drop(tx);
        job.await.expect("netwatch loop exits");
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_during_restart_window_keeps_the_watch_alive() {
        let action = Arc::new(CountingAction::default());
        let state = ServiceState::new();
        let generation = state.begin_generation();
        let manager = manager(Arc::clone(&state), action.clone());
        let (tx, rx) = watch::channel(Connectivity::Disconnected);
        let job = tokio::spawn(async move { manager.run(rx).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // A reconnect settles while a restart teardown is in flight: no
        // action yet, but the watch must survive the window.
        assert!(state.set_status_if_current(generation, pigeon_ipc::ServiceStatus::Restarting));
        state.begin_teardown();
        tx.send(Connectivity::Connected).expect("send");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(action.invocations.load(Ordering::SeqCst), 0);

        state.clear_teardown();
        assert!(state.set_status_if_current(generation, pigeon_ipc::ServiceStatus::Ready));
        tx.send(Connectivity::Disconnected).expect("send");
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(Connectivity::Connected).expect("send");
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(action.invocations.load(Ordering::SeqCst), 1);
        drop(tx);
        job.await.expect("netwatch loop exits");
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_flapping_coalesces_into_one_action() {
        let action = Arc::new(CountingAction::default());
        let manager = manager(ServiceState::new(), action.clone());
        let (tx, rx) = watch::channel(Connectivity::Disconnected);
        let job = tokio::spawn(async move { manager.run(rx).await });

        // Burst of transitions well inside the debounce window.
        for _ in 0..4 {
            tx.send(Connectivity::Connected).expect("send");
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(Connectivity::Disconnected).expect("send");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(Connectivity::Connected).expect("send");
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(action.invocations.load(Ordering::SeqCst), 1);
        drop(tx);
        job.await.expect("netwatch loop exits");
    }

    #[tokio::test(start_paused = true)]
    async fn flap_ending_disconnected_takes_no_action() {
        let action = Arc::new(CountingAction::default());
        let manager = manager(ServiceState::new(), action.clone());
        let (tx, rx) = watch::channel(Connectivity::Disconnected);
        let job = tokio::spawn(async move { manager.run(rx).await });

        tx.send(Connectivity::Connected).expect("send");
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(Connectivity::Disconnected).expect("send");
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(action.invocations.load(Ordering::SeqCst), 0);
        drop(tx);
        job.await.expect("netwatch loop exits");
    }
}
