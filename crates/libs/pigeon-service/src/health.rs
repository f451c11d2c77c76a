//! Engine liveness monitoring.
//!
//! The manager probes the engine's heartbeat on a fixed interval and signals
//! staleness upward; it never calls back into the engine to fix anything —
//! restart policy belongs to the service owner. Probing stops the instant
//! the teardown kill switch is set.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::state::ServiceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthSignal {
    /// The engine heartbeat went stale: consecutive probe failures reached
    /// the threshold, or a single probe exceeded the generous timeout bound.
    StaleHeartbeat,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub failure_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(30),
            failure_threshold: 3,
        }
    }
}

pub struct HealthCheckManager {
    state: Arc<ServiceState>,
    config: HealthConfig,
}

impl HealthCheckManager {
    pub fn new(state: Arc<ServiceState>) -> Self {
        Self::with_config(state, HealthConfig::default())
    }

    pub fn with_config(state: Arc<ServiceState>, config: HealthConfig) -> Self {
        Self { state, config }
    }

    /// Probe until the kill switch is set or the signal receiver goes away.
    ///
    /// Reaching the failure threshold emits exactly one signal, and the
    /// signaled engine is not probed again: the loop holds off until the
    /// owner has swapped in a new generation, so a wedged interpreter
    /// cannot keep re-signaling every interval.
    pub async fn run(&self, signal: mpsc::Sender<HealthSignal>) {
        let mut ticker = tokio::time::interval(self.config.probe_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut consecutive_failures = 0u32;
        let mut signaled_generation: Option<u64> = None;

        loop {
            ticker.tick().await;
            if self.state.teardown_started() {
                // Restart teardown is transient; only a real shutdown ends
                // the probe loop.
                if self.state.status() == pigeon_ipc::ServiceStatus::Restarting {
                    consecutive_failures = 0;
                    continue;
                }
                log::debug!("health: teardown started, stopping probes");
                break;
            }
            // Not attached (yet): nothing to probe, nothing to count.
            let Some(handle) = self.state.engine() else {
                consecutive_failures = 0;
                continue;
            };
            if signaled_generation == Some(self.state.current_generation()) {
                continue;
            }

            match tokio::time::timeout(self.config.probe_timeout, handle.engine().probe()).await {
                Ok(Ok(_heartbeat)) => {
                    consecutive_failures = 0;
                    continue;
                }
                Ok(Err(err)) => {
                    consecutive_failures += 1;
                    log::warn!(
                        "health: probe failed ({consecutive_failures}/{}): {err}",
                        self.config.failure_threshold
                    );
                }
                Err(_elapsed) => {
                    // A probe past the generous bound means the interpreter
                    // is wedged, not slow; do not wait for two more.
                    log::warn!(
                        "health: probe exceeded {:?}, treating heartbeat as stale",
                        self.config.probe_timeout
                    );
                    consecutive_failures = self.config.failure_threshold;
                }
            }

            if consecutive_failures >= self.config.failure_threshold {
                consecutive_failures = 0;
                signaled_generation = Some(self.state.current_generation());
                log::warn!("health: heartbeat stale, signaling owner");
                if signal.send(HealthSignal::StaleHeartbeat).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineHandle;
    use crate::test_support::FakeEngine;
    use std::sync::atomic::Ordering;

    fn state_with(engine: Arc<FakeEngine>) -> Arc<ServiceState> {
        let state = ServiceState::new();
        let generation = state.begin_generation();
        assert!(state.install_engine(generation, Arc::new(EngineHandle::new(engine))));
        state
    }

    fn fast_config() -> HealthConfig {
        HealthConfig {
            probe_interval: Duration::from_millis(100),
            probe_timeout: Duration::from_millis(500),
            failure_threshold: 3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn three_consecutive_failures_emit_exactly_one_signal() {
        let engine = FakeEngine::new();
        engine.script_probe_failures(3);
        let state = state_with(engine.clone());
        let manager = HealthCheckManager::with_config(Arc::clone(&state), fast_config());
        let (tx, mut rx) = mpsc::channel(8);
        let job = tokio::spawn(async move { manager.run(tx).await });

        assert_eq!(
            rx.recv().await.expect("stale signal"),
            HealthSignal::StaleHeartbeat
        );

        // Signaled: the loop holds off until the owner swaps the engine.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.probe_count.load(Ordering::SeqCst), 3);

        // A fresh generation resumes probing; the script is exhausted so
        // probes succeed and no further signal shows up.
        let generation = state.begin_generation();
        assert!(state.install_engine(generation, Arc::new(EngineHandle::new(engine.clone()))));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert!(engine.probe_count.load(Ordering::SeqCst) > 3);
        job.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn single_timeout_is_stale_without_waiting_for_three() {
        let engine = FakeEngine::new();
        engine.probe_hangs.store(true, Ordering::SeqCst);
        let state = state_with(engine.clone());
        let manager = HealthCheckManager::with_config(state, fast_config());
        let (tx, mut rx) = mpsc::channel(8);
        let job = tokio::spawn(async move { manager.run(tx).await });

        assert_eq!(
            rx.recv().await.expect("stale signal"),
            HealthSignal::StaleHeartbeat
        );
        assert_eq!(engine.probe_count.load(Ordering::SeqCst), 1);

        // The wedged engine is not poked again while its generation holds,
        // and it is not re-signaled either.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.probe_count.load(Ordering::SeqCst), 1);
        job.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn probing_stops_when_kill_switch_is_set() {
        let engine = FakeEngine::new();
        let state = state_with(engine.clone());
        state.begin_teardown();

        let manager = HealthCheckManager::with_config(state, fast_config());
        let (tx, _rx) = mpsc::channel(8);
        let job = tokio::spawn(async move { manager.run(tx).await });

        job.await.expect("health loop exits");
        assert_eq!(engine.probe_count.load(Ordering::SeqCst), 0);
    }
}
