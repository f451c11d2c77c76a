//! Fan-out of status and engine events to bound clients.

use std::sync::{Mutex, Weak};

use pigeon_ipc::{ServiceCallback, ServiceEvent};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Holds remote callback registrations weakly — a registration must never
/// extend the lifetime of the client process's proxy object — plus a
/// broadcast channel for in-process subscribers. Dead registrations are
/// pruned on every fan-out.
pub struct CallbackBroadcaster {
    callbacks: Mutex<Vec<Weak<dyn ServiceCallback>>>,
    events: broadcast::Sender<ServiceEvent>,
}

impl Default for CallbackBroadcaster {
    fn default() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            callbacks: Mutex::new(Vec::new()),
            events,
        }
    }
}

impl CallbackBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: Weak<dyn ServiceCallback>) {
        self.callbacks
            .lock()
            .expect("callbacks mutex poisoned")
            .push(callback);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    /// Publish to subscribers and, for initialization outcomes, to the
    /// registered callbacks. A send with no live receivers is fine.
    pub fn publish(&self, event: ServiceEvent) {
        let _ = self.events.send(event.clone());

        match &event {
            ServiceEvent::InitializationComplete { result } => {
                self.for_each_live(|callback| {
                    callback.on_initialization_complete(result.clone())
                });
            }
            ServiceEvent::InitializationError { error } => {
                self.for_each_live(|callback| callback.on_initialization_error(error));
            }
            _ => {}
        }
    }

    fn for_each_live(&self, mut apply: impl FnMut(&dyn ServiceCallback)) {
        let mut guard = self.callbacks.lock().expect("callbacks mutex poisoned");
        guard.retain(|weak| match weak.upgrade() {
            Some(callback) => {
                apply(callback.as_ref());
                true
            }
            None => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pigeon_ipc::InitResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingCallback {
        completions: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ServiceCallback for CountingCallback {
        fn on_initialization_complete(&self, _result: InitResult) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }

        fn on_initialization_error(&self, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn publishes_to_subscribers_and_callbacks() {
        let broadcaster = CallbackBroadcaster::new();
        let callback: Arc<CountingCallback> = Arc::new(CountingCallback::default());
        let as_dyn: Arc<dyn ServiceCallback> = callback.clone();
        broadcaster.register(Arc::downgrade(&as_dyn));

        let mut rx = broadcaster.subscribe();
        broadcaster.publish(ServiceEvent::InitializationComplete {
            result: InitResult::default(),
        });

        assert!(matches!(
            rx.recv().await.expect("event"),
            ServiceEvent::InitializationComplete { .. }
        ));
        assert_eq!(callback.completions.load(Ordering::SeqCst), 1);
        assert_eq!(callback.errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dead_registrations_are_pruned() {
        let broadcaster = CallbackBroadcaster::new();
        {
            let callback: Arc<dyn ServiceCallback> = Arc::new(CountingCallback::default());
            broadcaster.register(Arc::downgrade(&callback));
            // callback dropped here
        }
        broadcaster.publish(ServiceEvent::InitializationError {
            error: "boom".into(),
        });
        assert!(broadcaster
            .callbacks
            .lock()
            .expect("callbacks mutex poisoned")
            .is_empty());
    }
}
