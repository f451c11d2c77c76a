//! OS-level wake and network locks.
//!
//! The actual locks are platform collaborators (on Android: wake lock and
//! wifi lock held while the app is backgrounded), so the seam is a trait;
//! the manager makes acquisition idempotent so network-flap handling can
//! reacquire blindly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceError;

#[async_trait]
pub trait PlatformLocks: Send + Sync {
    async fn acquire_wake(&self) -> Result<(), ServiceError>;
    async fn release_wake(&self) -> Result<(), ServiceError>;
    async fn acquire_network(&self) -> Result<(), ServiceError>;
    async fn release_network(&self) -> Result<(), ServiceError>;
}

/// Platform with no lock requirements (desktop daemon, tests).
pub struct NoopLocks;

#[async_trait]
impl PlatformLocks for NoopLocks {
    async fn acquire_wake(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn release_wake(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn acquire_network(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn release_network(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

pub struct LockManager {
    locks: Arc<dyn PlatformLocks>,
    wake_held: AtomicBool,
    network_held: AtomicBool,
}

impl LockManager {
    pub fn new(locks: Arc<dyn PlatformLocks>) -> Self {
        Self {
            locks,
            wake_held: AtomicBool::new(false),
            network_held: AtomicBool::new(false),
        }
    }

    /// Acquire both locks. Idempotent: locks already held are not touched.
    pub async fn acquire(&self) -> Result<(), ServiceError> {
        if !self.wake_held.load(Ordering::SeqCst) {
            self.locks.acquire_wake().await?;
            self.wake_held.store(true, Ordering::SeqCst);
        }
        if !self.network_held.load(Ordering::SeqCst) {
            self.locks.acquire_network().await?;
            self.network_held.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    pub async fn release(&self) -> Result<(), ServiceError> {
        if self.network_held.swap(false, Ordering::SeqCst) {
            self.locks.release_network().await?;
        }
        if self.wake_held.swap(false, Ordering::SeqCst) {
            self.locks.release_wake().await?;
        }
        Ok(())
    }

    pub fn holds_locks(&self) -> bool {
        self.wake_held.load(Ordering::SeqCst) && self.network_held.load(Ordering::SeqCst)
    }
}
