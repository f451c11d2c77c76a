//! Service-process core for the pigeon mesh messenger.
//!
//! One service process owns exactly one embedded protocol-engine instance and
//! exposes it across a process boundary through [`binder::ServiceBinder`].
//! The hard part is not any single call — it is keeping the engine capability
//! coherent across interleaved initialize/shutdown cycles, health-triggered
//! restarts, and network transitions, while binder calls arrive on arbitrary
//! tasks. Three mechanisms carry that weight:
//!
//! - a **generation counter** in [`state::ServiceState`]: every
//!   initialization attempt gets a fresh generation, and only the latest
//!   generation's completion may mutate visible status;
//! - a **kill switch** set before any engine teardown begins, checked at
//!   every engine call site;
//! - an **exclusively owned engine slot**: only
//!   [`lifecycle::EngineLifecycle`] installs or removes the handle, everyone
//!   else goes through the safety-gated accessor.

pub mod binder;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod health;
pub mod lifecycle;
pub mod locks;
pub mod managers;
pub mod netwatch;
pub mod resolver;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use binder::ServiceBinder;
pub use error::ServiceError;
pub use state::ServiceState;
