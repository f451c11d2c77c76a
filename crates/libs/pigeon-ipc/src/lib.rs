//! Interface boundary traits for the pigeon service process.
//!
//! This crate defines the cross-process contract between the pigeon service
//! (the daemon owning the embedded protocol engine) and its frontends. It
//! provides:
//!
//! - **Boundary types** — status, config, message/announce/path/identity info
//! - **Async trait definitions** capturing the full service contract
//! - **`StubService`** returning `Unavailable` for every method
//! - **`IpcError`** with a distinguishable `Unavailable` variant so callers
//!   can tell "service is tearing down" apart from real failures
//!
//! # Trait hierarchy
//!
//! Five focused traits combine into one composite:
//!
//! - [`ServiceControl`] — initialize, shutdown, status, debug info
//! - [`ServiceMessaging`] — outbound messages
//! - [`ServiceRouting`] — path queries, announces
//! - [`ServiceIdentity`] — local and peer identities
//! - [`ServiceEvents`] — event subscriptions via broadcast channels
//! - [`Service`] — composite (auto-implemented for all five)
//!
//! Domain operations are rejected with [`IpcError::Unavailable`] whenever the
//! service status is not `Ready` — never silently ignored, never blocked.

pub mod error;
pub mod traits;
pub mod types;

pub use error::IpcError;
pub use traits::{
    Service, ServiceCallback, ServiceControl, ServiceEvents, ServiceIdentity, ServiceMessaging,
    ServiceRouting,
};
pub use types::*;

mod stub;
pub use stub::StubService;
