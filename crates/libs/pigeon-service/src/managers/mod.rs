//! Stateless domain façades over the safety-gated engine capability.
//!
//! Every method resolves the engine through
//! [`crate::state::ServiceState::engine_checked`] first; there is no ungated
//! path to the engine from here, so calling during teardown yields
//! `EngineUnavailable` instead of touching a half-destroyed stack.

mod identity;
mod messaging;
mod routing;

pub use identity::IdentityManager;
pub use messaging::MessagingManager;
pub use routing::RoutingManager;
