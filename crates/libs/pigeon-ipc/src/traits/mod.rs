mod control;
mod events;
mod identity;
mod messaging;
mod routing;

pub use control::{ServiceCallback, ServiceControl};
pub use events::ServiceEvents;
pub use identity::ServiceIdentity;
pub use messaging::ServiceMessaging;
pub use routing::ServiceRouting;

/// Composite trait encompassing all service IPC capabilities.
///
/// Automatically implemented for any type that implements all five
/// sub-traits. Use `Arc<dyn Service>` as the primary handle type.
pub trait Service:
    ServiceControl + ServiceMessaging + ServiceRouting + ServiceIdentity + ServiceEvents
{
}

impl<T> Service for T where
    T: ServiceControl + ServiceMessaging + ServiceRouting + ServiceIdentity + ServiceEvents
{
}
