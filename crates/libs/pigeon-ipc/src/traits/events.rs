use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::IpcError;
use crate::types::ServiceEvent;

/// Event subscriptions via `tokio::sync::broadcast`.
#[async_trait]
pub trait ServiceEvents: Send + Sync {
    /// Subscribe to all service events: status changes, inbound messages,
    /// announces, and initialization outcomes.
    async fn subscribe(&self) -> Result<broadcast::Receiver<ServiceEvent>, IpcError>;
}
