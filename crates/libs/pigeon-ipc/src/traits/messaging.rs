use async_trait::async_trait;

use crate::error::IpcError;
use crate::types::{MessageId, SendMessageRequest};

/// Outbound messaging. Rejected with [`IpcError::Unavailable`] unless the
/// service status is `Ready`.
#[async_trait]
pub trait ServiceMessaging: Send + Sync {
    /// Hand a message to the engine for delivery.
    async fn send_message(&self, request: SendMessageRequest) -> Result<MessageId, IpcError>;
}
