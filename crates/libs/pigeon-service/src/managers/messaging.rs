use std::sync::Arc;

use pigeon_ipc::{MessageId, SendMessageRequest};

use crate::error::ServiceError;
use crate::state::ServiceState;

pub struct MessagingManager {
    state: Arc<ServiceState>,
}

impl MessagingManager {
    pub fn new(state: Arc<ServiceState>) -> Self {
        Self { state }
    }

    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<MessageId, ServiceError> {
        if request.destination_hash.trim().is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "destination_hash must not be empty".into(),
            });
        }
        if request.content.is_empty() && request.attachment.is_none() {
            return Err(ServiceError::InvalidRequest {
                message: "message has neither content nor attachment".into(),
            });
        }
        let handle = self.state.engine_checked()?;
        Ok(handle.engine().send_message(&request).await?)
    }
}
