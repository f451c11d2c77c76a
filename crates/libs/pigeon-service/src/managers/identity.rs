use std::sync::Arc;

use pigeon_ipc::IdentityInfo;

use crate::error::ServiceError;
use crate::state::ServiceState;

pub struct IdentityManager {
    state: Arc<ServiceState>,
}

impl IdentityManager {
    pub fn new(state: Arc<ServiceState>) -> Self {
        Self { state }
    }

    pub async fn get_identity(&self) -> Result<IdentityInfo, ServiceError> {
        let handle = self.state.engine_checked()?;
        Ok(handle.engine().local_identity().await?)
    }

    pub async fn store_peer_identity(
        &self,
        identity_hash: &str,
        public_key: &[u8],
    ) -> Result<(), ServiceError> {
        if identity_hash.trim().is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "identity_hash must not be empty".into(),
            });
        }
        let handle = self.state.engine_checked()?;
        handle
            .engine()
            .store_peer_identity(identity_hash, public_key)
            .await?;
        Ok(())
    }
}
