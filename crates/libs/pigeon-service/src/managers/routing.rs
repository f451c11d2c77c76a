use std::sync::Arc;

use pigeon_ipc::PathInfo;

use crate::error::ServiceError;
use crate::state::ServiceState;

pub struct RoutingManager {
    state: Arc<ServiceState>,
}

impl RoutingManager {
    pub fn new(state: Arc<ServiceState>) -> Self {
        Self { state }
    }

    pub async fn has_path(&self, destination_hash: &str) -> Result<bool, ServiceError> {
        let handle = self.state.engine_checked()?;
        Ok(handle.engine().has_path(destination_hash).await?)
    }

    pub async fn request_path(&self, destination_hash: &str) -> Result<(), ServiceError> {
        let handle = self.state.engine_checked()?;
        handle.engine().request_path(destination_hash).await?;
        Ok(())
    }

    pub async fn hop_count(&self, destination_hash: &str) -> Result<Option<u32>, ServiceError> {
        let handle = self.state.engine_checked()?;
        Ok(handle.engine().hop_count(destination_hash).await?)
    }

    pub async fn path_table(&self) -> Result<Vec<PathInfo>, ServiceError> {
        let handle = self.state.engine_checked()?;
        Ok(handle.engine().path_table().await?)
    }

    pub async fn announce(&self) -> Result<(), ServiceError> {
        let handle = self.state.engine_checked()?;
        handle.engine().announce().await?;
        Ok(())
    }
}
