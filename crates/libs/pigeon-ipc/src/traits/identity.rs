use async_trait::async_trait;

use crate::error::IpcError;
use crate::types::IdentityInfo;

/// Local and peer identity operations. Rejected with
/// [`IpcError::Unavailable`] unless the service status is `Ready`.
#[async_trait]
pub trait ServiceIdentity: Send + Sync {
    /// The local node's identity and delivery destination.
    async fn get_identity(&self) -> Result<IdentityInfo, IpcError>;

    /// Cache a previously learned peer identity in the engine's known-peers
    /// store so opportunistic delivery works without a fresh announce.
    async fn store_peer_identity(
        &self,
        identity_hash: &str,
        public_key: &[u8],
    ) -> Result<(), IpcError>;
}
