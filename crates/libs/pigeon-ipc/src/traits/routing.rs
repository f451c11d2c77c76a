use async_trait::async_trait;

use crate::error::IpcError;
use crate::types::PathInfo;

/// Path queries and presence announces. Rejected with
/// [`IpcError::Unavailable`] unless the service status is `Ready`.
#[async_trait]
pub trait ServiceRouting: Send + Sync {
    /// Whether the transport currently knows a path to the destination.
    async fn has_path(&self, destination_hash: &str) -> Result<bool, IpcError>;

    /// Ask the transport to discover a path to the destination.
    async fn request_path(&self, destination_hash: &str) -> Result<(), IpcError>;

    /// Hop count for a known path, if any.
    async fn hop_count(&self, destination_hash: &str) -> Result<Option<u32>, IpcError>;

    /// Snapshot of the transport path table.
    async fn path_table(&self) -> Result<Vec<PathInfo>, IpcError>;

    /// Broadcast a presence announce for the local destination.
    async fn announce(&self) -> Result<(), IpcError>;
}
