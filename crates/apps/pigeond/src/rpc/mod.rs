pub mod codec;
pub mod dispatch;
pub mod types;

pub use dispatch::RpcDispatcher;
pub use types::{RpcError, RpcRequest, RpcResponse};
