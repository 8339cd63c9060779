pub mod client;
pub mod message;

pub use client::RpcClient;
pub use message::{RpcError, RpcMessage, RpcNotification, RpcRequest, RpcResponse};
