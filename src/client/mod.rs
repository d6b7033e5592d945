//! RPC client API: `send`, `broadcast`, `reply_to`, and future
//! resolution.

pub mod bulk;
pub mod rpc_client;

pub use bulk::{BulkFuture, SendOutcome};
pub use rpc_client::RpcClient;
