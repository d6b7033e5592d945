//! syft-rpc: a filesystem-transported RPC fabric for datasite
//! collaboration.
//!
//! Peers exchange requests and responses as files inside a directory
//! tree that is kept in sync by an external agent (e.g. a
//! cloud-storage-backed sync client); this crate never opens a socket
//! of its own except inside the optional HTTP bridge. A request is a
//! write-once file at a deterministic path; a response or rejection
//! marker answering it is another write-once file beside it. Permission
//! to read a path is governed by `syft.pub.yaml` policy files ascended
//! from that path up to the workspace root.
//!
//! The pieces, roughly bottom-up:
//!
//! - [`url`] / [`atomic`] — the `syft://` address scheme and the
//!   write-once-file discipline everything else relies on.
//! - [`protocol`] — request/response wire encoding, the body type, the
//!   HTTP-over-filesystem envelope, and deterministic path layout.
//! - [`permissions`] — the `syft.pub.yaml` policy engine.
//! - [`future_store`] — the durable index of outstanding requests a
//!   client is waiting on.
//! - [`client`] — `send`/`broadcast`/`reply_to`/`wait`/`gather_completed`.
//! - [`server`] — the event server: watches an app's RPC tree, routes
//!   requests to handlers, writes responses.
//! - [`bridge`] — the HTTP-over-filesystem bridge (feature `bridge`,
//!   on by default).
//! - [`cleanup`] — the background sweep that evicts expired request and
//!   response files.
//! - [`config`] / [`error`] — configuration structs and the unified
//!   error type shared by every module above.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//! use syft_rpc::config::{ClientContext, EventServerConfig};
//! use syft_rpc::permissions::PermissionsEngine;
//! use syft_rpc::protocol::Body;
//! use syft_rpc::server::{EventServer, HandlerOutput, RouteTable};
//! use syft_rpc::url::SyftUrl;
//!
//! struct Local {
//!     workspace: PathBuf,
//! }
//!
//! impl ClientContext for Local {
//!     fn local_datasite(&self) -> &str {
//!         "bob@example.com"
//!     }
//!     fn workspace_root(&self) -> &Path {
//!         &self.workspace
//!     }
//!     fn path_to_url(&self, _path: &Path) -> Option<SyftUrl> {
//!         None
//!     }
//! }
//!
//! # async fn run() -> syft_rpc::error::RpcResult<()> {
//! let context = Arc::new(Local { workspace: PathBuf::from("/tmp/workspace") });
//! let mut routes = RouteTable::new();
//! routes.register(
//!     "ping",
//!     std::sync::Arc::new(|_req, _captures| {
//!         Box::pin(async { Ok(HandlerOutput::Body(Body::Text("pong".to_string()))) })
//!     }),
//! );
//! let mut server = EventServer::new(
//!     EventServerConfig { app_name: "ping".to_string(), ..Default::default() },
//!     context,
//!     Arc::new(PermissionsEngine::new(true)),
//!     routes,
//! );
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod error;
pub mod future_store;
pub mod permissions;
pub mod protocol;
pub mod server;
pub mod url;

#[cfg(feature = "bridge")]
pub mod bridge;

pub use client::RpcClient;
pub use config::{ClientContext, ConfigBuilder, RpcConfig};
pub use error::{ErrorContext, RpcError, RpcResult};
pub use server::EventServer;
pub use url::SyftUrl;
