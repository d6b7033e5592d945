//! HTTP-over-filesystem bridge: makes the RPC fabric look like an HTTP
//! transport to code on either end.

pub mod client;
pub mod server;

pub use client::BridgeClientTransport;
pub use server::bridge_handler;

/// Endpoint pattern the bridge server handler is installed under.
pub const BRIDGE_ENDPOINT_PATTERN: &str = "http/**";
