//! Bridge client side: an HTTP-client-shaped transport that tunnels
//! requests through the RPC client to a bridge server.

use crate::client::RpcClient;
use crate::error::RpcResult;
use crate::protocol::{Body, HttpRequestEnvelope, HttpResponseEnvelope, Method};
use crate::url::SyftUrl;
use std::time::Duration;

/// Tunnels `send(http_request) -> http_response` calls through an
/// [`RpcClient`] to the `http/**` endpoint of the given datasite's app.
pub struct BridgeClientTransport<'a> {
    client: &'a RpcClient,
    target_datasite: String,
    app_name: String,
    expiry: String,
    poll_interval: Duration,
}

impl<'a> BridgeClientTransport<'a> {
    pub fn new(client: &'a RpcClient, target_datasite: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            client,
            target_datasite: target_datasite.into(),
            app_name: app_name.into(),
            expiry: "30s".to_string(),
            poll_interval: Duration::from_millis(200),
        }
    }

    pub fn with_expiry(mut self, expiry: impl Into<String>) -> Self {
        self.expiry = expiry.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sends one HTTP-shaped request and waits for its HTTP-shaped
    /// response, tunneling both through the RPC fabric's request/future
    /// machinery rather than opening a socket directly.
    pub async fn send(
        &self,
        method: &str,
        url: &str,
        headers: Vec<(String, String)>,
        body_bytes: Vec<u8>,
        timeout: Duration,
    ) -> RpcResult<HttpResponseEnvelope> {
        let envelope = HttpRequestEnvelope {
            method: method.to_string(),
            url: url.to_string(),
            headers,
            body_bytes,
            extensions: Default::default(),
        };

        let rpc_method = Method::parse(method).unwrap_or(Method::Post);
        let destination = SyftUrl::new(&self.target_datasite, &self.app_name, "http");

        let future = self
            .client
            .send(
                destination,
                rpc_method,
                Body::Bytes(envelope.encode()?),
                Vec::new(),
                &self.expiry,
                false,
            )
            .await?;

        let response = self.client.wait(&future, timeout, self.poll_interval).await?;
        HttpResponseEnvelope::decode(&response.body)
    }
}
