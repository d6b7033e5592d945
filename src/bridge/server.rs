//! Bridge server side: an event-server handler for `http/**` that
//! forwards tunneled HTTP requests to an allow-listed upstream.

use crate::config::BridgeConfig;
use crate::protocol::{Body, HttpRequestEnvelope, HttpResponseEnvelope};
use crate::server::{BoxedHandler, HandlerOutput};
use reqwest::Method as ReqwestMethod;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Builds the handler to register under [`super::BRIDGE_ENDPOINT_PATTERN`].
/// Every host check and upstream call happens inside this closure; the
/// dispatch pipeline around it is the ordinary one, so a
/// rejected or failed upstream call still yields a `completed` RPC-level
/// response carrying a synthetic HTTP-level envelope, keeping RPC-layer
/// failures distinct from tunneled HTTP-layer failures.
pub fn bridge_handler(config: BridgeConfig) -> BoxedHandler {
    let timeout = if config.upstream_timeout.is_zero() {
        DEFAULT_UPSTREAM_TIMEOUT
    } else {
        config.upstream_timeout
    };
    let config = Arc::new(config);
    let client = Arc::new(
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new()),
    );

    Arc::new(move |request, _captures| {
        let config = Arc::clone(&config);
        let client = Arc::clone(&client);
        Box::pin(async move {
            let envelope = match HttpRequestEnvelope::decode(&request.body) {
                Ok(e) => e,
                Err(e) => {
                    let response = HttpResponseEnvelope::bad_gateway(&e.to_string());
                    return Ok(HandlerOutput::Body(Body::Bytes(response.encode()?)));
                }
            };

            let response_envelope = forward(&client, &config, &envelope).await;
            Ok(HandlerOutput::Body(Body::Bytes(response_envelope.encode()?)))
        })
    })
}

async fn forward(
    client: &reqwest::Client,
    config: &BridgeConfig,
    envelope: &HttpRequestEnvelope,
) -> HttpResponseEnvelope {
    let url = match reqwest::Url::parse(&envelope.url) {
        Ok(u) => u,
        Err(e) => return HttpResponseEnvelope::bad_gateway(&format!("malformed upstream url: {e}")),
    };

    let host = match url.host_str() {
        Some(h) => h.to_string(),
        None => return HttpResponseEnvelope::bad_gateway("upstream url has no host"),
    };

    if !config.allowed_hosts.iter().any(|allowed| allowed == &host) {
        warn!(%host, "bridge rejected upstream host outside allow-list");
        return HttpResponseEnvelope::forbidden(&host);
    }

    let method = match ReqwestMethod::from_bytes(envelope.method.as_bytes()) {
        Ok(m) => m,
        Err(_) => return HttpResponseEnvelope::bad_gateway("unrecognized HTTP method"),
    };

    let mut builder = client.request(method, url).body(envelope.body_bytes.clone());
    for (name, value) in &envelope.headers {
        builder = builder.header(name, value);
    }

    match builder.send().await {
        Ok(upstream) => {
            let status_code = upstream.status().as_u16();
            let reason_phrase = upstream
                .status()
                .canonical_reason()
                .unwrap_or("")
                .to_string();
            let headers = upstream
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        value.to_str().unwrap_or_default().to_string(),
                    )
                })
                .collect();
            let body_bytes = upstream.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            debug!(%host, status_code, "bridge forwarded request upstream");
            HttpResponseEnvelope {
                status_code,
                headers,
                body_bytes,
                reason_phrase,
            }
        }
        Err(e) if e.is_timeout() => HttpResponseEnvelope::gateway_timeout(),
        Err(e) => HttpResponseEnvelope::bad_gateway(&e.to_string()),
    }
}

/// Default upstream timeout used when a [`BridgeConfig`] leaves it at
/// the zero-value `Duration::default()`.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);
