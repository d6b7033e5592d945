//! The RPC client API: `send`, `broadcast`, `reply_to`, and resolving
//! futures.

use super::bulk::{BulkFuture, SendOutcome};
use crate::atomic::write_atomic;
use crate::config::ClientContext;
use crate::error::{RpcError, RpcResult};
use crate::future_store::{
    compute_fingerprint, Future, FutureOutcome, FutureRecord, FutureStore, GatherResult,
};
use crate::permissions::{PermissionsEngine, Tier};
use crate::protocol::{duration::parse_duration, paths, Body, Method, RequestRecord, ResponseRecord, Status};
use crate::url::SyftUrl;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Adds up to 20% random jitter to a poll interval so that many futures
/// waiting on the same peer don't all wake and re-check the filesystem
/// in lockstep.
fn jittered(interval: Duration) -> Duration {
    let extra_millis = (interval.as_millis() as f64 * 0.2 * rand::rng().random::<f64>()) as u64;
    interval + Duration::from_millis(extra_millis)
}

/// The client-side entry point for sending requests, broadcasting to
/// several targets, replying to a received request, and polling
/// futures to completion. Cheap to clone: every field is an `Arc` (or,
/// for `FutureStore`, a wrapper around one) — `broadcast` clones one
/// per spawned send so targets are dispatched concurrently.
#[derive(Clone)]
pub struct RpcClient {
    context: Arc<dyn ClientContext>,
    store: FutureStore,
    permissions: Arc<PermissionsEngine>,
}

impl RpcClient {
    pub fn new(
        context: Arc<dyn ClientContext>,
        store: FutureStore,
        permissions: Arc<PermissionsEngine>,
    ) -> Self {
        Self {
            context,
            store,
            permissions,
        }
    }

    /// Sends a request and returns a handle to its eventual response.
    pub async fn send(
        &self,
        url: SyftUrl,
        method: Method,
        body: Body,
        headers: Vec<(String, String)>,
        expiry: &str,
        cache: bool,
    ) -> RpcResult<Future> {
        let expiry_duration = parse_duration(expiry)?;
        if expiry_duration.is_zero() {
            return Err(RpcError::InvalidExpiry(expiry.to_string()));
        }

        let body_bytes = body.into_bytes()?;
        let fingerprint = if cache {
            Some(compute_fingerprint(method.as_str(), &url.to_string(), &headers, &body_bytes))
        } else {
            None
        };

        if let Some(fp) = &fingerprint {
            if let Some(existing) = self.store.lookup_by_fingerprint(fp)? {
                return Ok(Future::new(existing));
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let expires = now
            + chrono::Duration::from_std(expiry_duration)
                .map_err(|_| RpcError::InvalidExpiry(expiry.to_string()))?;
        let sender = self.context.local_datasite().to_string();
        let rpc_dir = url.app_rpc_root(self.context.workspace_root());

        let request = RequestRecord {
            id,
            sender: sender.clone(),
            url: url.clone(),
            method,
            headers,
            body: body_bytes,
            created: now,
            expires,
        };

        let request_path = paths::request_path(&rpc_dir, url.endpoint(), &sender, id);
        write_atomic(&request_path, &request.encode())?;

        let response_path = paths::response_path(&rpc_dir, url.endpoint(), &sender, id);
        let rejection_path = paths::rejection_path(&rpc_dir, url.endpoint(), &sender, id);

        let record = FutureRecord {
            id,
            response_path,
            rejection_path,
            url,
            created: now,
            expires,
            cache_fingerprint: fingerprint,
        };
        self.store.register(&record)?;

        Ok(Future::new(record))
    }

    /// Sends to every target in `urls` in parallel. Individual send
    /// failures are recorded per-url and never abort the rest.
    pub async fn broadcast(
        &self,
        urls: Vec<SyftUrl>,
        method: Method,
        body: Body,
        headers: Vec<(String, String)>,
        expiry: &str,
        cache: bool,
    ) -> BulkFuture {
        let mut tasks = tokio::task::JoinSet::new();
        for url in urls {
            let client = self.clone();
            let body = body.clone();
            let headers = headers.clone();
            let expiry = expiry.to_string();
            tasks.spawn(async move {
                match client.send(url.clone(), method, body, headers, &expiry, cache).await {
                    Ok(future) => SendOutcome::Sent(future),
                    Err(e) => SendOutcome::Failed(url, e.to_string()),
                }
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!(error = %e, "broadcast send task panicked");
                }
            }
        }
        BulkFuture::new(outcomes)
    }

    /// Writes a response to a previously received request. Fails with
    /// `NotAuthorized` if the local datasite lacks write permission on
    /// the response path.
    pub fn reply_to(
        &self,
        request: &RequestRecord,
        body: Body,
        headers: Vec<(String, String)>,
        status: Status,
    ) -> RpcResult<ResponseRecord> {
        let responder = self.context.local_datasite().to_string();
        let rpc_dir = request.url.app_rpc_root(self.context.workspace_root());
        let response_path = paths::response_path(&rpc_dir, request.url.endpoint(), &request.sender, request.id);

        let permission = self.permissions.compute(
            &self.context.datasites_root(),
            &response_path,
            &responder,
        )?;
        if !permission.allows(Tier::Write) {
            return Err(RpcError::NotAuthorized {
                operation: "write".to_string(),
                path: response_path.display().to_string(),
            });
        }

        let response = ResponseRecord {
            id: request.id,
            sender: responder,
            url: request.url.clone(),
            status,
            headers,
            body: body.into_bytes()?,
            created: Utc::now(),
            expires: request.expires,
        };
        write_atomic(&response_path, &response.encode())?;
        Ok(response)
    }

    /// Non-blocking check of a future's state.
    pub fn resolve(&self, future: &Future) -> RpcResult<Option<ResponseRecord>> {
        let record = &future.record;

        if record.rejection_path.exists() {
            return Ok(Some(ResponseRecord::synthesize_rejected(
                record.id,
                record.url.datasite(),
                record.url.clone(),
                record.expires,
            )));
        }

        if record.response_path.exists() {
            let bytes = std::fs::read(&record.response_path).map_err(|e| RpcError::Io {
                source: e,
                path: Some(record.response_path.clone()),
            })?;
            let response = ResponseRecord::decode(&bytes, Some(&record.response_path))?;
            return Ok(Some(response));
        }

        if Utc::now() > record.expires {
            return Ok(Some(ResponseRecord::synthesize_expired(
                record.id,
                record.url.datasite(),
                record.url.clone(),
                record.expires,
            )));
        }

        Ok(None)
    }

    /// Blocks (asynchronously) until `future` settles or `timeout`
    /// elapses.
    pub async fn wait(
        &self,
        future: &Future,
        timeout: Duration,
        poll_interval: Duration,
    ) -> RpcResult<ResponseRecord> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(response) = self.resolve(future)? {
                return Ok(response);
            }
            if Instant::now() >= deadline {
                return Err(RpcError::Timeout {
                    id: future.id().to_string(),
                });
            }
            tokio::time::sleep(jittered(poll_interval)).await;
        }
    }

    /// Polls every future in `bulk` concurrently until all are in a
    /// terminal state or `timeout` elapses.
    pub async fn gather_completed(&self, bulk: &BulkFuture, timeout: Duration) -> RpcResult<GatherResult> {
        let mut result = GatherResult::default();
        let mut pending: Vec<&Future> = Vec::new();

        for outcome in &bulk.outcomes {
            match outcome {
                SendOutcome::Sent(future) => pending.push(future),
                SendOutcome::Failed(url, reason) => {
                    let synthesized = ResponseRecord {
                        id: Uuid::nil(),
                        sender: url.datasite().to_string(),
                        url: url.clone(),
                        status: Status::Error,
                        headers: Vec::new(),
                        body: reason.as_bytes().to_vec(),
                        created: Utc::now(),
                        expires: Utc::now(),
                    };
                    result.record(url.clone(), FutureOutcome::Resolved(synthesized));
                }
            }
        }

        let deadline = Instant::now() + timeout;
        let poll_interval = Duration::from_millis(200);

        loop {
            let mut still_pending = Vec::new();
            for future in pending {
                match self.resolve(future)? {
                    Some(response) => result.record(future.url().clone(), FutureOutcome::Resolved(response)),
                    None => still_pending.push(future),
                }
            }
            pending = still_pending;

            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(jittered(poll_interval)).await;
        }

        for future in pending {
            result.pending.push(future.url().clone());
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Status;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct TestContext {
        local: String,
        workspace: PathBuf,
    }

    impl ClientContext for TestContext {
        fn local_datasite(&self) -> &str {
            &self.local
        }

        fn workspace_root(&self) -> &Path {
            &self.workspace
        }

        fn path_to_url(&self, _path: &Path) -> Option<SyftUrl> {
            None
        }
    }

    fn make_client(workspace: &Path, local: &str) -> RpcClient {
        let context = Arc::new(TestContext {
            local: local.to_string(),
            workspace: workspace.to_path_buf(),
        });
        let store = FutureStore::open(&workspace.join("futures.redb")).unwrap();
        let permissions = Arc::new(PermissionsEngine::new(true));
        RpcClient::new(context, store, permissions)
    }

    #[tokio::test]
    async fn send_creates_request_file_and_future() {
        let tmp = TempDir::new().unwrap();
        let client = make_client(tmp.path(), "alice@example.com");
        let url = SyftUrl::new("bob@example.com", "ping", "ping");

        let future = client
            .send(url.clone(), Method::Get, Body::Text("hi".to_string()), vec![], "30s", false)
            .await
            .unwrap();

        let rpc_dir = url.app_rpc_root(tmp.path());
        let request_path = paths::request_path(&rpc_dir, "ping", "alice@example.com", future.id());
        assert!(request_path.exists());
    }

    #[tokio::test]
    async fn cache_hit_reuses_existing_future() {
        let tmp = TempDir::new().unwrap();
        let client = make_client(tmp.path(), "alice@example.com");
        let url = SyftUrl::new("bob@example.com", "ping", "ping");

        let first = client
            .send(url.clone(), Method::Get, Body::Text("hi".to_string()), vec![], "30s", true)
            .await
            .unwrap();
        let second = client
            .send(url, Method::Get, Body::Text("hi".to_string()), vec![], "30s", true)
            .await
            .unwrap();

        assert_eq!(first.id(), second.id());
    }

    #[tokio::test]
    async fn resolve_is_none_while_pending() {
        let tmp = TempDir::new().unwrap();
        let client = make_client(tmp.path(), "alice@example.com");
        let url = SyftUrl::new("bob@example.com", "ping", "ping");
        let future = client
            .send(url, Method::Get, Body::Text("hi".to_string()), vec![], "30s", false)
            .await
            .unwrap();

        assert!(client.resolve(&future).unwrap().is_none());
    }

    #[tokio::test]
    async fn wait_times_out_when_no_response_arrives() {
        let tmp = TempDir::new().unwrap();
        let client = make_client(tmp.path(), "alice@example.com");
        let url = SyftUrl::new("bob@example.com", "ping", "ping");
        let future = client
            .send(url, Method::Get, Body::Text("hi".to_string()), vec![], "30s", false)
            .await
            .unwrap();

        let result = client
            .wait(&future, Duration::from_millis(50), Duration::from_millis(10))
            .await;
        assert!(matches!(result, Err(RpcError::Timeout { .. })));
    }

    #[tokio::test]
    async fn wait_returns_synthesized_rejection_when_marker_present() {
        let tmp = TempDir::new().unwrap();
        let client = make_client(tmp.path(), "alice@example.com");
        let url = SyftUrl::new("bob@example.com", "ping", "ping");
        let future = client
            .send(url, Method::Get, Body::Text("hi".to_string()), vec![], "30s", false)
            .await
            .unwrap();

        crate::atomic::write_empty_atomic(&future.record.rejection_path).unwrap();

        let response = client
            .wait(&future, Duration::from_millis(50), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(response.status, Status::Rejected);
    }
}
