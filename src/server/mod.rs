//! The event server: watches an app's RPC tree, dispatches requests to
//! registered handlers, writes responses.

pub mod dispatch;
pub mod routes;
pub mod telemetry;
pub mod watcher;

pub use dispatch::DispatchContext;
pub use routes::{BoxedHandler, Captures, HandlerOutput, RouteSchemaEntry, RouteTable};
pub use telemetry::{ServerTelemetry, ServerTelemetrySnapshot};

use crate::config::{ClientContext, EventServerConfig};
use crate::error::{RpcError, RpcResult};
use crate::permissions::PermissionsEngine;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Name of the published route schema file, relative to an app's RPC
/// root.
pub const SCHEMA_FILE_NAME: &str = "rpc.schema.json";

/// Observes one app's RPC directory and answers requests against a
/// [`RouteTable`]. Construct with [`EventServer::new`], register routes,
/// then call [`EventServer::start`].
pub struct EventServer {
    config: EventServerConfig,
    rpc_dir: PathBuf,
    routes: Arc<RouteTable>,
    telemetry: Arc<ServerTelemetry>,
    client_context: Arc<dyn ClientContext>,
    permissions: Arc<PermissionsEngine>,
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    watcher: Arc<Mutex<Option<watcher::RpcWatcher>>>,
    poll_task: Option<JoinHandle<()>>,
    supervisor_task: Option<JoinHandle<()>>,
}

impl EventServer {
    pub fn new(
        config: EventServerConfig,
        client_context: Arc<dyn ClientContext>,
        permissions: Arc<PermissionsEngine>,
        routes: RouteTable,
    ) -> Self {
        let rpc_dir = client_context
            .datasites_root()
            .join(client_context.local_datasite())
            .join("app_data")
            .join(&config.app_name)
            .join("rpc");
        Self {
            config,
            rpc_dir,
            routes: Arc::new(routes),
            telemetry: Arc::new(ServerTelemetry::default()),
            client_context,
            permissions,
            running: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
            watcher: Arc::new(Mutex::new(None)),
            poll_task: None,
            supervisor_task: None,
        }
    }

    pub fn telemetry(&self) -> ServerTelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Publishes the route schema, runs the startup scan, and spawns the
    /// watcher and worker pool.
    pub async fn start(&mut self) -> RpcResult<()> {
        std::fs::create_dir_all(&self.rpc_dir).map_err(|e| RpcError::Io {
            source: e,
            path: Some(self.rpc_dir.clone()),
        })?;
        self.publish_schema()?;

        let (tx, rx) = mpsc::channel(self.config.intake_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let dispatch_ctx = Arc::new(DispatchContext {
            client_context: Arc::clone(&self.client_context),
            permissions: Arc::clone(&self.permissions),
            routes: Arc::clone(&self.routes),
            rpc_dir: self.rpc_dir.clone(),
            telemetry: Arc::clone(&self.telemetry),
        });

        for path in watcher::scan_existing_requests(&self.rpc_dir) {
            let _ = tx.try_send(path);
        }

        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let initial_watcher = watcher::RpcWatcher::start(
            &self.rpc_dir,
            tx.clone(),
            Arc::clone(&self.telemetry),
            error_tx.clone(),
        )?;
        *self.watcher.lock().await = Some(initial_watcher);

        self.supervisor_task = Some(spawn_watcher_supervisor(
            self.rpc_dir.clone(),
            tx.clone(),
            Arc::clone(&self.telemetry),
            Arc::clone(&self.watcher),
            error_tx,
            error_rx,
        ));

        self.handles = (0..self.config.workers.max(1))
            .map(|_| {
                let rx = Arc::clone(&rx);
                let ctx = Arc::clone(&dispatch_ctx);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        match next {
                            Some(path) => dispatch::process_request_file(&ctx, path).await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        self.poll_task = Some(spawn_poll_task(
            self.rpc_dir.clone(),
            tx,
            self.config.poll_interval,
            Arc::clone(&self.running),
        ));

        self.running.store(true, Ordering::SeqCst);
        info!(app = %self.config.app_name, workers = self.config.workers, "event server started");
        Ok(())
    }

    /// Stops accepting new work and waits up to `shutdown_grace_period`
    /// for in-flight handlers, then cancels whatever remains.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.watcher.lock().await.take();

        if let Some(supervisor) = self.supervisor_task.take() {
            supervisor.abort();
        }
        if let Some(poll_task) = self.poll_task.take() {
            poll_task.abort();
        }

        let grace = self.config.shutdown_grace_period;
        let handles = std::mem::take(&mut self.handles);
        let wait = tokio::time::timeout(grace, futures_join_all(&handles));
        if wait.await.is_err() {
            warn!("shutdown grace period elapsed, cancelling outstanding handlers");
        }
        for handle in handles {
            handle.abort();
        }
        info!(app = %self.config.app_name, "event server stopped");
    }

    fn publish_schema(&self) -> RpcResult<()> {
        let schema = self.routes.schema();
        let json = serde_json::to_vec_pretty(&schema)?;
        crate::atomic::write_atomic(&self.rpc_dir.join(SCHEMA_FILE_NAME), &json)
    }
}

/// Reacts to watcher-reported errors: on the first one, tears down and
/// recreates the `notify` watcher in place; on a second, gives up and
/// marks the server degraded (the poll-rescan task keeps running either
/// way, so requests still get picked up, just on `poll_interval` cadence
/// instead of near-instantly).
fn spawn_watcher_supervisor(
    rpc_dir: PathBuf,
    tx: mpsc::Sender<PathBuf>,
    telemetry: Arc<ServerTelemetry>,
    watcher_slot: Arc<Mutex<Option<watcher::RpcWatcher>>>,
    error_tx: mpsc::UnboundedSender<String>,
    mut error_rx: mpsc::UnboundedReceiver<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut restarted = false;
        while let Some(reason) = error_rx.recv().await {
            if telemetry.degraded.load(Ordering::SeqCst) {
                continue;
            }
            if restarted {
                warn!(reason, "watcher failed again after restart, falling back to poll-only mode");
                telemetry.degraded.store(true, Ordering::SeqCst);
                watcher_slot.lock().await.take();
                continue;
            }

            warn!(reason, "watcher failed, attempting one restart");
            restarted = true;
            watcher_slot.lock().await.take();
            match watcher::RpcWatcher::start(&rpc_dir, tx.clone(), Arc::clone(&telemetry), error_tx.clone()) {
                Ok(fresh) => {
                    telemetry.watcher_restarts.fetch_add(1, Ordering::Relaxed);
                    *watcher_slot.lock().await = Some(fresh);
                }
                Err(e) => {
                    warn!(error = %e, "watcher restart failed, falling back to poll-only mode");
                    telemetry.degraded.store(true, Ordering::SeqCst);
                }
            }
        }
    })
}

/// Complements the watcher with a periodic full rescan, catching any
/// request whose create/rename event the watcher missed.
fn spawn_poll_task(
    rpc_dir: PathBuf,
    tx: mpsc::Sender<PathBuf>,
    interval: std::time::Duration,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }
            for path in watcher::scan_existing_requests(&rpc_dir) {
                if tx.try_send(path.clone()).is_err() {
                    debug!(path = %path.display(), "intake queue full during poll rescan");
                }
            }
        }
    })
}

/// Waits for every handle to finish without pulling in an extra crate
/// for what `futures::future::join_all` would otherwise provide.
async fn futures_join_all(handles: &[JoinHandle<()>]) {
    for handle in handles {
        while !handle.is_finished() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionsEngine;
    use crate::protocol::{paths, Body, Method, RequestRecord};
    use crate::url::SyftUrl;
    use std::path::Path;
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

    #[tokio::test]
    async fn start_publishes_schema_and_processes_startup_scan() {
        let tmp = TempDir::new().unwrap();
        let workspace = tmp.path().to_path_buf();
        let context = Arc::new(TestContext {
            local: "bob@example.com".to_string(),
            workspace: workspace.clone(),
        });

        let mut routes = RouteTable::new();
        routes.register(
            "ping",
            Arc::new(|_req, _captures| {
                Box::pin(async { Ok(HandlerOutput::Body(Body::Text("pong".to_string()))) })
            }),
        );

        let config = EventServerConfig {
            app_name: "ping".to_string(),
            workers: 2,
            intake_capacity: 16,
            poll_interval: std::time::Duration::from_secs(3600),
            shutdown_grace_period: std::time::Duration::from_secs(1),
        };

        let rpc_dir = context
            .datasites_root()
            .join(&context.local)
            .join("app_data")
            .join("ping")
            .join("rpc");
        std::fs::create_dir_all(&rpc_dir).unwrap();
        std::fs::write(
            rpc_dir.join("syft.pub.yaml"),
            "rules:\n  - pattern: \"**\"\n    access:\n      read: [\"*\"]\n",
        )
        .unwrap();
        let id = uuid::Uuid::new_v4();
        let now = chrono::Utc::now();
        let request = RequestRecord {
            id,
            sender: "alice@example.com".to_string(),
            url: SyftUrl::new("bob@example.com", "ping", "ping"),
            method: Method::Get,
            headers: vec![],
            body: b"hi".to_vec(),
            created: now,
            expires: now + chrono::Duration::seconds(30),
        };
        let path = paths::request_path(&rpc_dir, "ping", "alice@example.com", id);
        crate::atomic::write_atomic(&path, &request.encode()).unwrap();

        let mut server = EventServer::new(
            config,
            context.clone(),
            Arc::new(PermissionsEngine::new(true)),
            routes,
        );
        server.start().await.unwrap();
        assert!(server.is_running());

        let response_path = paths::response_path(&rpc_dir, "ping", "alice@example.com", id);
        for _ in 0..50 {
            if response_path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(response_path.exists(), "handler should have answered the startup-scanned request");
        assert!(rpc_dir.join(SCHEMA_FILE_NAME).exists());

        server.stop().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn watcher_supervisor_restarts_once_then_degrades() {
        let tmp = TempDir::new().unwrap();
        let rpc_dir = tmp.path().join("rpc");
        std::fs::create_dir_all(&rpc_dir).unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let telemetry = Arc::new(ServerTelemetry::default());
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let watcher = watcher::RpcWatcher::start(&rpc_dir, tx.clone(), Arc::clone(&telemetry), error_tx.clone())
            .unwrap();
        let watcher_slot = Arc::new(Mutex::new(Some(watcher)));

        let supervisor = spawn_watcher_supervisor(
            rpc_dir.clone(),
            tx,
            Arc::clone(&telemetry),
            Arc::clone(&watcher_slot),
            error_tx.clone(),
            error_rx,
        );

        error_tx.send("simulated overflow".to_string()).unwrap();
        for _ in 0..50 {
            if telemetry.watcher_restarts.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(telemetry.watcher_restarts.load(Ordering::SeqCst), 1);
        assert!(!telemetry.degraded.load(Ordering::SeqCst));
        assert!(watcher_slot.lock().await.is_some());

        error_tx.send("simulated second failure".to_string()).unwrap();
        for _ in 0..50 {
            if telemetry.degraded.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(telemetry.degraded.load(Ordering::SeqCst));
        assert!(watcher_slot.lock().await.is_none());

        supervisor.abort();
    }
}
