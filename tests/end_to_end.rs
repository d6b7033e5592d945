//! End-to-end scenarios across two simulated datasites sharing one
//! synced workspace directory.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use syft_rpc::config::{BridgeConfig, ClientContext};
use syft_rpc::future_store::FutureStore;
use syft_rpc::permissions::PermissionsEngine;
use syft_rpc::protocol::{Body, Method, Status};
use syft_rpc::server::{EventServer, HandlerOutput, RouteTable};
use syft_rpc::url::SyftUrl;
use syft_rpc::RpcClient;

/// Installs a test-scoped subscriber so failures come with the dispatch
/// and permission traces instead of bare assertion output. Safe to call
/// from every test; only the first call wins.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

struct Peer {
    local: String,
    workspace: PathBuf,
}

impl ClientContext for Peer {
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
    let context = Arc::new(Peer {
        local: local.to_string(),
        workspace: workspace.to_path_buf(),
    });
    let store = FutureStore::open(&workspace.join(format!("{local}.redb"))).unwrap();
    RpcClient::new(context, store, Arc::new(PermissionsEngine::new(true)))
}

/// Grants `*` read on every path under `app`'s rpc tree for `datasite`,
/// so any requester can read the responses written there.
fn grant_world_read(workspace: &Path, datasite: &str, app: &str) {
    let rpc_dir = workspace.join("datasites").join(datasite).join("app_data").join(app).join("rpc");
    std::fs::create_dir_all(&rpc_dir).unwrap();
    std::fs::write(
        rpc_dir.join("syft.pub.yaml"),
        "rules:\n  - pattern: \"**\"\n    access:\n      read: [\"*\"]\n",
    )
    .unwrap();
}

#[tokio::test]
async fn ping_pong() {
    init_tracing();
    let tmp = tempfile::TempDir::new().unwrap();
    let workspace = tmp.path();
    grant_world_read(workspace, "bob@example.com", "ping");

    let mut routes = RouteTable::new();
    routes.register(
        "ping",
        Arc::new(|_req, _captures| {
            Box::pin(async { Ok(HandlerOutput::Body(Body::json_from(&serde_json::json!({"reply": "hi from B"}))?)) })
        }),
    );
    let bob_context = Arc::new(Peer {
        local: "bob@example.com".to_string(),
        workspace: workspace.to_path_buf(),
    });
    let mut server = EventServer::new(
        syft_rpc::config::EventServerConfig {
            app_name: "ping".to_string(),
            workers: 2,
            intake_capacity: 16,
            poll_interval: Duration::from_secs(3600),
            shutdown_grace_period: Duration::from_secs(1),
        },
        bob_context,
        Arc::new(PermissionsEngine::new(true)),
        routes,
    );
    server.start().await.unwrap();

    let alice = make_client(workspace, "alice@example.com");
    let url = SyftUrl::new("bob@example.com", "ping", "ping");
    let future = alice
        .send(url, Method::Get, Body::Json(serde_json::json!({"msg": "hi"})), vec![], "30s", false)
        .await
        .unwrap();

    let response = alice
        .wait(&future, Duration::from_secs(10), Duration::from_millis(20))
        .await
        .unwrap();

    assert_eq!(response.status, Status::Completed);
    let parsed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(parsed["reply"], "hi from B");

    server.stop().await;
}

#[tokio::test]
async fn permission_denial() {
    init_tracing();
    let tmp = tempfile::TempDir::new().unwrap();
    let workspace = tmp.path();

    // Bob grants Alice read only under `data/public.csv`; nothing under
    // `data/private`, so the response Alice expects there is rejected.
    let rpc_dir = workspace
        .join("datasites")
        .join("bob@example.com")
        .join("app_data")
        .join("files")
        .join("rpc");
    std::fs::create_dir_all(&rpc_dir).unwrap();
    std::fs::write(
        rpc_dir.join("syft.pub.yaml"),
        "rules:\n  - pattern: \"data/public.csv/**\"\n    access:\n      read: [\"alice@example.com\"]\n",
    )
    .unwrap();

    // The endpoint has a matching route (route matching comes before the
    // permission check per spec §4.6); what's under test is that the
    // permission check still rejects once dispatch gets that far.
    let mut routes = RouteTable::new();
    routes.register(
        "data/**",
        Arc::new(|_req, _captures| Box::pin(async { Ok(HandlerOutput::Body(Body::Text("secret".to_string()))) })),
    );
    let bob_context = Arc::new(Peer {
        local: "bob@example.com".to_string(),
        workspace: workspace.to_path_buf(),
    });
    let mut server = EventServer::new(
        syft_rpc::config::EventServerConfig {
            app_name: "files".to_string(),
            workers: 1,
            intake_capacity: 16,
            poll_interval: Duration::from_secs(3600),
            shutdown_grace_period: Duration::from_secs(1),
        },
        bob_context,
        Arc::new(PermissionsEngine::new(true)),
        routes,
    );
    server.start().await.unwrap();

    let alice = make_client(workspace, "alice@example.com");
    let url = SyftUrl::new("bob@example.com", "files", "data/private/secret.csv");
    let future = alice
        .send(url, Method::Get, Body::Text("give me the file".to_string()), vec![], "5s", false)
        .await
        .unwrap();

    let response = alice
        .wait(&future, Duration::from_secs(5), Duration::from_millis(20))
        .await
        .unwrap();

    assert_eq!(response.status, Status::Rejected);

    server.stop().await;
}

/// When an endpoint has no registered route at all, dispatch must answer
/// `NotFound` at the route-match step without ever consulting the
/// permissions engine — even when the sender would otherwise be denied.
#[tokio::test]
async fn unregistered_endpoint_short_circuits_before_permission_check() {
    init_tracing();
    let tmp = tempfile::TempDir::new().unwrap();
    let workspace = tmp.path();

    let rpc_dir = workspace
        .join("datasites")
        .join("bob@example.com")
        .join("app_data")
        .join("files")
        .join("rpc");
    std::fs::create_dir_all(&rpc_dir).unwrap();
    std::fs::write(
        rpc_dir.join("syft.pub.yaml"),
        "rules:\n  - pattern: \"data/public.csv/**\"\n    access:\n      read: [\"alice@example.com\"]\n",
    )
    .unwrap();

    // No route is registered at all.
    let routes = RouteTable::new();
    let bob_context = Arc::new(Peer {
        local: "bob@example.com".to_string(),
        workspace: workspace.to_path_buf(),
    });
    let mut server = EventServer::new(
        syft_rpc::config::EventServerConfig {
            app_name: "files".to_string(),
            workers: 1,
            intake_capacity: 16,
            poll_interval: Duration::from_secs(3600),
            shutdown_grace_period: Duration::from_secs(1),
        },
        bob_context,
        Arc::new(PermissionsEngine::new(true)),
        routes,
    );
    server.start().await.unwrap();

    let alice = make_client(workspace, "alice@example.com");
    let url = SyftUrl::new("bob@example.com", "files", "data/private/secret.csv");
    let future = alice
        .send(url, Method::Get, Body::Text("give me the file".to_string()), vec![], "5s", false)
        .await
        .unwrap();

    let response = alice
        .wait(&future, Duration::from_secs(5), Duration::from_millis(20))
        .await
        .unwrap();

    assert_eq!(response.status, Status::NotFound);

    server.stop().await;
}

#[tokio::test]
async fn broadcast_partial_failure() {
    init_tracing();
    let tmp = tempfile::TempDir::new().unwrap();
    let workspace = tmp.path();

    for site in ["bob@example.com", "carol@example.com"] {
        grant_world_read(workspace, site, "ping");
    }

    let mut servers = Vec::new();
    for site in ["bob@example.com", "carol@example.com"] {
        let mut routes = RouteTable::new();
        routes.register(
            "ping",
            Arc::new(|_req, _captures| {
                Box::pin(async { Ok(HandlerOutput::Body(Body::Text("pong".to_string()))) })
            }),
        );
        let context = Arc::new(Peer {
            local: site.to_string(),
            workspace: workspace.to_path_buf(),
        });
        let mut server = EventServer::new(
            syft_rpc::config::EventServerConfig {
                app_name: "ping".to_string(),
                workers: 1,
                intake_capacity: 16,
                poll_interval: Duration::from_secs(3600),
                shutdown_grace_period: Duration::from_secs(1),
            },
            context,
            Arc::new(PermissionsEngine::new(true)),
            routes,
        );
        server.start().await.unwrap();
        servers.push(server);
    }
    // dave@example.com never runs a server: that target stays pending.

    let alice = make_client(workspace, "alice@example.com");
    let urls = vec![
        SyftUrl::new("bob@example.com", "ping", "ping"),
        SyftUrl::new("carol@example.com", "ping", "ping"),
        SyftUrl::new("dave@example.com", "ping", "ping"),
    ];
    let bulk = alice
        .broadcast(urls, Method::Get, Body::Text("hi".to_string()), vec![], "30s", false)
        .await;

    let gathered = alice.gather_completed(&bulk, Duration::from_millis(500)).await.unwrap();

    assert_eq!(gathered.successes.len(), 2);
    assert_eq!(gathered.pending.len(), 1);
    assert!(gathered.failures.is_empty());

    for mut server in servers {
        server.stop().await;
    }
}

#[tokio::test]
async fn duplicate_suppression() {
    init_tracing();
    let tmp = tempfile::TempDir::new().unwrap();
    let workspace = tmp.path();
    grant_world_read(workspace, "bob@example.com", "ping");

    let mut routes = RouteTable::new();
    routes.register(
        "ping",
        Arc::new(|_req, _captures| Box::pin(async { Ok(HandlerOutput::Body(Body::Text("pong".to_string()))) })),
    );
    let context = Arc::new(Peer {
        local: "bob@example.com".to_string(),
        workspace: workspace.to_path_buf(),
    });
    let permissions = Arc::new(PermissionsEngine::new(true));
    let routes = Arc::new(routes);
    let rpc_dir = context
        .datasites_root()
        .join(&context.local)
        .join("app_data")
        .join("ping")
        .join("rpc");

    let id = uuid::Uuid::new_v4();
    let now = chrono::Utc::now();
    let request = syft_rpc::protocol::RequestRecord {
        id,
        sender: "alice@example.com".to_string(),
        url: SyftUrl::new("bob@example.com", "ping", "ping"),
        method: Method::Get,
        headers: vec![],
        body: b"hi".to_vec(),
        created: now,
        expires: now + chrono::Duration::seconds(30),
    };
    let request_path = syft_rpc::protocol::paths::request_path(&rpc_dir, "ping", "alice@example.com", id);
    syft_rpc::atomic::write_atomic(&request_path, &request.encode()).unwrap();

    let dispatch_ctx = syft_rpc::server::DispatchContext {
        client_context: context,
        permissions,
        routes,
        rpc_dir,
        telemetry: Arc::new(syft_rpc::server::ServerTelemetry::default()),
    };

    syft_rpc::server::dispatch::process_request_file(&dispatch_ctx, request_path.clone()).await;
    let response_path = syft_rpc::protocol::paths::response_path(
        &dispatch_ctx.rpc_dir,
        "ping",
        "alice@example.com",
        id,
    );
    let first_modified = std::fs::metadata(&response_path).unwrap().modified().unwrap();

    // Simulate the watcher firing twice for the same file.
    syft_rpc::server::dispatch::process_request_file(&dispatch_ctx, request_path).await;
    let second_modified = std::fs::metadata(&response_path).unwrap().modified().unwrap();

    assert_eq!(first_modified, second_modified, "second dispatch must not rewrite the response");
}

#[tokio::test]
async fn http_bridge_round_trip() {
    init_tracing();
    let tmp = tempfile::TempDir::new().unwrap();
    let workspace = tmp.path();
    grant_world_read(workspace, "bob@example.com", "bridge");

    // A bare-bones loopback HTTP server that answers exactly one
    // request with `200 ok`, standing in for `api.example.com`.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let upstream = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf).unwrap();
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .unwrap();
    });

    let mut routes = RouteTable::new();
    routes.register(
        syft_rpc::bridge::BRIDGE_ENDPOINT_PATTERN,
        syft_rpc::bridge::bridge_handler(BridgeConfig {
            allowed_hosts: vec![format!("127.0.0.1:{}", addr.port())],
            upstream_timeout: Duration::from_secs(5),
        }),
    );
    let context = Arc::new(Peer {
        local: "bob@example.com".to_string(),
        workspace: workspace.to_path_buf(),
    });
    let mut server = EventServer::new(
        syft_rpc::config::EventServerConfig {
            app_name: "bridge".to_string(),
            workers: 1,
            intake_capacity: 16,
            poll_interval: Duration::from_secs(3600),
            shutdown_grace_period: Duration::from_secs(1),
        },
        context,
        Arc::new(PermissionsEngine::new(true)),
        routes,
    );
    server.start().await.unwrap();

    let alice_client = make_client(workspace, "alice@example.com");
    let transport = syft_rpc::bridge::BridgeClientTransport::new(&alice_client, "bob@example.com", "bridge");
    let response = transport
        .send(
            "GET",
            &format!("http://127.0.0.1:{}/status", addr.port()),
            vec![],
            vec![],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body_bytes, b"ok");

    upstream.join().unwrap();
    server.stop().await;
}
