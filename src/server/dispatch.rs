//! The per-request dispatch pipeline.

use super::routes::{HandlerOutput, RouteTable};
use super::telemetry::ServerTelemetry;
use crate::atomic::{write_atomic, write_empty_atomic};
use crate::config::ClientContext;
use crate::permissions::{PermissionsEngine, Tier};
use crate::protocol::{paths, RequestRecord, ResponseRecord, Status};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Everything one dispatch needs that doesn't change between requests.
pub struct DispatchContext {
    pub client_context: Arc<dyn ClientContext>,
    pub permissions: Arc<PermissionsEngine>,
    pub routes: Arc<RouteTable>,
    pub rpc_dir: PathBuf,
    pub telemetry: Arc<ServerTelemetry>,
}

/// Splits a `.request` file's path into `(endpoint, sender)` using the
/// deterministic layout `<rpc-dir>/<endpoint...>/<sender>/<id>.request`.
fn endpoint_and_sender(rpc_dir: &Path, request_path: &Path) -> Option<(String, String)> {
    let relative = request_path.strip_prefix(rpc_dir).ok()?;
    let components: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if components.len() < 2 {
        return None;
    }
    let sender = components[components.len() - 2].clone();
    let endpoint = components[..components.len() - 2].join("/");
    if endpoint.is_empty() {
        return None;
    }
    Some((endpoint, sender))
}

/// Runs one request file through the full pipeline: duplicate
/// suppression, decode, route match, permission check, handler
/// invocation, response write. Every step that can fail instead writes
/// a terminal artifact (error response, not-found response, or
/// rejection marker) and returns `Ok(())` — a single bad request never
/// propagates an error out of the dispatch loop, so the event server
/// survives any single request's failure.
pub async fn process_request_file(ctx: &DispatchContext, request_path: PathBuf) {
    if paths::sibling_response_path(&request_path)
        .map(|p| p.exists())
        .unwrap_or(false)
        || paths::sibling_rejection_path(&request_path)
            .map(|p| p.exists())
            .unwrap_or(false)
    {
        debug!(path = %request_path.display(), "response or rejection already present, skipping");
        return;
    }

    let Some((endpoint, sender)) = endpoint_and_sender(&ctx.rpc_dir, &request_path) else {
        warn!(path = %request_path.display(), "request file outside expected layout, ignoring");
        return;
    };

    let bytes = match std::fs::read(&request_path) {
        Ok(b) => b,
        Err(e) => {
            error!(path = %request_path.display(), error = %e, "failed to read request file");
            return;
        }
    };

    let request = match RequestRecord::decode(&bytes, Some(&request_path)) {
        Ok(r) => r,
        Err(e) => {
            let id = paths::id_from_filename(&request_path);
            write_error_response(ctx, &endpoint, &sender, id, &e.to_string());
            return;
        }
    };

    if request.is_expired_at(Utc::now()) {
        debug!(id = %request.id, "request already expired, not dispatching");
        return;
    }

    let response_path = paths::response_path(&ctx.rpc_dir, &endpoint, &sender, request.id);
    let rejection_path = paths::rejection_path(&ctx.rpc_dir, &endpoint, &sender, request.id);

    let Some((handler, captures)) = ctx.routes.match_route(&endpoint) else {
        let response = ResponseRecord {
            id: request.id,
            sender: ctx.client_context.local_datasite().to_string(),
            url: request.url.clone(),
            status: Status::NotFound,
            headers: Vec::new(),
            body: format!("no route for endpoint {endpoint}").into_bytes(),
            created: Utc::now(),
            expires: request.expires,
        };
        write_final_response(&response_path, &response);
        return;
    };

    let permission = match ctx.permissions.compute(
        &ctx.client_context.datasites_root(),
        &response_path,
        &request.sender,
    ) {
        Ok(p) => p,
        Err(e) => {
            write_error_response(ctx, &endpoint, &sender, Some(request.id), &e.to_string());
            return;
        }
    };
    if !permission.allows(Tier::Read) {
        if let Err(e) = write_empty_atomic(&rejection_path) {
            error!(path = %rejection_path.display(), error = %e, "failed to write rejection marker");
        }
        return;
    }

    let request_id = request.id;
    let request_url = request.url.clone();
    let request_expires = request.expires;
    let local = ctx.client_context.local_datasite().to_string();

    let outcome = (handler)(request, captures).await;
    let response = match outcome {
        Ok(HandlerOutput::Response(r)) => r,
        Ok(HandlerOutput::Body(body)) => match body.into_bytes() {
            Ok(bytes) => ResponseRecord {
                id: request_id,
                sender: local,
                url: request_url,
                status: Status::Completed,
                headers: Vec::new(),
                body: bytes,
                created: Utc::now(),
                expires: request_expires,
            },
            Err(e) => error_response(request_id, &local, request_url, request_expires, &e.to_string()),
        },
        Err(e) => error_response(request_id, &local, request_url, request_expires, &e.to_string()),
    };

    write_final_response(&response_path, &response);
    ctx.telemetry.requests_processed.fetch_add(1, Ordering::Relaxed);
}

fn error_response(
    id: uuid::Uuid,
    local: &str,
    url: crate::url::SyftUrl,
    expires: chrono::DateTime<Utc>,
    message: &str,
) -> ResponseRecord {
    ResponseRecord {
        id,
        sender: local.to_string(),
        url,
        status: Status::Error,
        headers: Vec::new(),
        body: message.as_bytes().to_vec(),
        created: Utc::now(),
        expires,
    }
}

fn write_error_response(
    ctx: &DispatchContext,
    endpoint: &str,
    sender: &str,
    id: Option<uuid::Uuid>,
    message: &str,
) {
    let Some(id) = id else {
        error!(endpoint, sender, message, "undecodable request with no recoverable id, dropping");
        return;
    };
    let response_path = paths::response_path(&ctx.rpc_dir, endpoint, sender, id);
    if response_path.exists() {
        return;
    }
    let url = crate::url::SyftUrl::new(ctx.client_context.local_datasite(), "unknown", endpoint);
    let response = ResponseRecord {
        id,
        sender: ctx.client_context.local_datasite().to_string(),
        url,
        status: Status::Error,
        headers: Vec::new(),
        body: message.as_bytes().to_vec(),
        created: Utc::now(),
        expires: Utc::now(),
    };
    write_final_response(&response_path, &response);
}

fn write_final_response(path: &Path, response: &ResponseRecord) {
    if let Err(e) = write_atomic(path, &response.encode()) {
        error!(path = %path.display(), error = %e, "failed to write response file");
    }
}
