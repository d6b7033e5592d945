//! Route registration and matching.
//!
//! Patterns are exact endpoint paths, optionally with per-segment
//! wildcards (`{name}`) and a trailing double-star catch-all (`**`).
//! Longer/more-specific patterns outrank shorter ones; ties are broken
//! by registration order, keeping the route map a homogeneous
//! `endpoint pattern -> handler` table rather than dispatching on
//! handler signature at runtime.

use crate::error::RpcResult;
use crate::protocol::{Body, RequestRecord, ResponseRecord};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What a handler may hand back; the server wraps [`HandlerOutput::Body`]
/// in a `completed` response itself.
pub enum HandlerOutput {
    Response(ResponseRecord),
    Body(Body),
}

impl From<Body> for HandlerOutput {
    fn from(body: Body) -> Self {
        HandlerOutput::Body(body)
    }
}

impl From<ResponseRecord> for HandlerOutput {
    fn from(response: ResponseRecord) -> Self {
        HandlerOutput::Response(response)
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = RpcResult<HandlerOutput>> + Send>>;

/// A uniform handler type: every registered endpoint has this same
/// shape, regardless of what structured request/response type its
/// author actually cares about. Handlers that want typed bodies parse
/// them at their own boundary via [`crate::protocol::Body::as_json`].
pub type BoxedHandler = Arc<dyn Fn(RequestRecord, Captures) -> HandlerFuture + Send + Sync>;

/// Named segments captured from a `{name}` pattern match.
pub type Captures = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard(String),
}

/// A parsed route pattern plus the endpoint-segment match logic.
#[derive(Debug, Clone)]
struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
    /// True if the pattern ends in a bare `**`, matching any remaining
    /// suffix of the endpoint (zero or more segments).
    catch_all_suffix: bool,
}

impl RoutePattern {
    fn parse(raw: &str) -> Self {
        let mut parts: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
        let catch_all_suffix = parts.last() == Some(&"**");
        if catch_all_suffix {
            parts.pop();
        }
        let segments = parts
            .into_iter()
            .map(|p| {
                if let Some(name) = p.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                    Segment::Wildcard(name.to_string())
                } else {
                    Segment::Literal(p.to_string())
                }
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
            catch_all_suffix,
        }
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    fn matches(&self, endpoint: &str) -> Option<Captures> {
        let parts: Vec<&str> = endpoint.split('/').filter(|s| !s.is_empty()).collect();

        if self.catch_all_suffix {
            if parts.len() < self.segments.len() {
                return None;
            }
        } else if parts.len() != self.segments.len() {
            return None;
        }

        let mut captures = Captures::new();
        for (segment, part) in self.segments.iter().zip(parts.iter()) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Wildcard(name) => {
                    captures.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(captures)
    }
}

struct Route {
    pattern: RoutePattern,
    handler: BoxedHandler,
    request_type: Option<String>,
    response_type: Option<String>,
    registration_order: usize,
}

/// Machine-readable description of one registered route, published to
/// `rpc.schema.json` at startup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RouteSchemaEntry {
    pub endpoint: String,
    pub request_type: String,
    pub response_type: String,
}

/// The registered (pattern, handler) pairs for one app's event server.
/// Matching picks the most specific pattern that matches, with ties
/// broken by earlier registration.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers `handler` for `pattern`. Later calls for the identical
    /// pattern string do not replace an earlier registration; register
    /// once per endpoint.
    pub fn register(&mut self, pattern: &str, handler: BoxedHandler) {
        self.register_typed(pattern, handler, None, None);
    }

    pub fn register_typed(
        &mut self,
        pattern: &str,
        handler: BoxedHandler,
        request_type: Option<&str>,
        response_type: Option<&str>,
    ) {
        let registration_order = self.routes.len();
        self.routes.push(Route {
            pattern: RoutePattern::parse(pattern),
            handler,
            request_type: request_type.map(str::to_string),
            response_type: response_type.map(str::to_string),
            registration_order,
        });
    }

    /// Finds the best-matching route for `endpoint`, per the
    /// specificity/registration-order tie-break rule.
    pub fn match_route(&self, endpoint: &str) -> Option<(&BoxedHandler, Captures)> {
        let mut best: Option<(&Route, Captures)> = None;
        for route in &self.routes {
            if let Some(captures) = route.pattern.matches(endpoint) {
                let better = match &best {
                    None => true,
                    Some((current, _)) => is_more_specific(route, current),
                };
                if better {
                    best = Some((route, captures));
                }
            }
        }
        best.map(|(route, captures)| (&route.handler, captures))
    }

    /// Builds the schema published to `rpc.schema.json`.
    pub fn schema(&self) -> Vec<RouteSchemaEntry> {
        self.routes
            .iter()
            .map(|r| RouteSchemaEntry {
                endpoint: r.pattern.raw.clone(),
                request_type: r.request_type.clone().unwrap_or_else(|| "bytes".to_string()),
                response_type: r.response_type.clone().unwrap_or_else(|| "bytes".to_string()),
            })
            .collect()
    }
}

/// `a` outranks `b` iff it has more literal segments, or — on a tie —
/// more total segments (a bare pattern beats its own `**` suffix
/// variant), or — on a further tie — it was registered earlier.
fn is_more_specific(a: &Route, b: &Route) -> bool {
    let a_literals = a.pattern.literal_count();
    let b_literals = b.pattern.literal_count();
    if a_literals != b_literals {
        return a_literals > b_literals;
    }
    let a_len = a.pattern.segments.len();
    let b_len = b.pattern.segments.len();
    if a_len != b_len {
        return a_len > b_len;
    }
    a.registration_order < b.registration_order
}
