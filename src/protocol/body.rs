//! Body serialization rules.
//!
//! A request/response body is always stored on the wire as an opaque
//! byte string; [`Body`] is the typed value a caller hands in or gets
//! back, and [`Body::into_bytes`]/[`Body::from_bytes`] implement the
//! conversion rules.

use crate::error::{RpcError, RpcResult};
use serde::Serialize;
use serde_json::Value;

/// A request or response body before it is flattened to bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

impl Body {
    /// Wraps an arbitrary serializable value as a JSON body, the
    /// "structured typed objects" case.
    pub fn json_from<T: Serialize>(value: &T) -> RpcResult<Self> {
        let json = serde_json::to_value(value).map_err(|_| RpcError::UnserializableBody {
            type_name: std::any::type_name::<T>().to_string(),
        })?;
        Ok(Body::Json(json))
    }

    /// Flattens to the bytes actually written to disk: bytes pass
    /// through, strings are UTF-8, everything JSON-shaped is
    /// canonicalized (sorted object keys) before serializing.
    pub fn into_bytes(self) -> RpcResult<Vec<u8>> {
        match self {
            Body::Bytes(b) => Ok(b),
            Body::Text(s) => Ok(s.into_bytes()),
            Body::Json(v) => {
                let canonical = canonicalize(v);
                serde_json::to_vec(&canonical).map_err(|_| RpcError::UnserializableBody {
                    type_name: "json".to_string(),
                })
            }
        }
    }

    /// Bytes coming off the wire are always opaque; callers that expect
    /// JSON parse it themselves via [`Body::as_json`].
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }

    pub fn as_json(&self) -> RpcResult<Value> {
        match self {
            Body::Json(v) => Ok(v.clone()),
            Body::Text(s) => serde_json::from_str(s).map_err(RpcError::from),
            Body::Bytes(b) => serde_json::from_slice(b).map_err(RpcError::from),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Recursively rebuilds every object with its keys sorted, the
/// "canonical JSON (sorted keys)" form spec §4.3 calls for, so repeated
/// encodes of equal structures are byte-identical regardless of
/// `serde_json`'s own map ordering.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            for key in keys {
                let v = map.get(&key).cloned().unwrap_or(Value::Null);
                sorted.insert(key, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
