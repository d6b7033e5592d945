//! RPC-over-HTTP record: the binary envelope the bridge tunnels HTTP
//! exchanges through.
//!
//! MessagePack gives a compact self-describing binary format without
//! hand-rolling a second wire codec; unlike the request/response record
//! codec in [`super::wire`], this envelope has no forward-compatibility
//! requirement of its own (it's re-encoded fresh on every hop), so a
//! derive-based format is the right tool here.

use crate::error::{RpcError, RpcResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An HTTP request, as tunneled over the file-transport fabric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestEnvelope {
    pub method: String,
    pub url: String,
    /// Ordered list rather than a map, so duplicate header names and
    /// declaration order both round-trip.
    pub headers: Vec<(String, String)>,
    pub body_bytes: Vec<u8>,
    /// Opaque extension bag. Per `SPEC_FULL.md`'s resolution of the
    /// "extensions" open question, this isn't interpreted by this
    /// crate, only carried — a field idiosyncratic to one HTTP
    /// library's request type, with no portable cross-implementation
    /// meaning.
    #[serde(default)]
    pub extensions: BTreeMap<String, Vec<u8>>,
}

/// An HTTP response, as tunneled over the file-transport fabric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponseEnvelope {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body_bytes: Vec<u8>,
    pub reason_phrase: String,
}

impl HttpRequestEnvelope {
    pub fn encode(&self) -> RpcResult<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| RpcError::Wire(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> RpcResult<Self> {
        rmp_serde::from_slice(data).map_err(|e| RpcError::Wire(e.to_string()))
    }
}

impl HttpResponseEnvelope {
    pub fn encode(&self) -> RpcResult<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| RpcError::Wire(e.to_string()))
    }

    pub fn decode(data: &[u8]) -> RpcResult<Self> {
        rmp_serde::from_slice(data).map_err(|e| RpcError::Wire(e.to_string()))
    }

    /// Synthesizes a `504 Gateway Timeout` envelope for a bridge
    /// upstream call that timed out.
    pub fn gateway_timeout() -> Self {
        Self {
            status_code: 504,
            headers: Vec::new(),
            body_bytes: b"upstream request timed out".to_vec(),
            reason_phrase: "Gateway Timeout".to_string(),
        }
    }

    /// Synthesizes a `502 Bad Gateway` envelope for any other upstream
    /// transport failure.
    pub fn bad_gateway(reason: &str) -> Self {
        Self {
            status_code: 502,
            headers: Vec::new(),
            body_bytes: reason.as_bytes().to_vec(),
            reason_phrase: "Bad Gateway".to_string(),
        }
    }

    /// Synthesizes a `403 Forbidden` envelope for a host outside the
    /// bridge's allow-list.
    pub fn forbidden(host: &str) -> Self {
        Self {
            status_code: 403,
            headers: Vec::new(),
            body_bytes: format!("host {host} is not allowed").into_bytes(),
            reason_phrase: "Forbidden".to_string(),
        }
    }
}
