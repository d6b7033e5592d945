//! Request/response record types and their wire encoding.

use super::wire::{build, write_pairs, write_str, write_u16, write_u64, FieldReader};
use crate::error::{RpcError, RpcResult};
use crate::url::SyftUrl;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use uuid::Uuid;

/// HTTP method, restricted to the verbs RPC endpoints actually need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    pub fn parse(raw: &str) -> RpcResult<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(RpcError::Wire(format!("unrecognized HTTP method {other:?}"))),
        }
    }
}

/// Response status, extended with "negative-space" outcomes alongside
/// ordinary HTTP-style codes: `pending`, `expired`, `rejected` never
/// come from a handler, they're synthesized by the client when a
/// response never materializes in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Completed,
    Pending,
    Expired,
    Rejected,
    NotFound,
    Error,
    Http(u16),
}

impl Status {
    fn to_code(self) -> u16 {
        match self {
            Status::Completed => 1,
            Status::Pending => 2,
            Status::Expired => 3,
            Status::Rejected => 4,
            Status::NotFound => 5,
            Status::Error => 6,
            Status::Http(code) => code,
        }
    }

    fn from_code(code: u16) -> Self {
        match code {
            1 => Status::Completed,
            2 => Status::Pending,
            3 => Status::Expired,
            4 => Status::Rejected,
            5 => Status::NotFound,
            6 => Status::Error,
            other => Status::Http(other),
        }
    }
}

/// A request record.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub id: Uuid,
    pub sender: String,
    pub url: SyftUrl,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl RequestRecord {
    pub fn encode(&self) -> Vec<u8> {
        build(|out| {
            write_str(out, &self.id.to_string());
            write_str(out, &self.sender);
            write_str(out, &self.url.to_string());
            write_str(out, self.method.as_str());
            write_pairs(out, &self.headers);
            write_str(out, &BASE64.encode(&self.body));
            write_u64(out, self.created.timestamp_millis() as u64);
            write_u64(out, self.expires.timestamp_millis() as u64);
        })
    }

    pub fn decode(data: &[u8], path_hint: Option<&Path>) -> RpcResult<Self> {
        let mut reader = FieldReader::new(data);
        if let Some(p) = path_hint {
            reader = reader.with_path_hint(p.to_path_buf());
        }
        let id = parse_uuid(&reader.read_str()?, path_hint)?;
        let sender = reader.read_str()?;
        let url = SyftUrl::parse(&reader.read_str()?)?;
        let method = Method::parse(&reader.read_str()?)?;
        let headers = reader.read_pairs()?;
        let body = BASE64
            .decode(reader.read_str()?)
            .map_err(|e| RpcError::DecodeError {
                path: path_hint.map(Path::to_path_buf),
                reason: format!("body is not valid base64: {e}"),
            })?;
        let created = millis_to_datetime(reader.read_u64()?);
        let expires = millis_to_datetime(reader.read_u64()?);

        if created > expires {
            return Err(RpcError::DecodeError {
                path: path_hint.map(Path::to_path_buf),
                reason: "created timestamp is after expires timestamp".to_string(),
            });
        }

        Ok(Self {
            id,
            sender,
            url,
            method,
            headers,
            body,
            created,
            expires,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }
}

/// A response record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub id: Uuid,
    pub sender: String,
    pub url: SyftUrl,
    pub status: Status,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl ResponseRecord {
    pub fn encode(&self) -> Vec<u8> {
        build(|out| {
            write_str(out, &self.id.to_string());
            write_str(out, &self.sender);
            write_str(out, &self.url.to_string());
            write_u16(out, self.status.to_code());
            write_pairs(out, &self.headers);
            write_str(out, &BASE64.encode(&self.body));
            write_u64(out, self.created.timestamp_millis() as u64);
            write_u64(out, self.expires.timestamp_millis() as u64);
        })
    }

    pub fn decode(data: &[u8], path_hint: Option<&Path>) -> RpcResult<Self> {
        let mut reader = FieldReader::new(data);
        if let Some(p) = path_hint {
            reader = reader.with_path_hint(p.to_path_buf());
        }
        let id = parse_uuid(&reader.read_str()?, path_hint)?;
        let sender = reader.read_str()?;
        let url = SyftUrl::parse(&reader.read_str()?)?;
        let status = Status::from_code(reader.read_u16()?);
        let headers = reader.read_pairs()?;
        let body = BASE64
            .decode(reader.read_str()?)
            .map_err(|e| RpcError::DecodeError {
                path: path_hint.map(Path::to_path_buf),
                reason: format!("body is not valid base64: {e}"),
            })?;
        let created = millis_to_datetime(reader.read_u64()?);
        let expires = millis_to_datetime(reader.read_u64()?);

        Ok(Self {
            id,
            sender,
            url,
            status,
            headers,
            body,
            created,
            expires,
        })
    }

    /// Builds the synthetic response a client produces locally when a
    /// request's deadline passes with no response file on disk.
    pub fn synthesize_expired(id: Uuid, sender: &str, url: SyftUrl, expires: DateTime<Utc>) -> Self {
        Self {
            id,
            sender: sender.to_string(),
            url,
            status: Status::Expired,
            headers: Vec::new(),
            body: Vec::new(),
            created: Utc::now(),
            expires,
        }
    }

    /// Builds the synthetic response for a request whose rejection
    /// marker was observed instead of a response file.
    pub fn synthesize_rejected(id: Uuid, sender: &str, url: SyftUrl, expires: DateTime<Utc>) -> Self {
        Self {
            id,
            sender: sender.to_string(),
            url,
            status: Status::Rejected,
            headers: Vec::new(),
            body: Vec::new(),
            created: Utc::now(),
            expires,
        }
    }
}

fn parse_uuid(raw: &str, path_hint: Option<&Path>) -> RpcResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| RpcError::DecodeError {
        path: path_hint.map(Path::to_path_buf),
        reason: format!("invalid id {raw:?}"),
    })
}

fn millis_to_datetime(millis: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or_else(Utc::now)
}
