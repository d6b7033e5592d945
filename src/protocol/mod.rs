//! Protocol codec: request/response records, body rules, path layout,
//! duration parsing, and the HTTP-over-filesystem envelope.

pub mod body;
pub mod duration;
pub mod http_envelope;
pub mod paths;
pub mod records;
pub mod wire;

pub use body::Body;
pub use duration::parse_duration;
pub use http_envelope::{HttpRequestEnvelope, HttpResponseEnvelope};
pub use records::{Method, RequestRecord, ResponseRecord, Status};
