//! Durable future index: local persistent record of outstanding
//! requests, with cache-fingerprint based deduplication.

pub mod fingerprint;
pub mod future;
pub mod store;

pub use fingerprint::compute as compute_fingerprint;
pub use future::{Future, FutureOutcome, FutureRecord, GatherResult};
pub use store::FutureStore;
