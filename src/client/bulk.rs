//! `BulkFuture`: aggregate over several in-flight futures produced by
//! `broadcast`.

use crate::future_store::Future;
use crate::url::SyftUrl;

/// Per-target send outcome recorded by `broadcast` itself, before any
/// waiting happens: an individual send failure (e.g. a malformed target
/// URL) does not abort the others.
pub enum SendOutcome {
    Sent(Future),
    Failed(SyftUrl, String),
}

/// Holds the futures (and send-time failures) from one `broadcast`
/// call, ready to be gathered.
pub struct BulkFuture {
    pub(crate) outcomes: Vec<SendOutcome>,
}

impl BulkFuture {
    pub fn new(outcomes: Vec<SendOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
