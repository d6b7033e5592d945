//! The client-side future handle and its bulk variant.

use crate::protocol::{ResponseRecord, Status};
use crate::url::SyftUrl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Durable record of one outstanding request, as kept in the future
/// store. This is what gets persisted; [`Future`] below is the
/// in-memory handle a caller polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FutureRecord {
    pub id: Uuid,
    pub response_path: PathBuf,
    pub rejection_path: PathBuf,
    pub url: SyftUrl,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub cache_fingerprint: Option<String>,
}

impl FutureRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }
}

/// The outcome of resolving one future: either it's still pending, or
/// it settled into a terminal response.
#[derive(Debug, Clone)]
pub enum FutureOutcome {
    Pending,
    Resolved(ResponseRecord),
}

/// A client-side handle for one outstanding request.
/// `wait`/`resolve` live on [`crate::client::RpcClient`]
/// since they need filesystem access; this type only carries the data
/// a handle needs.
#[derive(Debug, Clone)]
pub struct Future {
    pub record: FutureRecord,
}

impl Future {
    pub fn new(record: FutureRecord) -> Self {
        Self { record }
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }

    pub fn url(&self) -> &SyftUrl {
        &self.record.url
    }
}

/// The aggregate result of [`crate::client::RpcClient::broadcast`]'s
/// `gather_completed`.
#[derive(Debug, Default)]
pub struct GatherResult {
    pub successes: Vec<ResponseRecord>,
    pub failures: Vec<(SyftUrl, ResponseRecord)>,
    pub pending: Vec<SyftUrl>,
}

impl GatherResult {
    pub fn record(&mut self, url: SyftUrl, outcome: FutureOutcome) {
        match outcome {
            FutureOutcome::Pending => self.pending.push(url),
            FutureOutcome::Resolved(response) => match response.status {
                Status::Completed => self.successes.push(response),
                _ => self.failures.push((url, response)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response(status: Status) -> ResponseRecord {
        let now = Utc::now();
        ResponseRecord {
            id: Uuid::new_v4(),
            sender: "bob@example.com".to_string(),
            url: SyftUrl::new("bob@example.com", "ping", "ping"),
            status,
            headers: vec![],
            body: vec![],
            created: now,
            expires: now,
        }
    }

    #[test]
    fn gather_result_buckets_by_status() {
        let mut result = GatherResult::default();
        let url = SyftUrl::new("bob@example.com", "ping", "ping");
        result.record(url.clone(), FutureOutcome::Resolved(sample_response(Status::Completed)));
        result.record(url.clone(), FutureOutcome::Resolved(sample_response(Status::Error)));
        result.record(url, FutureOutcome::Pending);

        assert_eq!(result.successes.len(), 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.pending.len(), 1);
    }
}
