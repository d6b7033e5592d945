//! Durable future index backed by a single-file embedded database.

use super::future::FutureRecord;
use crate::error::{RpcError, RpcResult};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const FUTURES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("futures");
const FINGERPRINT_INDEX: TableDefinition<&str, &str> = TableDefinition::new("fingerprint_index");

/// Local durable index of outstanding futures, keyed by id, with a
/// secondary index from cache fingerprint to id for dedup lookups.
/// Cheap to clone: the handle is just an `Arc<Database>`.
#[derive(Clone)]
pub struct FutureStore {
    db: Arc<Database>,
}

impl FutureStore {
    pub fn open(path: &Path) -> RpcResult<Self> {
        let db = Database::create(path).map_err(|e| RpcError::Store(e.to_string()))?;
        {
            let write_txn = db.begin_write().map_err(|e| RpcError::Store(e.to_string()))?;
            write_txn
                .open_table(FUTURES_TABLE)
                .map_err(|e| RpcError::Store(e.to_string()))?;
            write_txn
                .open_table(FINGERPRINT_INDEX)
                .map_err(|e| RpcError::Store(e.to_string()))?;
            write_txn.commit().map_err(|e| RpcError::Store(e.to_string()))?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    pub fn register(&self, record: &FutureRecord) -> RpcResult<()> {
        let id_key = record.id.to_string();
        let bytes = serde_json::to_vec(record)?;

        let write_txn = self.db.begin_write().map_err(|e| RpcError::Store(e.to_string()))?;
        {
            let mut futures = write_txn
                .open_table(FUTURES_TABLE)
                .map_err(|e| RpcError::Store(e.to_string()))?;
            futures
                .insert(id_key.as_str(), bytes.as_slice())
                .map_err(|e| RpcError::Store(e.to_string()))?;

            if let Some(fingerprint) = &record.cache_fingerprint {
                let mut index = write_txn
                    .open_table(FINGERPRINT_INDEX)
                    .map_err(|e| RpcError::Store(e.to_string()))?;
                index
                    .insert(fingerprint.as_str(), id_key.as_str())
                    .map_err(|e| RpcError::Store(e.to_string()))?;
            }
        }
        write_txn.commit().map_err(|e| RpcError::Store(e.to_string()))?;
        Ok(())
    }

    pub fn lookup(&self, id: Uuid) -> RpcResult<Option<FutureRecord>> {
        let read_txn = self.db.begin_read().map_err(|e| RpcError::Store(e.to_string()))?;
        let futures = read_txn
            .open_table(FUTURES_TABLE)
            .map_err(|e| RpcError::Store(e.to_string()))?;
        let id_key = id.to_string();
        match futures.get(id_key.as_str()).map_err(|e| RpcError::Store(e.to_string()))? {
            Some(value) => {
                let record: FutureRecord = serde_json::from_slice(value.value())?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Finds a still-unexpired future registered under `fingerprint`,
    /// for cache-hit dedup in `send`.
    pub fn lookup_by_fingerprint(&self, fingerprint: &str) -> RpcResult<Option<FutureRecord>> {
        let read_txn = self.db.begin_read().map_err(|e| RpcError::Store(e.to_string()))?;
        let index = read_txn
            .open_table(FINGERPRINT_INDEX)
            .map_err(|e| RpcError::Store(e.to_string()))?;
        let id_key = match index.get(fingerprint).map_err(|e| RpcError::Store(e.to_string()))? {
            Some(v) => v.value().to_string(),
            None => return Ok(None),
        };
        drop(index);
        drop(read_txn);

        let id = Uuid::parse_str(&id_key)
            .map_err(|e| RpcError::Store(format!("corrupt fingerprint index entry: {e}")))?;
        match self.lookup(id)? {
            Some(record) if !record.is_expired_at(Utc::now()) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// Returns every future not yet expired as of `now`. Resolution
    /// (whether a response file has landed) is a filesystem concern and
    /// is checked by the caller, not this store.
    pub fn list_pending(&self, now: chrono::DateTime<Utc>) -> RpcResult<Vec<FutureRecord>> {
        let read_txn = self.db.begin_read().map_err(|e| RpcError::Store(e.to_string()))?;
        let futures = read_txn
            .open_table(FUTURES_TABLE)
            .map_err(|e| RpcError::Store(e.to_string()))?;
        let mut out = Vec::new();
        for entry in futures.iter().map_err(|e| RpcError::Store(e.to_string()))? {
            let (_, value) = entry.map_err(|e| RpcError::Store(e.to_string()))?;
            let record: FutureRecord = serde_json::from_slice(value.value())?;
            if !record.is_expired_at(now) {
                out.push(record);
            }
        }
        Ok(out)
    }

    pub fn drop_future(&self, id: Uuid) -> RpcResult<()> {
        let id_key = id.to_string();
        let write_txn = self.db.begin_write().map_err(|e| RpcError::Store(e.to_string()))?;
        {
            let mut futures = write_txn
                .open_table(FUTURES_TABLE)
                .map_err(|e| RpcError::Store(e.to_string()))?;
            futures
                .remove(id_key.as_str())
                .map_err(|e| RpcError::Store(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| RpcError::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::SyftUrl;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample_record(fingerprint: Option<&str>) -> FutureRecord {
        let now = Utc::now();
        FutureRecord {
            id: Uuid::new_v4(),
            response_path: PathBuf::from("/ws/resp"),
            rejection_path: PathBuf::from("/ws/rej"),
            url: SyftUrl::new("bob@example.com", "ping", "ping"),
            created: now,
            expires: now + chrono::Duration::seconds(30),
            cache_fingerprint: fingerprint.map(str::to_string),
        }
    }

    #[test]
    fn register_and_lookup_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = FutureStore::open(&tmp.path().join("futures.redb")).unwrap();
        let record = sample_record(None);
        store.register(&record).unwrap();
        let fetched = store.lookup(record.id).unwrap().unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.url, record.url);
    }

    #[test]
    fn fingerprint_lookup_finds_cached_future() {
        let tmp = TempDir::new().unwrap();
        let store = FutureStore::open(&tmp.path().join("futures.redb")).unwrap();
        let record = sample_record(Some("abc123"));
        store.register(&record).unwrap();

        let hit = store.lookup_by_fingerprint("abc123").unwrap();
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().id, record.id);

        assert!(store.lookup_by_fingerprint("nonexistent").unwrap().is_none());
    }

    #[test]
    fn list_pending_excludes_expired() {
        let tmp = TempDir::new().unwrap();
        let store = FutureStore::open(&tmp.path().join("futures.redb")).unwrap();
        let mut expired = sample_record(None);
        expired.expires = Utc::now() - chrono::Duration::seconds(10);
        store.register(&expired).unwrap();

        let fresh = sample_record(None);
        store.register(&fresh).unwrap();

        let pending = store.list_pending(Utc::now()).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, fresh.id);
    }

    #[test]
    fn drop_removes_future() {
        let tmp = TempDir::new().unwrap();
        let store = FutureStore::open(&tmp.path().join("futures.redb")).unwrap();
        let record = sample_record(None);
        store.register(&record).unwrap();
        store.drop_future(record.id).unwrap();
        assert!(store.lookup(record.id).unwrap().is_none());
    }
}
