use crate::core::audit::{CallAuditRecord, FailureRecord};
use crate::core::currency::CurrencyPair;
use crate::core::rate::CurrencyPairRate;
use crate::core::store::{AuditStore, RateStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const XRATES: &str = "xrates";
const META: &str = "meta";
const API_LOGS: &str = "api_logs";
const ERROR_LOGS: &str = "error_logs";
const WATERMARK_KEY: &[u8] = b"latest_update";

/// fjall backed store, one partition per entity.
pub struct DiskStore {
    keyspace: Keyspace,
    xrates: PartitionHandle,
    meta: PartitionHandle,
    api_logs: PartitionHandle,
    error_logs: PartitionHandle,
    last_id: AtomicU64,
}

impl DiskStore {
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(db_path)?;

        let keyspace = Config::new(db_path.join("xrates_db")).open()?;
        let open = |name: &str| keyspace.open_partition(name, PartitionCreateOptions::default());
        let xrates = open(XRATES)?;
        let meta = open(META)?;
        let api_logs = open(API_LOGS)?;
        let error_logs = open(ERROR_LOGS)?;

        let last_id = last_id(&api_logs, API_LOGS)?.max(last_id(&error_logs, ERROR_LOGS)?);
        debug!(path = %db_path.display(), last_id, "Opened rate store");

        Ok(Self {
            keyspace,
            xrates,
            meta,
            api_logs,
            error_logs,
            last_id: AtomicU64::new(last_id),
        })
    }

    fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn pair_key(pair: CurrencyPair) -> [u8; 4] {
    let [f0, f1] = pair.from.0.to_be_bytes();
    let [t0, t1] = pair.to.0.to_be_bytes();
    [f0, f1, t0, t1]
}

fn decode_id(key: &[u8], partition: &'static str) -> StoreResult<u64> {
    let bytes: [u8; 8] = key.try_into().map_err(|_| StoreError::Corrupt {
        partition,
        reason: format!("log key has {} bytes, expected 8", key.len()),
    })?;
    Ok(u64::from_be_bytes(bytes))
}

fn last_id(partition: &PartitionHandle, name: &'static str) -> StoreResult<u64> {
    match partition.iter().next_back() {
        Some(entry) => {
            let (key, _) = entry?;
            decode_id(&key, name)
        }
        None => Ok(0),
    }
}

fn decode<V: DeserializeOwned>(bytes: &[u8]) -> StoreResult<V> {
    Ok(serde_json::from_slice(bytes)?)
}

fn encode<V: Serialize>(value: &V) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Reads log records newest first; keys are big-endian ids so reverse order is newest first.
fn read_logs<V: DeserializeOwned>(
    partition: &PartitionHandle,
    limit: Option<usize>,
) -> StoreResult<Vec<V>> {
    partition
        .iter()
        .rev()
        .take(limit.unwrap_or(usize::MAX))
        .map(|entry| {
            let (_, value) = entry?;
            decode(&value)
        })
        .collect()
}

#[async_trait]
impl RateStore for DiskStore {
    async fn find_pair(&self, pair: CurrencyPair) -> StoreResult<Option<CurrencyPairRate>> {
        match self.xrates.get(pair_key(pair))? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    async fn list_pairs(&self) -> StoreResult<Vec<CurrencyPairRate>> {
        self.xrates
            .iter()
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    async fn insert_pair(&self, record: CurrencyPairRate) -> StoreResult<bool> {
        let key = pair_key(record.pair());
        if self.xrates.contains_key(key)? {
            debug!(pair = %record.pair(), "Pair already exists");
            return Ok(false);
        }
        self.xrates.insert(key, encode(&record)?)?;
        Ok(true)
    }

    async fn save_pair(&self, record: &CurrencyPairRate) -> StoreResult<()> {
        self.xrates.insert(pair_key(record.pair()), encode(record)?)?;
        Ok(())
    }

    async fn watermark(&self) -> StoreResult<Option<DateTime<Utc>>> {
        match self.meta.get(WATERMARK_KEY)? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    async fn set_watermark(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.meta.insert(WATERMARK_KEY, encode(&at)?)?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for DiskStore {
    async fn append_call(&self, mut record: CallAuditRecord) -> StoreResult<u64> {
        record.id = self.next_id();
        self.api_logs
            .insert(record.id.to_be_bytes(), encode(&record)?)?;
        Ok(record.id)
    }

    async fn append_failure(&self, mut record: FailureRecord) -> StoreResult<u64> {
        record.id = self.next_id();
        self.error_logs
            .insert(record.id.to_be_bytes(), encode(&record)?)?;
        Ok(record.id)
    }

    async fn calls(&self, limit: Option<usize>) -> StoreResult<Vec<CallAuditRecord>> {
        read_logs(&self.api_logs, limit)
    }

    async fn failures(&self, limit: Option<usize>) -> StoreResult<Vec<FailureRecord>> {
        read_logs(&self.error_logs, limit)
    }

    async fn clear(&self) -> StoreResult<()> {
        let mut batch = self.keyspace.batch();
        for partition in [&self.api_logs, &self.error_logs] {
            for entry in partition.keys() {
                batch.remove(partition, entry?);
            }
        }
        batch.commit()?;
        debug!("Cleared audit logs");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn failure(error: &str) -> FailureRecord {
        FailureRecord {
            id: 0,
            request_url: "http://localhost/ticker".to_string(),
            request_method: "GET".to_string(),
            request_body: None,
            error: error.to_string(),
            traceback: "trace".to_string(),
            created: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_pairs_round_trip() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let pair = CurrencyPair::new(840, 643);
        let mut record = CurrencyPairRate::new(pair, 1.0, "cbr_api", Utc::now());

        assert!(store.find_pair(pair).await.unwrap().is_none());
        assert!(store.insert_pair(record.clone()).await.unwrap());
        assert!(!store.insert_pair(record.clone()).await.unwrap());

        record.rate = 92.3405;
        store.save_pair(&record).await.unwrap();

        assert_eq!(store.find_pair(pair).await.unwrap(), Some(record));
        assert_eq!(store.list_pairs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_watermark() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        assert!(store.watermark().await.unwrap().is_none());

        let now = Utc::now();
        store.set_watermark(now).await.unwrap();
        assert_eq!(store.watermark().await.unwrap(), Some(now));
    }

    #[tokio::test]
    async fn test_failures_newest_first_and_clear() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();

        store.append_failure(failure("first")).await.unwrap();
        store.append_failure(failure("second")).await.unwrap();

        let failures = store.failures(None).await.unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].error, "second");
        assert!(failures[0].id > failures[1].id);
        assert_eq!(store.failures(Some(1)).await.unwrap().len(), 1);

        store.clear().await.unwrap();
        assert!(store.failures(None).await.unwrap().is_empty());
        assert!(store.calls(None).await.unwrap().is_empty());
    }
}
