use crate::core::audit::{CallAuditRecord, FailureRecord};
use crate::core::currency::CurrencyPair;
use crate::core::rate::CurrencyPairRate;
use crate::core::store::{AuditStore, RateStore};
use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Tables {
    xrates: BTreeMap<CurrencyPair, CurrencyPairRate>,
    watermark: Option<DateTime<Utc>>,
    calls: Vec<CallAuditRecord>,
    failures: Vec<FailureRecord>,
    next_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store, used by tests and throwaway runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T: Clone>(records: &[T], limit: Option<usize>) -> Vec<T> {
    records
        .iter()
        .rev()
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

#[async_trait]
impl RateStore for MemoryStore {
    async fn find_pair(&self, pair: CurrencyPair) -> StoreResult<Option<CurrencyPairRate>> {
        let tables = self.inner.lock().await;
        Ok(tables.xrates.get(&pair).cloned())
    }

    async fn list_pairs(&self) -> StoreResult<Vec<CurrencyPairRate>> {
        let tables = self.inner.lock().await;
        Ok(tables.xrates.values().cloned().collect())
    }

    async fn insert_pair(&self, record: CurrencyPairRate) -> StoreResult<bool> {
        let mut tables = self.inner.lock().await;
        let pair = record.pair();
        if tables.xrates.contains_key(&pair) {
            debug!(%pair, "Pair already exists");
            return Ok(false);
        }
        tables.xrates.insert(pair, record);
        Ok(true)
    }

    async fn save_pair(&self, record: &CurrencyPairRate) -> StoreResult<()> {
        let mut tables = self.inner.lock().await;
        tables.xrates.insert(record.pair(), record.clone());
        Ok(())
    }

    async fn watermark(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.inner.lock().await.watermark)
    }

    async fn set_watermark(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.inner.lock().await.watermark = Some(at);
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_call(&self, mut record: CallAuditRecord) -> StoreResult<u64> {
        let mut tables = self.inner.lock().await;
        record.id = tables.next_id();
        let id = record.id;
        tables.calls.push(record);
        Ok(id)
    }

    async fn append_failure(&self, mut record: FailureRecord) -> StoreResult<u64> {
        let mut tables = self.inner.lock().await;
        record.id = tables.next_id();
        let id = record.id;
        tables.failures.push(record);
        Ok(id)
    }

    async fn calls(&self, limit: Option<usize>) -> StoreResult<Vec<CallAuditRecord>> {
        let tables = self.inner.lock().await;
        Ok(newest_first(&tables.calls, limit))
    }

    async fn failures(&self, limit: Option<usize>) -> StoreResult<Vec<FailureRecord>> {
        let tables = self.inner.lock().await;
        Ok(newest_first(&tables.failures, limit))
    }

    async fn clear(&self) -> StoreResult<()> {
        let mut tables = self.inner.lock().await;
        tables.calls.clear();
        tables.failures.clear();
        debug!("Cleared audit logs");
        Ok(())
    }
}
