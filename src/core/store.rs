//! Persistence contracts for rates and the audit trail

use crate::core::audit::{CallAuditRecord, FailureRecord};
use crate::core::config::SeedPair;
use crate::core::currency::CurrencyPair;
use crate::core::rate::CurrencyPairRate;
use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

/// Placeholder rate given to freshly seeded pairs.
pub const PLACEHOLDER_RATE: f64 = 1.0;

#[async_trait]
pub trait RateStore: Send + Sync {
    async fn find_pair(&self, pair: CurrencyPair) -> StoreResult<Option<CurrencyPairRate>>;

    async fn list_pairs(&self) -> StoreResult<Vec<CurrencyPairRate>>;

    /// Inserts a new pair. Returns `false` and leaves the store untouched if
    /// the pair already exists.
    async fn insert_pair(&self, record: CurrencyPairRate) -> StoreResult<bool>;

    async fn save_pair(&self, record: &CurrencyPairRate) -> StoreResult<()>;

    async fn watermark(&self) -> StoreResult<Option<DateTime<Utc>>>;

    async fn set_watermark(&self, at: DateTime<Utc>) -> StoreResult<()>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_call(&self, record: CallAuditRecord) -> StoreResult<u64>;

    async fn append_failure(&self, record: FailureRecord) -> StoreResult<u64>;

    /// Newest first.
    async fn calls(&self, limit: Option<usize>) -> StoreResult<Vec<CallAuditRecord>>;

    /// Newest first.
    async fn failures(&self, limit: Option<usize>) -> StoreResult<Vec<FailureRecord>>;

    /// Erases every call and failure record.
    async fn clear(&self) -> StoreResult<()>;
}

/// Seeds missing pairs with a placeholder rate and creates the watermark.
///
/// Existing pairs are left alone, so this is safe to run on every start.
pub async fn bootstrap(
    store: &dyn RateStore,
    seeds: &[SeedPair],
    now: DateTime<Utc>,
) -> StoreResult<usize> {
    let mut created = 0;
    for seed in seeds {
        let record = CurrencyPairRate::new(
            CurrencyPair::new(seed.from, seed.to),
            PLACEHOLDER_RATE,
            seed.source.as_str(),
            now,
        );
        if store.insert_pair(record).await? {
            created += 1;
        }
    }
    if store.watermark().await?.is_none() {
        store.set_watermark(now).await?;
    }
    if created > 0 {
        info!(created, "Seeded currency pairs");
    }
    Ok(created)
}
