//! Applying fetched rates to the store, dispatching pairs to their source, and
//! the batch refresh over every pair.

use crate::core::currency::CurrencyPair;
use crate::core::rate::CurrencyPairRate;
use crate::core::source::RateSource;
use crate::core::store::RateStore;
use crate::error::{RateError, RateResult, StoreResult};
use crate::providers::SourceRegistry;
use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Minutes elapsed between two instants, rounded to 2 decimals.
pub fn minutes_since(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let minutes = (now - since).num_milliseconds() as f64 / 60_000.0;
    (minutes * 100.0).round() / 100.0
}

/// Minutes since the last successful refresh of any pair, if one happened.
pub async fn freshness(store: &dyn RateStore, now: DateTime<Utc>) -> StoreResult<Option<f64>> {
    Ok(store.watermark().await?.map(|at| minutes_since(at, now)))
}

fn validate_rate(rate: f64) -> RateResult<f64> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(RateError::InvalidRate(rate))
    }
}

/// `last_updated` only ever moves forward, even if the clock did not.
fn next_stamp(prior: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > prior {
        now
    } else {
        prior + TimeDelta::microseconds(1)
    }
}

/// Sole writer of pair rates and the global watermark.
#[derive(Clone)]
pub struct RateUpdater {
    store: Arc<dyn RateStore>,
}

impl RateUpdater {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        RateUpdater { store }
    }

    async fn stamp(
        &self,
        pair: CurrencyPair,
        rate: f64,
        now: DateTime<Utc>,
    ) -> RateResult<CurrencyPairRate> {
        let rate = validate_rate(rate)?;
        let mut record = self
            .store
            .find_pair(pair)
            .await?
            .ok_or(RateError::UnknownPair(pair))?;
        record.rate = rate;
        record.last_updated = next_stamp(record.last_updated, now);
        self.store.save_pair(&record).await?;
        Ok(record)
    }

    /// Persists a freshly fetched rate and advances the watermark.
    ///
    /// The watermark write is best effort: a failure there is logged and the
    /// rate update still counts.
    pub async fn apply(
        &self,
        pair: CurrencyPair,
        rate: f64,
        now: DateTime<Utc>,
    ) -> RateResult<CurrencyPairRate> {
        let record = self.stamp(pair, rate, now).await?;
        if let Err(e) = self.store.set_watermark(record.last_updated).await {
            warn!(error = %e, pair = %pair, "Failed to advance the update watermark");
        }
        Ok(record)
    }

    /// Manual override. Leaves the watermark alone since no source was asked.
    pub async fn override_rate(
        &self,
        pair: CurrencyPair,
        rate: f64,
        now: DateTime<Utc>,
    ) -> RateResult<CurrencyPairRate> {
        let record = self.stamp(pair, rate, now).await?;
        info!(pair = %pair, rate, "Rate overridden manually");
        Ok(record)
    }
}

/// Fetches one pair from `source` and persists the result. Nothing is written
/// when the fetch fails.
pub async fn update_with(
    updater: &RateUpdater,
    source: &dyn RateSource,
    pair: CurrencyPair,
) -> RateResult<CurrencyPairRate> {
    debug!(source = %source.id(), pair = %pair, "Fetching rate");
    let rate = source.fetch_rate(pair).await?;
    let record = updater.apply(pair, rate, Utc::now()).await?;
    info!(source = %source.id(), pair = %pair, rate, "Rate updated");
    Ok(record)
}

/// Outcome of a batch refresh.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub updated: Vec<CurrencyPairRate>,
    pub failed: Vec<(CurrencyPair, RateError)>,
}

impl RefreshReport {
    pub fn attempted(&self) -> usize {
        self.updated.len() + self.failed.len()
    }
}

/// Routes a pair to the source stored on its record.
///
/// Updates of the same pair are serialised; different pairs run independently.
pub struct Dispatcher {
    store: Arc<dyn RateStore>,
    registry: SourceRegistry,
    updater: RateUpdater,
    locks: Mutex<HashMap<CurrencyPair, Arc<Mutex<()>>>>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn RateStore>, registry: SourceRegistry) -> Self {
        Dispatcher {
            updater: RateUpdater::new(Arc::clone(&store)),
            store,
            registry,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, pair: CurrencyPair) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(pair).or_default())
    }

    async fn find(&self, pair: CurrencyPair) -> RateResult<CurrencyPairRate> {
        self.store
            .find_pair(pair)
            .await?
            .ok_or(RateError::UnknownPair(pair))
    }

    /// Refreshes one pair from its source. Errors propagate unchanged.
    #[instrument(skip_all, fields(pair = %pair))]
    pub async fn update(&self, pair: CurrencyPair) -> RateResult<CurrencyPairRate> {
        self.find(pair).await?;

        let lock = self.lock_for(pair).await;
        let _guard = lock.lock().await;

        // The record may have moved to another source while waiting
        let record = self.find(pair).await?;
        let source = self.registry.resolve(&record.source)?;
        update_with(&self.updater, source.as_ref(), pair).await
    }

    /// Manual override of a pair's rate, serialised with source refreshes.
    pub async fn set_rate(&self, pair: CurrencyPair, rate: f64) -> RateResult<CurrencyPairRate> {
        self.find(pair).await?;
        let lock = self.lock_for(pair).await;
        let _guard = lock.lock().await;
        self.updater.override_rate(pair, rate, Utc::now()).await
    }

    /// Refreshes every stored pair, at most `concurrency` at a time.
    ///
    /// Per-pair failures are logged and collected in the report, never raised.
    /// Only failing to list the pairs aborts the batch.
    pub async fn refresh_all(
        &self,
        concurrency: usize,
        on_done: &(dyn Fn() + Send + Sync),
    ) -> RateResult<RefreshReport> {
        let pairs = self.store.list_pairs().await?;
        info!(pairs = pairs.len(), concurrency, "Refreshing all pairs");

        let outcomes: Vec<_> = stream::iter(pairs)
            .map(|record| async move {
                let pair = record.pair();
                let outcome = self.update(pair).await;
                on_done();
                (pair, outcome)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut report = RefreshReport::default();
        for (pair, outcome) in outcomes {
            match outcome {
                Ok(record) => report.updated.push(record),
                Err(e) => {
                    error!(pair = %pair, error = %e, "Failed to refresh pair");
                    report.failed.push((pair, e));
                }
            }
        }
        info!(
            updated = report.updated.len(),
            failed = report.failed.len(),
            "Refresh finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::{CallAuditRecord, FailureRecord};
    use crate::core::rate::SourceId;
    use crate::core::store::AuditStore;
    use crate::error::StoreError;
    use crate::providers::HttpEnvelope;
    use crate::providers::fixture::{FIXTURE_RATE, FixtureSource};
    use crate::providers::privat::PrivatSource;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn seeded_store(pairs: &[(u16, u16, SourceId)], at: DateTime<Utc>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (from, to, source) in pairs {
            let record =
                CurrencyPairRate::new(CurrencyPair::new(*from, *to), 1.0, source.as_str(), at);
            assert!(store.insert_pair(record).await.unwrap());
        }
        store
    }

    fn fixture_registry() -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(FixtureSource));
        registry
    }

    /// Answers slowly and remembers the highest number of overlapping fetches.
    #[derive(Default)]
    struct SlowSource {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl RateSource for SlowSource {
        fn id(&self) -> SourceId {
            SourceId::Fixture
        }

        async fn fetch_rate(&self, _pair: CurrencyPair) -> RateResult<f64> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(2.5)
        }
    }

    /// Rate store whose watermark writes always fail.
    struct StuckWatermark(MemoryStore);

    #[async_trait]
    impl RateStore for StuckWatermark {
        async fn find_pair(&self, pair: CurrencyPair) -> StoreResult<Option<CurrencyPairRate>> {
            self.0.find_pair(pair).await
        }

        async fn list_pairs(&self) -> StoreResult<Vec<CurrencyPairRate>> {
            self.0.list_pairs().await
        }

        async fn insert_pair(&self, record: CurrencyPairRate) -> StoreResult<bool> {
            self.0.insert_pair(record).await
        }

        async fn save_pair(&self, record: &CurrencyPairRate) -> StoreResult<()> {
            self.0.save_pair(record).await
        }

        async fn watermark(&self) -> StoreResult<Option<DateTime<Utc>>> {
            self.0.watermark().await
        }

        async fn set_watermark(&self, _at: DateTime<Utc>) -> StoreResult<()> {
            Err(StoreError::Corrupt {
                partition: "meta",
                reason: "read only".to_string(),
            })
        }
    }

    #[test]
    fn test_minutes_since() {
        let since = Utc::now();
        assert_eq!(minutes_since(since, since), 0.0);
        assert_eq!(minutes_since(since, since + TimeDelta::seconds(90)), 1.5);
        assert_eq!(
            minutes_since(since, since + TimeDelta::milliseconds(12_345)),
            0.21
        );
    }

    #[tokio::test]
    async fn test_apply_advances_rate_and_watermark() {
        let t0 = Utc::now();
        let pair = CurrencyPair::new(840, 980);
        let store = seeded_store(&[(840, 980, SourceId::Privat)], t0).await;
        let updater = RateUpdater::new(store.clone());

        // Same instant as the prior stamp still moves last_updated forward
        let record = updater.apply(pair, 41.25, t0).await.unwrap();
        assert_eq!(record.rate, 41.25);
        assert!(record.last_updated > t0);

        let stored = store.find_pair(pair).await.unwrap().unwrap();
        assert_eq!(stored, record);
        let watermark = store.watermark().await.unwrap().unwrap();
        assert!(watermark >= stored.last_updated);

        let later = t0 + TimeDelta::minutes(5);
        let record = updater.apply(pair, 41.5, later).await.unwrap();
        assert_eq!(record.last_updated, later);
        assert_eq!(store.watermark().await.unwrap(), Some(later));
    }

    #[tokio::test]
    async fn test_apply_rejects_bad_rates_and_unknown_pairs() {
        let t0 = Utc::now();
        let store = seeded_store(&[(840, 980, SourceId::Privat)], t0).await;
        let updater = RateUpdater::new(store.clone());
        let pair = CurrencyPair::new(840, 980);

        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let err = updater.apply(pair, bad, t0).await.unwrap_err();
            assert!(matches!(err, RateError::InvalidRate(_)));
        }
        let err = updater
            .apply(CurrencyPair::new(111, 222), 1.5, t0)
            .await
            .unwrap_err();
        assert!(matches!(err, RateError::UnknownPair(_)));

        assert_eq!(store.find_pair(pair).await.unwrap().unwrap().rate, 1.0);
        assert!(store.watermark().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_watermark_failure_does_not_fail_apply() {
        let t0 = Utc::now();
        let inner = MemoryStore::new();
        let pair = CurrencyPair::new(1000, 980);
        inner
            .insert_pair(CurrencyPairRate::new(pair, 1.0, "test_api", t0))
            .await
            .unwrap();
        let store = Arc::new(StuckWatermark(inner));

        let record = RateUpdater::new(store.clone())
            .apply(pair, 2.0, Utc::now())
            .await
            .unwrap();
        assert_eq!(record.rate, 2.0);
        assert_eq!(store.find_pair(pair).await.unwrap().unwrap().rate, 2.0);
    }

    #[tokio::test]
    async fn test_override_leaves_watermark_alone() {
        let t0 = Utc::now();
        let pair = CurrencyPair::new(840, 643);
        let store = seeded_store(&[(840, 643, SourceId::Cbr)], t0).await;
        store.set_watermark(t0).await.unwrap();
        let dispatcher = Dispatcher::new(store.clone(), fixture_registry());

        let record = dispatcher.set_rate(pair, 95.5).await.unwrap();
        assert_eq!(record.rate, 95.5);
        assert!(record.last_updated > t0);
        assert_eq!(store.watermark().await.unwrap(), Some(t0));

        let err = dispatcher.set_rate(pair, -1.0).await.unwrap_err();
        assert!(matches!(err, RateError::InvalidRate(_)));
        let err = dispatcher
            .set_rate(CurrencyPair::new(111, 222), 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, RateError::UnknownPair(_)));
    }

    #[tokio::test]
    async fn test_unknown_pair_produces_no_audit_records() {
        let store = Arc::new(MemoryStore::new());
        let envelope = Arc::new(HttpEnvelope::new(Duration::from_secs(1), store.clone()).unwrap());
        let registry = SourceRegistry::from_config(&Default::default(), envelope);
        let dispatcher = Dispatcher::new(store.clone(), registry);

        let err = dispatcher
            .update(CurrencyPair::new(111, 222))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown currency pair 111=>222");
        assert!(store.calls(None).await.unwrap().is_empty());
        assert!(store.failures(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_source_is_reported() {
        let store = seeded_store(&[(840, 643, SourceId::Cbr)], Utc::now()).await;
        let dispatcher = Dispatcher::new(store, fixture_registry());

        let err = dispatcher
            .update(CurrencyPair::new(840, 643))
            .await
            .unwrap_err();
        assert!(matches!(err, RateError::UnknownSource(ref s) if s == "cbr_api"));
    }

    #[tokio::test]
    async fn test_batch_continues_past_failing_pair() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p24api/pubinfo"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = seeded_store(
            &[
                (840, 980, SourceId::Privat),
                (1000, 980, SourceId::Fixture),
                (1000, 643, SourceId::Fixture),
            ],
            Utc::now(),
        )
        .await;
        let envelope = Arc::new(HttpEnvelope::new(Duration::from_secs(5), store.clone()).unwrap());
        let mut registry = fixture_registry();
        registry.register(Arc::new(PrivatSource::new(&mock_server.uri(), envelope)));
        let dispatcher = Dispatcher::new(store.clone(), registry);

        let done = AtomicUsize::new(0);
        let report = dispatcher
            .refresh_all(2, &|| {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(report.attempted(), 3);
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(report.updated.len(), 2);
        assert_eq!(report.failed.len(), 1);
        let (failed_pair, err) = &report.failed[0];
        assert_eq!(*failed_pair, CurrencyPair::new(840, 980));
        assert!(err.is_network());

        for pair in [CurrencyPair::new(1000, 980), CurrencyPair::new(1000, 643)] {
            let record = store.find_pair(pair).await.unwrap().unwrap();
            assert_eq!(record.rate, FIXTURE_RATE);
        }
        let untouched = store
            .find_pair(CurrencyPair::new(840, 980))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.rate, 1.0);

        let failures: Vec<FailureRecord> = store.failures(None).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].request_url.ends_with("/p24api/pubinfo"));
        let calls: Vec<CallAuditRecord> = store.calls(None).await.unwrap();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].succeeded());
    }

    #[tokio::test]
    async fn test_same_pair_updates_are_serialised() {
        let store = seeded_store(&[(1000, 980, SourceId::Fixture)], Utc::now()).await;
        let source = Arc::new(SlowSource::default());
        let mut registry = SourceRegistry::new();
        registry.register(source.clone());
        let dispatcher = Dispatcher::new(store.clone(), registry);

        let pair = CurrencyPair::new(1000, 980);
        let results = futures::future::join_all((0..4).map(|_| dispatcher.update(pair))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);

        // Serialised writers each observe a strictly later stamp
        let mut stamps: Vec<_> = results
            .into_iter()
            .map(|r| r.map(|record| record.last_updated))
            .collect::<RateResult<_>>()
            .unwrap();
        stamps.sort();
        stamps.dedup();
        assert_eq!(stamps.len(), 4);
    }

    #[tokio::test]
    async fn test_different_pairs_refresh_concurrently() {
        let store = seeded_store(
            &[
                (1000, 980, SourceId::Fixture),
                (1000, 643, SourceId::Fixture),
                (840, 980, SourceId::Fixture),
            ],
            Utc::now(),
        )
        .await;
        let source = Arc::new(SlowSource::default());
        let mut registry = SourceRegistry::new();
        registry.register(source.clone());
        let dispatcher = Dispatcher::new(store.clone(), registry);

        let report = dispatcher.refresh_all(3, &|| {}).await.unwrap();
        assert_eq!(report.updated.len(), 3);
        assert!(report.failed.is_empty());
        assert!(source.max_in_flight.load(Ordering::SeqCst) > 1);

        let minutes = freshness(store.as_ref(), Utc::now()).await.unwrap();
        assert!(minutes.is_some_and(|m| m < 1.0));
    }
}
