use crate::core::config::AppConfig;
use crate::core::rate::SourceId;
use crate::core::source::RateSource;
use crate::error::{RateError, RateResult};
use crate::providers::blockchain_info::BlockchainInfoSource;
use crate::providers::cbr::CbrSource;
use crate::providers::coinmarketcap::CoinMarketCapSource;
use crate::providers::cryptonator::CryptonatorSource;
use crate::providers::envelope::HttpEnvelope;
use crate::providers::fixture::FixtureSource;
use crate::providers::privat::PrivatSource;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Maps the source identifier stored on a pair to the handler that refreshes it.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<SourceId, Arc<dyn RateSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its own id, replacing any previous one.
    pub fn register(&mut self, source: Arc<dyn RateSource>) -> &mut Self {
        self.sources.insert(source.id(), source);
        self
    }

    /// Every known provider, wired to the configured endpoints.
    pub fn from_config(config: &AppConfig, envelope: Arc<HttpEnvelope>) -> Self {
        let providers = &config.providers;
        let mut registry = Self::new();
        registry
            .register(Arc::new(PrivatSource::new(
                &providers.privat.base_url,
                Arc::clone(&envelope),
            )))
            .register(Arc::new(CbrSource::new(
                &providers.cbr.base_url,
                Arc::clone(&envelope),
            )))
            .register(Arc::new(CryptonatorSource::new(
                &providers.cryptonator.base_url,
                Arc::clone(&envelope),
            )))
            .register(Arc::new(BlockchainInfoSource::new(
                &providers.blockchain_info.base_url,
                Arc::clone(&envelope),
            )))
            .register(Arc::new(CoinMarketCapSource::new(
                &providers.coinmarketcap.base_url,
                config.coinmarketcap_key(),
                envelope,
            )))
            .register(Arc::new(FixtureSource));
        debug!(sources = registry.sources.len(), "Registered rate sources");
        registry
    }

    pub fn get(&self, id: SourceId) -> Option<Arc<dyn RateSource>> {
        self.sources.get(&id).cloned()
    }

    /// Resolves the stored source string of a pair.
    pub fn resolve(&self, source: &str) -> RateResult<Arc<dyn RateSource>> {
        let id: SourceId = source.parse()?;
        self.get(id)
            .ok_or_else(|| RateError::UnknownSource(source.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn envelope() -> Arc<HttpEnvelope> {
        Arc::new(HttpEnvelope::new(Duration::from_secs(1), Arc::new(MemoryStore::new())).unwrap())
    }

    #[test]
    fn test_from_config_registers_every_source() {
        let registry = SourceRegistry::from_config(&AppConfig::default(), envelope());
        for id in SourceId::ALL {
            let source = registry.resolve(id.as_str()).unwrap();
            assert_eq!(source.id(), id);
        }
    }

    #[test]
    fn test_unknown_source() {
        let registry = SourceRegistry::from_config(&AppConfig::default(), envelope());
        let err = registry.resolve("yahoo_api").err().unwrap();
        assert!(matches!(err, RateError::UnknownSource(ref s) if s == "yahoo_api"));

        let empty = SourceRegistry::new();
        assert!(matches!(
            empty.resolve("test_api"),
            Err(RateError::UnknownSource(_))
        ));
    }
}
