use crate::core::currency::CurrencyPair;
use crate::core::rate::SourceId;
use crate::core::source::RateSource;
use crate::error::RateResult;
use async_trait::async_trait;

pub const FIXTURE_RATE: f64 = 1.01;

/// Offline source that answers every pair with [`FIXTURE_RATE`].
#[derive(Debug, Default)]
pub struct FixtureSource;

#[async_trait]
impl RateSource for FixtureSource {
    fn id(&self) -> SourceId {
        SourceId::Fixture
    }

    async fn fetch_rate(&self, _pair: CurrencyPair) -> RateResult<f64> {
        Ok(FIXTURE_RATE)
    }
}
