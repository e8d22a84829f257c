//! Persisted exchange rate records and the identifiers of the sources that refresh them

use crate::core::currency::{CurrencyCode, CurrencyPair};
use crate::error::RateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// The closed set of providers a pair can be refreshed from.
///
/// The string form is what gets stored on each [`CurrencyPairRate`], so the
/// data decides which handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum SourceId {
    #[serde(rename = "privat_api")]
    Privat,
    #[serde(rename = "cbr_api")]
    Cbr,
    #[serde(rename = "cryptonator_api")]
    Cryptonator,
    #[serde(rename = "blockchaininfo_api")]
    BlockchainInfo,
    #[serde(rename = "coinmarketcap_api")]
    CoinMarketCap,
    #[serde(rename = "test_api")]
    Fixture,
}

impl SourceId {
    pub const ALL: [SourceId; 6] = [
        SourceId::Privat,
        SourceId::Cbr,
        SourceId::Cryptonator,
        SourceId::BlockchainInfo,
        SourceId::CoinMarketCap,
        SourceId::Fixture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Privat => "privat_api",
            SourceId::Cbr => "cbr_api",
            SourceId::Cryptonator => "cryptonator_api",
            SourceId::BlockchainInfo => "blockchaininfo_api",
            SourceId::CoinMarketCap => "coinmarketcap_api",
            SourceId::Fixture => "test_api",
        }
    }

    /// Public documentation page of the provider, shown next to each rate.
    pub fn homepage(&self) -> &'static str {
        match self {
            SourceId::Privat => "https://api.privatbank.ua/",
            SourceId::Cbr => "https://cbr.ru/development/sxml/",
            SourceId::Cryptonator => "https://www.cryptonator.com/api",
            SourceId::BlockchainInfo => "https://www.blockchain.com/api",
            SourceId::CoinMarketCap => "https://coinmarketcap.com/api",
            SourceId::Fixture => "-",
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| RateError::UnknownSource(s.to_string()))
    }
}

/// Latest known rate for one directional currency pair.
///
/// At most one record exists per `(from_currency, to_currency)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyPairRate {
    pub from_currency: CurrencyCode,
    pub to_currency: CurrencyCode,
    pub rate: f64,
    pub last_updated: DateTime<Utc>,
    /// Identifier of the handler responsible for this pair, see [`SourceId`].
    pub source: String,
}

impl CurrencyPairRate {
    pub fn new(pair: CurrencyPair, rate: f64, source: impl Into<String>, at: DateTime<Utc>) -> Self {
        CurrencyPairRate {
            from_currency: pair.from,
            to_currency: pair.to,
            rate,
            last_updated: at,
            source: source.into(),
        }
    }

    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.from_currency, self.to_currency)
    }
}

impl Display for CurrencyPairRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "XRate({}=>{}): {}",
            self.from_currency, self.to_currency, self.rate
        )
    }
}
