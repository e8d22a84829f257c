//! Error types shared by the rate engine, its handlers and the stores.

use crate::core::currency::{CurrencyCode, CurrencyPair};
use crate::core::rate::SourceId;
use thiserror::Error;

/// Failures of the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] fjall::Error),

    #[error("failed to encode or decode record: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record in '{partition}': {reason}")]
    Corrupt {
        partition: &'static str,
        reason: String,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures of a single rate update.
#[derive(Debug, Error)]
pub enum RateError {
    #[error("unknown currency pair {0}")]
    UnknownPair(CurrencyPair),

    #[error("unknown rate source '{0}'")]
    UnknownSource(String),

    #[error("{provider} does not support currency {code}")]
    UnsupportedCurrency {
        provider: SourceId,
        code: CurrencyCode,
    },

    #[error("invalid {provider} response: {detail}")]
    MalformedResponse { provider: SourceId, detail: String },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("{provider} requires an API key but none is configured")]
    MissingApiKey { provider: SourceId },

    #[error("invalid rate value {0}: must be a finite positive number")]
    InvalidRate(f64),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl RateError {
    pub fn malformed(provider: SourceId, detail: impl Into<String>) -> Self {
        RateError::MalformedResponse {
            provider,
            detail: detail.into(),
        }
    }

    /// True for failures of the outbound call itself, as opposed to bad data.
    pub fn is_network(&self) -> bool {
        matches!(self, RateError::Network { .. } | RateError::HttpStatus { .. })
    }
}

pub type RateResult<T> = Result<T, RateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_failure() {
        let err = RateError::UnknownPair(CurrencyPair::new(111, 222));
        assert_eq!(err.to_string(), "unknown currency pair 111=>222");

        let err = RateError::UnsupportedCurrency {
            provider: SourceId::Privat,
            code: CurrencyCode(978),
        };
        assert_eq!(err.to_string(), "privat_api does not support currency 978");

        let err = RateError::malformed(SourceId::Cryptonator, "ticker.price missing");
        assert_eq!(
            err.to_string(),
            "invalid cryptonator_api response: ticker.price missing"
        );
        assert!(!err.is_network());

        let err = RateError::HttpStatus {
            url: "http://localhost/ticker".to_string(),
            status: 502,
        };
        assert!(err.is_network());
    }
}
