use crate::core::currency::{CurrencyCode, CurrencyPair};
use crate::core::rate::SourceId;
use crate::core::source::{AliasTable, RateSource, parse_json, positive_number, require, resolve_pair};
use crate::error::{RateError, RateResult};
use crate::providers::envelope::{HttpEnvelope, OutboundRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

const ALIASES: AliasTable = &[(CurrencyCode::BTC, "BTC"), (CurrencyCode::UAH, "UAH")];

/// Bitcoin is read from the wrapped token entry of the top listings.
const LISTED_SYMBOL: &str = "WBTC";

/// CoinMarketCap listings, converted to the target currency. Needs an API key,
/// which travels in the query string and is stripped from the audit trail.
pub struct CoinMarketCapSource {
    base_url: String,
    api_key: Option<String>,
    envelope: Arc<HttpEnvelope>,
}

impl CoinMarketCapSource {
    pub fn new(base_url: &str, api_key: Option<String>, envelope: Arc<HttpEnvelope>) -> Self {
        CoinMarketCapSource {
            base_url: base_url.to_string(),
            api_key,
            envelope,
        }
    }
}

/// Rounds to three decimals, half away from zero.
fn round_rate(rate: f64) -> f64 {
    (rate * 1000.0).round() / 1000.0
}

fn find_rate(text: &str, target: &str) -> RateResult<f64> {
    let provider = SourceId::CoinMarketCap;
    let json = parse_json(provider, text)?;
    let listings = require(provider, &json, &["data"])?
        .as_array()
        .ok_or_else(|| RateError::malformed(provider, "data is not a list"))?;

    let entry = listings
        .iter()
        .find(|e| e.get("symbol").and_then(Value::as_str) == Some(LISTED_SYMBOL))
        .ok_or_else(|| {
            RateError::malformed(provider, format!("{LISTED_SYMBOL} not found in data"))
        })?;

    let price = require(provider, entry, &["quote", target, "price"])?;
    let rate = positive_number(provider, price, &format!("quote.{target}.price"))?;
    Ok(round_rate(rate))
}

#[async_trait]
impl RateSource for CoinMarketCapSource {
    fn id(&self) -> SourceId {
        SourceId::CoinMarketCap
    }

    #[instrument(name = "CoinMarketCapApi", skip_all, fields(source = %self.id(), pair = %pair))]
    async fn fetch_rate(&self, pair: CurrencyPair) -> RateResult<f64> {
        let (_, target) = resolve_pair(ALIASES, self.id(), pair)?;
        if pair.from != CurrencyCode::BTC {
            return Err(RateError::UnsupportedCurrency {
                provider: self.id(),
                code: pair.from,
            });
        }
        let key = self
            .api_key
            .as_deref()
            .ok_or(RateError::MissingApiKey {
                provider: self.id(),
            })?;

        let url = format!(
            "{}/v1/cryptocurrency/listings/latest?CMC_PRO_API_KEY={key}&sort=market_cap&start=1&limit=10&cryptocurrency_type=tokens&convert={target}",
            self.base_url
        );
        let request = OutboundRequest::get(url);
        debug!("Requesting listings from {}", request.logged_url());

        self.envelope
            .send_and_parse(&request, |text| find_rate(text, target))
            .await
    }
}
