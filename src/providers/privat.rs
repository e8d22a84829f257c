use crate::core::currency::{CurrencyCode, CurrencyPair};
use crate::core::rate::SourceId;
use crate::core::source::{AliasTable, RateSource, positive_number, resolve_pair};
use crate::error::{RateError, RateResult};
use crate::providers::envelope::{HttpEnvelope, OutboundRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

const ALIASES: AliasTable = &[
    (CurrencyCode::USD, "USD"),
    (CurrencyCode::UAH, "UAH"),
    (CurrencyCode::BTC, "BTC"),
];

/// PrivatBank public exchange list. One request returns a flat list of
/// tickers, `ccy` against `base_ccy`, and the bank's sale price is used.
pub struct PrivatSource {
    base_url: String,
    envelope: Arc<HttpEnvelope>,
}

impl PrivatSource {
    pub fn new(base_url: &str, envelope: Arc<HttpEnvelope>) -> Self {
        PrivatSource {
            base_url: base_url.to_string(),
            envelope,
        }
    }
}

fn find_rate(text: &str, from: &str, to: &str) -> RateResult<f64> {
    let provider = SourceId::Privat;
    let entries: Vec<Value> = serde_json::from_str(text).map_err(|e| {
        RateError::malformed(provider, format!("expected a JSON list of tickers: {e}"))
    })?;

    let entry = entries
        .iter()
        .find(|e| {
            e.get("ccy").and_then(Value::as_str) == Some(from)
                && e.get("base_ccy").and_then(Value::as_str).is_none_or(|base| base == to)
        })
        .ok_or_else(|| RateError::malformed(provider, format!("{from}/{to} not found")))?;

    let sale = entry
        .get("sale")
        .ok_or_else(|| RateError::malformed(provider, format!("{from}.sale missing")))?;
    positive_number(provider, sale, &format!("{from}.sale"))
}

#[async_trait]
impl RateSource for PrivatSource {
    fn id(&self) -> SourceId {
        SourceId::Privat
    }

    #[instrument(name = "PrivatApi", skip_all, fields(source = %self.id(), pair = %pair))]
    async fn fetch_rate(&self, pair: CurrencyPair) -> RateResult<f64> {
        let (from, to) = resolve_pair(ALIASES, self.id(), pair)?;
        // Tickers are quoted against a base, never as hryvnia to anything
        if pair.from == CurrencyCode::UAH || pair.from == pair.to {
            return Err(RateError::UnsupportedCurrency {
                provider: self.id(),
                code: pair.from,
            });
        }

        let url = format!("{}/p24api/pubinfo?exchange&json&coursid=11", self.base_url);
        debug!("Requesting exchange list from {}", url);

        let request = OutboundRequest::get(url);
        self.envelope
            .send_and_parse(&request, |text| find_rate(text, from, to))
            .await
    }
}
