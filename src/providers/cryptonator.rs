use crate::core::currency::{CurrencyCode, CurrencyPair};
use crate::core::rate::SourceId;
use crate::core::source::{AliasTable, RateSource, parse_json, positive_number, require, resolve_pair};
use crate::error::RateResult;
use crate::providers::envelope::{HttpEnvelope, OutboundRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

const ALIASES: AliasTable = &[
    (CurrencyCode::BTC, "btc"),
    (CurrencyCode::UAH, "uah"),
    (CurrencyCode::RUB, "rub"),
];

/// Cryptonator rejects requests that do not look like they come from a browser.
const BROWSER_HEADERS: &[(&str, &str)] = &[
    ("pragma", "no-cache"),
    ("dnt", "1"),
    ("accept-language", "en-US,en;q=0.8"),
    ("upgrade-insecure-requests", "1"),
    (
        "user-agent",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_12_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/60.0.3112.101 Safari/537.36",
    ),
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
    ),
    ("cache-control", "no-cache"),
];

/// Cryptonator ticker, one pair per request at `/api/ticker/{from}-{to}`.
pub struct CryptonatorSource {
    base_url: String,
    envelope: Arc<HttpEnvelope>,
}

impl CryptonatorSource {
    pub fn new(base_url: &str, envelope: Arc<HttpEnvelope>) -> Self {
        CryptonatorSource {
            base_url: base_url.to_string(),
            envelope,
        }
    }
}

fn find_rate(text: &str) -> RateResult<f64> {
    let provider = SourceId::Cryptonator;
    let json = parse_json(provider, text)?;
    let price = require(provider, &json, &["ticker", "price"])?;
    positive_number(provider, price, "ticker.price")
}

#[async_trait]
impl RateSource for CryptonatorSource {
    fn id(&self) -> SourceId {
        SourceId::Cryptonator
    }

    #[instrument(name = "CryptonatorApi", skip_all, fields(source = %self.id(), pair = %pair))]
    async fn fetch_rate(&self, pair: CurrencyPair) -> RateResult<f64> {
        let (from, to) = resolve_pair(ALIASES, self.id(), pair)?;

        let url = format!("{}/api/ticker/{from}-{to}", self.base_url);
        debug!("Requesting ticker from {}", url);

        let request = OutboundRequest::get(url).with_headers(BROWSER_HEADERS);
        self.envelope.send_and_parse(&request, find_rate).await
    }
}
