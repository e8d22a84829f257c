use crate::core::currency::{CurrencyCode, CurrencyPair};
use crate::core::rate::SourceId;
use crate::core::source::{AliasTable, RateSource, parse_json, positive_number, require, resolve_pair};
use crate::error::{RateError, RateResult};
use crate::providers::envelope::{HttpEnvelope, OutboundRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

const ALIASES: AliasTable = &[(CurrencyCode::BTC, "BTC"), (CurrencyCode::RUB, "RUB")];

/// blockchain.info ticker: one global document of bitcoin prices keyed by
/// target currency. The `sell` price is used.
pub struct BlockchainInfoSource {
    base_url: String,
    envelope: Arc<HttpEnvelope>,
}

impl BlockchainInfoSource {
    pub fn new(base_url: &str, envelope: Arc<HttpEnvelope>) -> Self {
        BlockchainInfoSource {
            base_url: base_url.to_string(),
            envelope,
        }
    }
}

fn find_rate(text: &str, target: &str) -> RateResult<f64> {
    let provider = SourceId::BlockchainInfo;
    let json = parse_json(provider, text)?;
    let sell = require(provider, &json, &[target, "sell"])?;
    positive_number(provider, sell, &format!("{target}.sell"))
}

#[async_trait]
impl RateSource for BlockchainInfoSource {
    fn id(&self) -> SourceId {
        SourceId::BlockchainInfo
    }

    #[instrument(name = "BlockchainInfoApi", skip_all, fields(source = %self.id(), pair = %pair))]
    async fn fetch_rate(&self, pair: CurrencyPair) -> RateResult<f64> {
        let (_, target) = resolve_pair(ALIASES, self.id(), pair)?;
        // Every quote in the ticker is a bitcoin price
        if pair.from != CurrencyCode::BTC || pair.to == CurrencyCode::BTC {
            let code = if pair.from != CurrencyCode::BTC {
                pair.from
            } else {
                pair.to
            };
            return Err(RateError::UnsupportedCurrency {
                provider: self.id(),
                code,
            });
        }

        let url = format!("{}/ticker", self.base_url);
        debug!("Requesting ticker from {}", url);

        let request = OutboundRequest::get(url);
        self.envelope
            .send_and_parse(&request, |text| find_rate(text, target))
            .await
    }
}
