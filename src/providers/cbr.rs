use crate::core::currency::{CurrencyCode, CurrencyPair};
use crate::core::rate::SourceId;
use crate::core::source::{AliasTable, RateSource, ensure_positive, resolve_pair};
use crate::error::{RateError, RateResult};
use crate::providers::envelope::{HttpEnvelope, OutboundRequest};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

const ALIASES: AliasTable = &[
    (CurrencyCode::USD, "USD"),
    (CurrencyCode::EUR, "EUR"),
    (CurrencyCode::RUB, "RUB"),
];

#[derive(Debug, Deserialize)]
struct ValCurs {
    #[serde(rename = "Valute", default)]
    valute: Vec<Valute>,
}

#[derive(Debug, Deserialize)]
struct Valute {
    #[serde(rename = "CharCode")]
    char_code: Option<String>,
    #[serde(rename = "Nominal")]
    nominal: Option<String>,
    #[serde(rename = "Value")]
    value: Option<String>,
}

/// Central Bank of Russia daily snapshot. One XML document lists every
/// currency against the ruble, with comma decimal separators.
pub struct CbrSource {
    base_url: String,
    envelope: Arc<HttpEnvelope>,
}

impl CbrSource {
    pub fn new(base_url: &str, envelope: Arc<HttpEnvelope>) -> Self {
        CbrSource {
            base_url: base_url.to_string(),
            envelope,
        }
    }
}

fn normalize_decimal_string(s: &str) -> String {
    s.trim().replace(',', ".")
}

fn find_rate(text: &str, char_code: &str) -> RateResult<f64> {
    let provider = SourceId::Cbr;
    let val_curs: ValCurs = quick_xml::de::from_str(text)
        .map_err(|e| RateError::malformed(provider, format!("ValCurs document unreadable: {e}")))?;

    let valute = val_curs
        .valute
        .iter()
        .find(|v| v.char_code.as_deref().map(str::trim) == Some(char_code))
        .ok_or_else(|| {
            RateError::malformed(provider, format!("{char_code} not found in daily snapshot"))
        })?;

    let raw = valute.value.as_deref().ok_or_else(|| {
        RateError::malformed(provider, format!("Valute[{char_code}].Value missing"))
    })?;
    let value = normalize_decimal_string(raw).parse::<f64>().map_err(|_| {
        RateError::malformed(
            provider,
            format!("Valute[{char_code}].Value is not a number: '{raw}'"),
        )
    })?;

    // Some currencies are quoted per 10 or 100 units
    let nominal = match valute.nominal.as_deref() {
        Some(raw) => normalize_decimal_string(raw).parse::<f64>().map_err(|_| {
            RateError::malformed(
                provider,
                format!("Valute[{char_code}].Nominal is not a number: '{raw}'"),
            )
        })?,
        None => 1.0,
    };
    ensure_positive(provider, nominal, &format!("Valute[{char_code}].Nominal"))?;

    ensure_positive(provider, value / nominal, &format!("Valute[{char_code}].Value"))
}

#[async_trait]
impl RateSource for CbrSource {
    fn id(&self) -> SourceId {
        SourceId::Cbr
    }

    #[instrument(name = "CbrApi", skip_all, fields(source = %self.id(), pair = %pair))]
    async fn fetch_rate(&self, pair: CurrencyPair) -> RateResult<f64> {
        let (from, _) = resolve_pair(ALIASES, self.id(), pair)?;
        // The snapshot only quotes against the ruble
        if pair.to != CurrencyCode::RUB {
            return Err(RateError::UnsupportedCurrency {
                provider: self.id(),
                code: pair.to,
            });
        }
        if pair.from == CurrencyCode::RUB {
            return Err(RateError::UnsupportedCurrency {
                provider: self.id(),
                code: pair.from,
            });
        }

        let url = format!("{}/scripts/XML_daily.asp", self.base_url);
        debug!("Requesting daily snapshot from {}", url);

        let request = OutboundRequest::get(url);
        self.envelope
            .send_and_parse(&request, |text| find_rate(text, from))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::AuditStore;
    use crate::store::MemoryStore;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DAILY_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ValCurs Date="02.03.2024" name="Foreign Currency Market">
    <Valute ID="R01235">
        <NumCode>840</NumCode>
        <CharCode>USD</CharCode>
        <Nominal>1</Nominal>
        <Name>US Dollar</Name>
        <Value>92,3405</Value>
    </Valute>
    <Valute ID="R01239">
        <NumCode>978</NumCode>
        <CharCode>EUR</CharCode>
        <Nominal>1</Nominal>
        <Name>Euro</Name>
        <Value>99,8612</Value>
    </Valute>
</ValCurs>"#;

    async fn create_mock_server(mock_response: &str, expected_calls: u64) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/scripts/XML_daily.asp"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .expect(expected_calls)
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn provider(mock_server: &MockServer, store: Arc<MemoryStore>) -> CbrSource {
        let envelope = Arc::new(HttpEnvelope::new(Duration::from_secs(5), store).unwrap());
        CbrSource::new(&mock_server.uri(), envelope)
    }

    #[test]
    fn test_minimal_fixture_with_comma_separator() {
        let xml = "<ValCurs><Valute><CharCode>USD</CharCode><Value>92,3405</Value></Valute></ValCurs>";
        assert_eq!(find_rate(xml, "USD").unwrap(), 92.3405);
    }

    #[test]
    fn test_nominal_is_applied() {
        let xml = "<ValCurs><Valute><CharCode>JPY</CharCode><Nominal>100</Nominal><Value>61,2300</Value></Valute></ValCurs>";
        assert!((find_rate(xml, "JPY").unwrap() - 0.6123).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_successful_rate_fetch() {
        let mock_server = create_mock_server(DAILY_XML, 2).await;
        let provider = provider(&mock_server, Arc::new(MemoryStore::new()));

        let usd = provider.fetch_rate(CurrencyPair::new(840, 643)).await.unwrap();
        assert_eq!(usd, 92.3405);
        let eur = provider.fetch_rate(CurrencyPair::new(978, 643)).await.unwrap();
        assert_eq!(eur, 99.8612);
    }

    #[tokio::test]
    async fn test_currency_absent_from_snapshot() {
        let xml = "<ValCurs><Valute><CharCode>EUR</CharCode><Value>99,8612</Value></Valute></ValCurs>";
        let mock_server = create_mock_server(xml, 1).await;
        let store = Arc::new(MemoryStore::new());

        let err = provider(&mock_server, store.clone())
            .fetch_rate(CurrencyPair::new(840, 643))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid cbr_api response: USD not found in daily snapshot"
        );
        assert_eq!(store.failures(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_value_missing() {
        let xml = "<ValCurs><Valute><CharCode>USD</CharCode></Valute></ValCurs>";
        let mock_server = create_mock_server(xml, 1).await;

        let err = provider(&mock_server, Arc::new(MemoryStore::new()))
            .fetch_rate(CurrencyPair::new(840, 643))
            .await
            .unwrap_err();
        assert!(err.to_string().ends_with("Valute[USD].Value missing"));
    }

    #[tokio::test]
    async fn test_only_ruble_quotes_are_supported() {
        let mock_server = create_mock_server(DAILY_XML, 0).await;
        let provider = provider(&mock_server, Arc::new(MemoryStore::new()));

        let err = provider
            .fetch_rate(CurrencyPair::new(840, 978))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RateError::UnsupportedCurrency {
                code: CurrencyCode::EUR,
                ..
            }
        ));

        let err = provider
            .fetch_rate(CurrencyPair::new(840, 980))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RateError::UnsupportedCurrency {
                code: CurrencyCode::UAH,
                ..
            }
        ));
    }
}
