//! The capability every rate source implements, plus parsing helpers shared by them

use crate::core::currency::{CurrencyCode, CurrencyPair};
use crate::core::rate::SourceId;
use crate::error::{RateError, RateResult};
use async_trait::async_trait;
use serde_json::Value;

/// Provider specific symbol for each supported numeric currency code.
pub type AliasTable = &'static [(CurrencyCode, &'static str)];

/// A stateless strategy that fetches one rate from one external provider.
///
/// Implementations never touch the network directly, they go through the
/// shared [`crate::providers::envelope::HttpEnvelope`] so every call is audited.
#[async_trait]
pub trait RateSource: Send + Sync {
    fn id(&self) -> SourceId;

    async fn fetch_rate(&self, pair: CurrencyPair) -> RateResult<f64>;
}

/// Looks up a code in a provider's alias table.
pub fn resolve_alias(
    table: AliasTable,
    provider: SourceId,
    code: CurrencyCode,
) -> RateResult<&'static str> {
    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, alias)| *alias)
        .ok_or(RateError::UnsupportedCurrency { provider, code })
}

/// Resolves both sides of a pair, failing on the first unsupported code.
pub fn resolve_pair(
    table: AliasTable,
    provider: SourceId,
    pair: CurrencyPair,
) -> RateResult<(&'static str, &'static str)> {
    Ok((
        resolve_alias(table, provider, pair.from)?,
        resolve_alias(table, provider, pair.to)?,
    ))
}

pub fn parse_json(provider: SourceId, text: &str) -> RateResult<Value> {
    serde_json::from_str(text)
        .map_err(|e| RateError::malformed(provider, format!("response is not valid JSON: {e}")))
}

/// Walks `path` from `value`, naming the first missing segment in the error.
pub fn require<'a>(provider: SourceId, value: &'a Value, path: &[&str]) -> RateResult<&'a Value> {
    let mut current = value;
    for (depth, segment) in path.iter().enumerate() {
        current = current.get(*segment).ok_or_else(|| {
            RateError::malformed(provider, format!("{} missing", path[..=depth].join(".")))
        })?;
    }
    Ok(current)
}

/// Reads a JSON number or numeric string as a finite positive rate.
pub fn positive_number(provider: SourceId, value: &Value, path: &str) -> RateResult<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) => ensure_positive(provider, n, path),
        None => Err(RateError::malformed(
            provider,
            format!("{path} is not a number: {value}"),
        )),
    }
}

pub fn ensure_positive(provider: SourceId, rate: f64, path: &str) -> RateResult<f64> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(RateError::malformed(
            provider,
            format!("{path} is not a positive number: {rate}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TABLE: AliasTable = &[(CurrencyCode::BTC, "btc"), (CurrencyCode::UAH, "uah")];

    #[test]
    fn test_resolve_pair() {
        let aliases = resolve_pair(TABLE, SourceId::Cryptonator, CurrencyPair::new(1000, 980));
        assert_eq!(aliases.unwrap(), ("btc", "uah"));

        let err = resolve_pair(TABLE, SourceId::Cryptonator, CurrencyPair::new(1000, 978))
            .unwrap_err();
        assert!(matches!(
            err,
            RateError::UnsupportedCurrency { code: CurrencyCode(978), .. }
        ));
    }

    #[test]
    fn test_require_names_missing_segment() {
        let value = json!({"ticker": {"base": "BTC"}});
        let err = require(SourceId::Cryptonator, &value, &["ticker", "price"]).unwrap_err();
        assert!(err.to_string().ends_with("ticker.price missing"));

        let err = require(SourceId::Cryptonator, &json!({}), &["ticker", "price"]).unwrap_err();
        assert!(err.to_string().ends_with("ticker missing"));
    }

    #[test]
    fn test_positive_number_accepts_strings_and_numbers() {
        let p = SourceId::Fixture;
        assert_eq!(positive_number(p, &json!("30.5"), "sale").unwrap(), 30.5);
        assert_eq!(positive_number(p, &json!(12), "sale").unwrap(), 12.0);
        assert!(positive_number(p, &json!("abc"), "sale").is_err());
        assert!(positive_number(p, &json!(0.0), "sale").is_err());
        assert!(positive_number(p, &json!(null), "sale").is_err());
    }
}
