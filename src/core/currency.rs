//! Numeric ISO currency codes and directional currency pairs
//!
//! Codes are stored as numbers rather than abbreviations because abbreviations
//! differ between institutions (RUB vs RUR) while numeric codes do not.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(pub u16);

/// Display aliases and names for the currencies the system knows about.
const KNOWN_CURRENCIES: &[(CurrencyCode, &str, &str)] = &[
    (CurrencyCode::BTC, "BTC", "Bitcoin"),
    (CurrencyCode::RUB, "RUB", "Russian Ruble"),
    (CurrencyCode::UAH, "UAH", "Ukrainian Hryvnia"),
    (CurrencyCode::USD, "USD", "United States Dollar"),
    (CurrencyCode::EUR, "EUR", "Euro"),
];

impl CurrencyCode {
    pub const RUB: CurrencyCode = CurrencyCode(643);
    pub const USD: CurrencyCode = CurrencyCode(840);
    pub const EUR: CurrencyCode = CurrencyCode(978);
    pub const UAH: CurrencyCode = CurrencyCode(980);
    /// Not an ISO code; bitcoin has none.
    pub const BTC: CurrencyCode = CurrencyCode(1000);

    pub fn alias(self) -> Option<&'static str> {
        KNOWN_CURRENCIES
            .iter()
            .find(|(code, _, _)| *code == self)
            .map(|(_, alias, _)| *alias)
    }

    pub fn name(self) -> Option<&'static str> {
        KNOWN_CURRENCIES
            .iter()
            .find(|(code, _, _)| *code == self)
            .map(|(_, _, name)| *name)
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u16>()
            .map(CurrencyCode)
            .map_err(|_| anyhow::anyhow!("Invalid numeric currency code: {}", s))
    }
}

impl From<u16> for CurrencyCode {
    fn from(code: u16) -> Self {
        CurrencyCode(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
}

impl CurrencyPair {
    pub fn new(from: impl Into<CurrencyCode>, to: impl Into<CurrencyCode>) -> Self {
        CurrencyPair {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Human readable form such as `USD-UAH`, falling back to the numeric codes.
    pub fn alias(&self) -> String {
        let from = self
            .from
            .alias()
            .map_or_else(|| self.from.to_string(), str::to_string);
        let to = self
            .to
            .alias()
            .map_or_else(|| self.to.to_string(), str::to_string);
        format!("{from}-{to}")
    }
}

impl Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=>{}", self.from, self.to)
    }
}
