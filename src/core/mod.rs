//! Core business logic abstractions

pub mod audit;
pub mod config;
pub mod currency;
pub mod log;
pub mod rate;
pub mod source;
pub mod store;

// Re-export main types for cleaner imports
pub use audit::{CallAuditRecord, FailureRecord};
pub use currency::{CurrencyCode, CurrencyPair};
pub use rate::{CurrencyPairRate, SourceId};
pub use source::RateSource;
pub use store::{AuditStore, RateStore};
