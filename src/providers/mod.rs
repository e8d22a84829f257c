//! Rate source handlers and the HTTP envelope they share

pub mod blockchain_info;
pub mod cbr;
pub mod coinmarketcap;
pub mod cryptonator;
pub mod envelope;
pub mod fixture;
pub mod privat;
pub mod registry;

pub use envelope::HttpEnvelope;
pub use registry::SourceRegistry;
