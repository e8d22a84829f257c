use crate::core::rate::SourceId;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

const API_KEY_ENV: &str = "COINMARKETCAP_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SeedPair {
    pub from: u16,
    pub to: u16,
    pub source: SourceId,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
}

impl ProviderConfig {
    fn new(base_url: &str) -> Self {
        ProviderConfig {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ProvidersConfig {
    pub privat: ProviderConfig,
    pub cbr: ProviderConfig,
    pub cryptonator: ProviderConfig,
    pub blockchain_info: ProviderConfig,
    pub coinmarketcap: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            privat: ProviderConfig::new("https://api.privatbank.ua"),
            cbr: ProviderConfig::new("http://www.cbr.ru"),
            cryptonator: ProviderConfig::new("https://api.cryptonator.com"),
            blockchain_info: ProviderConfig::new("https://blockchain.info"),
            coinmarketcap: ProviderConfig::new("https://pro-api.coinmarketcap.com"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct KeysConfig {
    pub coinmarketcap: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Timeout for a single outbound request.
    pub http_timeout_secs: u64,
    /// Upper bound on pairs refreshed at the same time.
    pub refresh_concurrency: usize,
    pub data_path: Option<String>,
    pub keys: KeysConfig,
    pub providers: ProvidersConfig,
    /// Pairs created on first start.
    pub pairs: Vec<SeedPair>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            http_timeout_secs: 15,
            refresh_concurrency: 4,
            data_path: None,
            keys: KeysConfig::default(),
            providers: ProvidersConfig::default(),
            pairs: default_pairs(),
        }
    }
}

fn default_pairs() -> Vec<SeedPair> {
    let seed = |from, to, source| SeedPair { from, to, source };
    vec![
        seed(840, 980, SourceId::Privat),
        seed(840, 643, SourceId::Cbr),
        seed(1000, 840, SourceId::Privat),
        seed(1000, 980, SourceId::CoinMarketCap),
        seed(1000, 643, SourceId::BlockchainInfo),
    ]
}

impl AppConfig {
    /// Loads the default config file. Without one every setting takes its default.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        Self::load_or_default(Self::default_config_path()?)
    }

    pub fn load_or_default<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_path(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "xrates", "xrates")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("org", "xrates", "xrates")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Configured key, or the environment variable when the file has none.
    pub fn coinmarketcap_key(&self) -> Option<String> {
        self.keys
            .coinmarketcap
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}
