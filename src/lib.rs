pub mod cli;
pub mod core;
pub mod engine;
pub mod error;
pub mod providers;
pub mod store;

use crate::cli::{LogKind, OutputFormat};
use crate::core::config::AppConfig;
use crate::core::currency::{CurrencyCode, CurrencyPair};
use crate::core::store::{AuditStore, RateStore, bootstrap};
use crate::engine::Dispatcher;
use crate::providers::{HttpEnvelope, SourceRegistry};
use crate::store::DiskStore;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    /// Refresh one pair, or every pair when `pair` is `None`
    Refresh { pair: Option<CurrencyPair> },
    Rates {
        from: Option<CurrencyCode>,
        to: Option<CurrencyCode>,
        format: OutputFormat,
    },
    SetRate { pair: CurrencyPair, rate: f64 },
    Logs {
        kind: LogKind,
        limit: Option<usize>,
        format: OutputFormat,
    },
    Cleanup,
}

/// Everything a command needs, wired from one configuration.
pub struct App {
    pub config: AppConfig,
    pub rates: Arc<dyn RateStore>,
    pub audit: Arc<dyn AuditStore>,
    pub dispatcher: Dispatcher,
}

impl App {
    /// Opens the on-disk store and seeds the configured pairs.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let data_path = config.default_data_path()?;
        let store = Arc::new(
            DiskStore::open(&data_path)
                .with_context(|| format!("Failed to open data store at {}", data_path.display()))?,
        );
        Self::with_store(config, store.clone(), store).await
    }

    pub async fn with_store(
        config: AppConfig,
        rates: Arc<dyn RateStore>,
        audit: Arc<dyn AuditStore>,
    ) -> Result<Self> {
        bootstrap(rates.as_ref(), &config.pairs, Utc::now())
            .await
            .context("Failed to seed currency pairs")?;

        let envelope = Arc::new(
            HttpEnvelope::new(config.http_timeout(), Arc::clone(&audit))
                .context("Failed to build HTTP client")?,
        );
        let registry = SourceRegistry::from_config(&config, envelope);
        let dispatcher = Dispatcher::new(Arc::clone(&rates), registry);

        Ok(App {
            config,
            rates,
            audit,
            dispatcher,
        })
    }

    pub async fn execute(&self, cmd: AppCommand) -> Result<()> {
        match cmd {
            AppCommand::Refresh { pair: Some(pair) } => {
                cli::refresh::run_one(&self.dispatcher, pair).await
            }
            AppCommand::Refresh { pair: None } => {
                cli::refresh::run_all(
                    &self.dispatcher,
                    self.rates.as_ref(),
                    self.config.refresh_concurrency,
                )
                .await?;
                Ok(())
            }
            AppCommand::Rates { from, to, format } => {
                let records = cli::rates::filter_rates(self.rates.list_pairs().await?, from, to);
                let minutes = engine::freshness(self.rates.as_ref(), Utc::now()).await?;
                println!("{}", cli::rates::render(&records, minutes, format)?);
                Ok(())
            }
            AppCommand::SetRate { pair, rate } => {
                let record = self
                    .dispatcher
                    .set_rate(pair, rate)
                    .await
                    .with_context(|| format!("Failed to set rate of {}", pair.alias()))?;
                println!("{record}");
                Ok(())
            }
            AppCommand::Logs {
                kind,
                limit,
                format,
            } => {
                let output = cli::logs::render(self.audit.as_ref(), kind, limit, format).await?;
                println!("{output}");
                Ok(())
            }
            AppCommand::Cleanup => cli::logs::cleanup(self.audit.as_ref()).await,
        }
    }
}

pub async fn run_command(cmd: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("xrates starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!(pairs = config.pairs.len(), "Loaded config");

    let app = App::open(config).await?;
    app.execute(cmd).await
}
