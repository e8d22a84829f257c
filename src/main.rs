use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use xrates::cli::{LogKind, OutputFormat};
use xrates::core::currency::{CurrencyCode, CurrencyPair};
use xrates::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for xrates::AppCommand {
    fn from(cmd: Commands) -> xrates::AppCommand {
        match cmd {
            Commands::Refresh { from, to } => xrates::AppCommand::Refresh {
                pair: from.zip(to).map(|(from, to)| CurrencyPair::new(from, to)),
            },
            Commands::Rates { from, to, format } => xrates::AppCommand::Rates { from, to, format },
            Commands::SetRate { from, to, rate } => xrates::AppCommand::SetRate {
                pair: CurrencyPair::new(from, to),
                rate,
            },
            Commands::Logs {
                kind,
                limit,
                format,
            } => xrates::AppCommand::Logs {
                kind,
                limit,
                format,
            },
            Commands::Cleanup => xrates::AppCommand::Cleanup,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Refresh one pair from its source, or every pair
    Refresh {
        /// Numeric code of the base currency
        #[arg(long, requires = "to")]
        from: Option<CurrencyCode>,
        /// Numeric code of the quote currency
        #[arg(long, requires = "from")]
        to: Option<CurrencyCode>,
    },
    /// List stored rates
    Rates {
        #[arg(long)]
        from: Option<CurrencyCode>,
        #[arg(long)]
        to: Option<CurrencyCode>,
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Override the rate of an existing pair
    SetRate {
        #[arg(long)]
        from: CurrencyCode,
        #[arg(long)]
        to: CurrencyCode,
        #[arg(long)]
        rate: f64,
    },
    /// Show the audit trail of provider calls
    Logs {
        #[arg(value_enum, default_value = "api")]
        kind: LogKind,
        /// Only show the newest N entries
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Erase all audit logs
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => xrates::cli::setup::setup(),
        Some(cmd) => xrates::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
