//! Terminal front end: rendering and the command runners behind each subcommand

pub mod logs;
pub mod rates;
pub mod refresh;
pub mod setup;
pub mod ui;

use clap::ValueEnum;

/// How listings are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Xml,
}

/// Which audit trail to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogKind {
    /// Every outbound call
    Api,
    /// Failed calls with their traceback
    Errors,
}
