//! timebin CLI entry point
//!
//! Parses command-line arguments, loads the runtime configuration,
//! initializes logging and dispatches to the command handlers.

mod cli;
mod commands;
mod error;
mod io;
mod logging;
mod output;

use clap::Parser;

use timebin_core::config::TimebinConfig;
use timebin_core::error::TimebinError;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 설정 로드 실패는 config 명령만 허용 (validate가 에러를 보고함)
    let loaded = TimebinConfig::load_or_default(&cli.config).await;

    let mut general = loaded
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_default();
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    if let Err(e) = logging::init_tracing(&general) {
        eprintln!("error: failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let writer = OutputWriter::new(cli.output);
    if let Err(e) = run(cli, loaded, &writer).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(
    cli: Cli,
    loaded: Result<TimebinConfig, TimebinError>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let command = match cli.command {
        Commands::Config(args) => return commands::config::execute(args, &cli.config, writer).await,
        command => command,
    };

    let config = loaded?;
    tracing::debug!(path = %cli.config.display(), "configuration loaded");

    match command {
        Commands::Count(args) => commands::count::execute(args, &config, writer).await,
        Commands::Aggregate(args) => commands::aggregate::execute(args, &config, writer).await,
        Commands::Relate(args) => commands::relate::execute(args, &config, writer).await,
        Commands::Edges(args) => commands::edges::execute(args, &config, writer).await,
        Commands::Run(args) => commands::run::execute(args, &config, writer).await,
        Commands::Functions(args) => commands::functions::execute(args, writer).await,
        Commands::Config(_) => Ok(()),
    }
}
