//! debscan binary entry point.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use debscan_core::config::GeneralConfig;
use error::CliError;
use output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let writer = OutputWriter::new(cli.output);

    let code = match run(cli, &writer).await {
        Ok(()) => 0,
        Err(e) => {
            if e.should_print() {
                eprintln!("{} {}", "error:".red().bold(), e);
            }
            e.exit_code()
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli, writer: &OutputWriter) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    let loaded = commands::load_config(config_path).await;

    // default logging when the config itself is unusable
    let general = loaded
        .as_ref()
        .map(|config| config.general.clone())
        .unwrap_or_else(|_| GeneralConfig::default());
    logging::init_tracing(&general, cli.log_level.as_deref())
        .map_err(|e| CliError::Config(e.to_string()))?;

    match cli.command {
        Commands::Config(args) => commands::config::execute(args, config_path, writer).await,
        Commands::Scan(args) => commands::scan::execute(args, &loaded?, writer).await,
        Commands::Resolve(args) => commands::resolve::execute(args, &loaded?, writer),
        Commands::Files(args) => commands::files::execute(args, &loaded?, writer),
    }
}
