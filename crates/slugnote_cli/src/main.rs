//! `slugnote` entry point.
//!
//! # Responsibility
//! - Parse arguments, load configuration and start logging.
//! - Map command failures to a non-zero exit code.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command};
use commands::{CliError, Context};
use log::error;
use slugnote_core::{init_logging, AppConfig};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("slugnote: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_logging(&config.log_level, config.log_dir.as_deref()) {
        eprintln!("slugnote: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("slugnote: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<(), CliError> {
    let ctx = Context::open(config, cli.admin_token.as_deref())?;
    match cli.command {
        Command::New => commands::new_note(&ctx),
        Command::Show { slug } => commands::show_note(&ctx, &slug),
        Command::List { limit } => commands::list_notes(&ctx, limit),
        Command::Edit(args) => commands::edit_note(&ctx, args).await,
    }
}
