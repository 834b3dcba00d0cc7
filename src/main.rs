//! memtask-migrate CLI
//!
//! Migrates the legacy memory/task database to the normalized schema.
//!
//! Usage:
//!   memtask-migrate [--database FILE] [run --yes]
//!   memtask-migrate dry-run --format json
//!   memtask-migrate restore --backup FILE
//!   memtask-migrate status

use anyhow::Result;
use clap::Parser;
use memtask_migrate::cli::dry_run::run_dry_run;
use memtask_migrate::cli::restore::run_restore;
use memtask_migrate::cli::run::{RunArgs, run_migrate};
use memtask_migrate::cli::status::run_status;
use memtask_migrate::cli::{Cli, Command};
use memtask_migrate::config::Config;
use memtask_migrate::logging::{self, LogTarget};
use std::process::ExitCode;
use tracing::{debug, error};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    if let Err(e) = logging::init(&LogTarget::parse(&cli.log), cli.verbose) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let mut config = Config::resolve(cli.config.as_deref())?;

    // Override paths from CLI arguments
    if let Some(db_path) = cli.database {
        config.database.path = db_path;
    }
    debug!(database = %config.database.path.display(), "Resolved configuration");

    match cli.command {
        Some(Command::Run(args)) => run_migrate(&config, &args),
        Some(Command::DryRun(args)) => run_dry_run(&config, &args),
        Some(Command::Restore(args)) => run_restore(&config, &args),
        Some(Command::Status(args)) => run_status(&config, &args),
        None => run_migrate(&config, &RunArgs::default()),
    }
}
