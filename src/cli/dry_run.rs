//! Dry-run command: migrate a disposable copy and report.

use crate::config::Config;
use crate::format::{OutputFormat, format_dry_run_markdown};
use crate::migration::MigrationOptions;
use crate::tester::MigrationTester;
use anyhow::Result;
use clap::Args;

/// Arguments for the dry-run command.
#[derive(Args, Debug, Default)]
pub struct DryRunArgs {
    /// Report format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Markdown)]
    pub format: OutputFormat,
}

/// Returns 0 when the report passed, 1 otherwise.
pub fn run_dry_run(config: &Config, args: &DryRunArgs) -> Result<u8> {
    let tester = MigrationTester::new(&config.database.path, MigrationOptions::from(config));
    let report = tester.run()?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Markdown => print!("{}", format_dry_run_markdown(&report)),
    }

    Ok(if report.passed { 0 } else { 1 })
}
