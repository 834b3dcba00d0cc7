//! CLI command definitions for memtask-migrate
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod dry_run;
pub mod restore;
pub mod run;
pub mod status;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dry_run::DryRunArgs;
use restore::RestoreArgs;
use run::RunArgs;
use status::StatusArgs;
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Normalize the legacy memory/task database in place
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Migrate the database in place (default if no subcommand given)
    Run(RunArgs),

    /// Migrate a disposable copy and report what would happen
    DryRun(DryRunArgs),

    /// Copy a backup over the database
    Restore(RestoreArgs),

    /// Show whether the database is legacy, migrated or interrupted
    Status(StatusArgs),
}

/// Ask a yes/no question. Anything but `y`/`yes` is a no.
pub fn confirm<R: BufRead, W: Write>(prompt: &str, input: &mut R, output: &mut W) -> Result<bool> {
    write!(output, "{} [y/N] ", prompt)?;
    output.flush()?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    let answer = answer.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

/// Prompt on the terminal.
pub fn confirm_on_terminal(prompt: &str) -> Result<bool> {
    confirm(prompt, &mut std::io::stdin().lock(), &mut std::io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_confirm_answers() {
        let cases = [
            ("y\n", true),
            ("YES\n", true),
            ("n\n", false),
            ("\n", false),
            ("", false),
        ];
        for (answer, expected) in cases {
            let mut output = Vec::new();
            let result = confirm("Continue?", &mut Cursor::new(answer), &mut output).unwrap();
            assert_eq!(result, expected, "answer {answer:?}");
            assert_eq!(String::from_utf8(output).unwrap(), "Continue? [y/N] ");
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "memtask-migrate",
            "dry-run",
            "--format",
            "json",
            "--database",
            "notes.db",
            "--log",
            "off",
        ])
        .unwrap();

        assert_eq!(cli.database, Some(PathBuf::from("notes.db")));
        assert_eq!(cli.log, "off");
        match cli.command {
            Some(Command::DryRun(args)) => {
                assert_eq!(args.format, crate::format::OutputFormat::Json)
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_no_subcommand_defaults_to_none() {
        let cli = Cli::try_parse_from(["memtask-migrate"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log, "2");
    }
}
