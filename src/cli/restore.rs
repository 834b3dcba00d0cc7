//! Restore command: copy a backup over the database.

use super::confirm_on_terminal;
use crate::config::Config;
use crate::migration::BackupManager;
use anyhow::{Result, bail};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the restore command.
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backup file written by a previous run
    #[arg(short, long, value_name = "FILE")]
    pub backup: PathBuf,

    /// Restore without prompting for confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,
}

pub fn run_restore(config: &Config, args: &RestoreArgs) -> Result<u8> {
    if !args.backup.is_file() {
        bail!("backup file {} not found", args.backup.display());
    }

    let db_path = &config.database.path;
    if !args.yes {
        println!("This will overwrite '{}' with '{}'.", db_path.display(), args.backup.display());
        if !confirm_on_terminal("Continue?")? {
            println!("Restore cancelled.");
            return Ok(0);
        }
    }

    BackupManager::new().restore(&args.backup, db_path, None)?;
    println!("Restored {} from {}", db_path.display(), args.backup.display());
    Ok(0)
}
