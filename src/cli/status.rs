//! Status command: report which layout the database is in.

use crate::config::Config;
use crate::db::Database;
use crate::db::schema::SchemaLayout;
use crate::format::OutputFormat;
use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Arguments for the status command.
#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Markdown)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub database: PathBuf,
    pub layout: SchemaLayout,
    pub row_counts: BTreeMap<String, i64>,
}

impl StatusReport {
    pub fn collect(db_path: &std::path::Path) -> Result<Self> {
        if !db_path.is_file() {
            bail!("database file {} not found", db_path.display());
        }
        let db = Database::open(db_path)?;
        let report = Self {
            database: db_path.to_path_buf(),
            layout: db.layout()?,
            row_counts: db.get_schema()?.row_counts(),
        };
        db.close()?;
        Ok(report)
    }

    fn hint(&self) -> &'static str {
        match self.layout {
            SchemaLayout::Legacy => "Ready to migrate: run `memtask-migrate run`.",
            SchemaLayout::Migrated => "Already migrated.",
            SchemaLayout::Interrupted => concat!(
                "A previous run did not finish. ",
                "Restore from its backup with `memtask-migrate restore --backup FILE`."
            ),
            SchemaLayout::Unknown => "No memories/tasks tables found.",
        }
    }
}

pub fn run_status(config: &Config, args: &StatusArgs) -> Result<u8> {
    let report = StatusReport::collect(&config.database.path)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Markdown => {
            println!("# {}\n", report.database.display());
            println!("- **layout**: {}", report.layout.as_str());
            for (table, count) in &report.row_counts {
                println!("- **{}**: {} rows", table, count);
            }
            println!("\n{}", report.hint());
        }
    }

    Ok(if report.layout == SchemaLayout::Interrupted { 1 } else { 0 })
}
