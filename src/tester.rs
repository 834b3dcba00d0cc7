//! Dry-run harness: migrates a disposable copy and checks the result.

use crate::db::Database;
use crate::db::schema::{quote_ident, row_count, table_exists};
use crate::migration::backup::copy_with_sidecars;
use crate::migration::{MigrationOptions, MigrationOrchestrator, MigrationReport};
use crate::types::{tables, value_to_json};
use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use rusqlite::types::Value;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Migrated entities sampled into the report.
const SAMPLED: [&str; 2] = [tables::MEMORIES, tables::TASKS];

/// Outcome of a dry run.
#[derive(Debug, Clone, Serialize)]
pub struct DryRunReport {
    pub source: PathBuf,
    pub passed: bool,
    pub failures: Vec<String>,
    /// Present when the migration itself succeeded on the copy.
    pub migration: Option<MigrationReport>,
    /// Expected normalized tables and whether each exists.
    pub tables: BTreeMap<String, bool>,
    /// `memories_old` / `tasks_old` presence.
    pub legacy_backups: BTreeMap<String, bool>,
    pub row_counts: BTreeMap<String, i64>,
    pub samples: BTreeMap<String, JsonValue>,
}

impl DryRunReport {
    fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            passed: false,
            failures: Vec::new(),
            migration: None,
            tables: BTreeMap::new(),
            legacy_backups: BTreeMap::new(),
            row_counts: BTreeMap::new(),
            samples: BTreeMap::new(),
        }
    }
}

/// Runs the full migration against a scratch copy of a database file.
/// The source file is only ever read.
pub struct MigrationTester {
    source: PathBuf,
    options: MigrationOptions,
}

impl MigrationTester {
    pub fn new(source: impl Into<PathBuf>, options: MigrationOptions) -> Self {
        Self {
            source: source.into(),
            options,
        }
    }

    /// Returns `Err` only when the copy cannot be set up; a failed migration
    /// is reported through `DryRunReport::failures`.
    pub fn run(&self) -> Result<DryRunReport> {
        if !self.source.is_file() {
            return Err(anyhow!("database file {} not found", self.source.display()));
        }

        let scratch = tempfile::Builder::new()
            .prefix("memtask-dry-run")
            .tempdir()
            .context("Failed to create scratch directory")?;
        let file_name = self
            .source
            .file_name()
            .ok_or_else(|| anyhow!("{} has no file name", self.source.display()))?;
        let clone = scratch.path().join(file_name);
        copy_with_sidecars(&self.source, &clone)?;
        info!(clone = %clone.display(), "Running dry run against copy");

        let legacy = Database::open(&clone)?.with_conn(|conn| {
            let mut counts = BTreeMap::new();
            for table in [tables::MEMORIES, tables::TASKS] {
                if table_exists(conn, table)? {
                    counts.insert(table, row_count(conn, table)?);
                }
            }
            Ok(counts)
        })?;

        let mut options = self.options.clone();
        options.backup_dir = Some(scratch.path().join("backups"));
        let mut report = DryRunReport::new(&self.source);

        match MigrationOrchestrator::new(&clone, options).run() {
            Ok(migration) => {
                report.migration = Some(migration);
                let db = Database::open(&clone)?;
                db.with_conn(|conn| inspect(conn, &legacy, &mut report))?;
                db.close()?;
            }
            Err(e) => {
                warn!("Dry run migration failed: {}", e);
                report.failures.push(format!("migration failed: {e}"));
            }
        }

        report.passed = report.failures.is_empty();
        scratch
            .close()
            .context("Failed to remove scratch directory")?;
        Ok(report)
    }
}

fn inspect(
    conn: &Connection,
    legacy: &BTreeMap<&str, i64>,
    report: &mut DryRunReport,
) -> Result<()> {
    for table in tables::NORMALIZED {
        let present = table_exists(conn, table)?;
        report.tables.insert(table.to_string(), present);
        if present {
            report
                .row_counts
                .insert(table.to_string(), row_count(conn, table)?);
        } else {
            report.failures.push(format!("table {table} is missing"));
        }
    }

    for table in [tables::MEMORIES_OLD, tables::TASKS_OLD] {
        let present = table_exists(conn, table)?;
        report.legacy_backups.insert(table.to_string(), present);
        if present {
            report
                .row_counts
                .insert(table.to_string(), row_count(conn, table)?);
        } else {
            report.failures.push(format!("legacy table {table} is missing"));
        }
    }

    for (live, old) in [
        (tables::MEMORIES, tables::MEMORIES_OLD),
        (tables::TASKS, tables::TASKS_OLD),
    ] {
        let expected = legacy.get(live).copied().unwrap_or_default();
        for table in [live, old] {
            let actual = report.row_counts.get(table).copied().unwrap_or_default();
            if actual != expected {
                report.failures.push(format!(
                    "{table} has {actual} row(s), expected {expected}"
                ));
            }
        }
    }

    for table in SAMPLED {
        if report.tables.get(table).copied().unwrap_or(false) {
            if let Some(sample) = sample_row(conn, table)? {
                report.samples.insert(table.to_string(), sample);
            }
        }
    }
    Ok(())
}

/// First row of a table as a JSON object.
fn sample_row(conn: &Connection, table: &str) -> Result<Option<JsonValue>> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {} LIMIT 1", quote_ident(table)))?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query([])?;

    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut object = Map::new();
    for (i, name) in names.into_iter().enumerate() {
        let value: Value = row.get(i)?;
        object.insert(name, value_to_json(&value));
    }
    Ok(Some(JsonValue::Object(object)))
}
