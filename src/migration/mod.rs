//! Offline migration from the free-text legacy schema to the normalized schema.
//!
//! A run walks a fixed sequence of states:
//!
//! ```text
//! Idle -> BackingUp -> BuildingSchema -> Seeding -> Extracting -> MigratingRows
//!      -> BuildingRelationships -> Validating -> CuttingOver -> Done
//! ```
//!
//! Any failure after the backup exists restores it and ends in `RolledBack`.
//! Every step after the backup is a [`Phase`]; the orchestrator holds them as an
//! ordered list so callers can run a subset or splice in extra phases.

pub mod backup;
pub mod cutover;
pub mod extract;
pub mod orchestrator;
pub mod relationships;
pub mod rows;
pub mod schema;
pub mod seed;
pub mod validate;

pub use backup::BackupManager;
pub use cutover::Cutover;
pub use extract::{DataExtractor, Lookups, normalize_name, parse_tags};
pub use orchestrator::MigrationOrchestrator;
pub use relationships::RelationshipBuilder;
pub use rows::{RowMigrator, canonical_status};
pub use schema::{LegacyLayout, SchemaBuilder};
pub use seed::ReferenceSeeder;
pub use validate::Validator;

use crate::config::Config;
use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Idle,
    BackingUp,
    BuildingSchema,
    Seeding,
    Extracting,
    MigratingRows,
    BuildingRelationships,
    Validating,
    CuttingOver,
    Done,
    RolledBack,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::Idle => "idle",
            MigrationState::BackingUp => "backing_up",
            MigrationState::BuildingSchema => "building_schema",
            MigrationState::Seeding => "seeding",
            MigrationState::Extracting => "extracting",
            MigrationState::MigratingRows => "migrating_rows",
            MigrationState::BuildingRelationships => "building_relationships",
            MigrationState::Validating => "validating",
            MigrationState::CuttingOver => "cutting_over",
            MigrationState::Done => "done",
            MigrationState::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Where backups go. `None` places them next to the database.
    pub backup_dir: Option<PathBuf>,
    /// Keep the backup after a successful run.
    pub keep_backup: bool,
    /// Status used when a legacy status cannot be resolved.
    pub default_status: String,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            backup_dir: None,
            keep_backup: true,
            default_status: "not_started".to_string(),
        }
    }
}

impl From<&Config> for MigrationOptions {
    fn from(config: &Config) -> Self {
        Self {
            backup_dir: config.backup.directory.clone(),
            keep_backup: config.backup.keep,
            default_status: config.statuses.default.clone(),
        }
    }
}

/// Rows inserted by the reference seeder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedCounts {
    pub categories: usize,
    pub projects: usize,
    pub statuses: usize,
}

/// Reference rows created from legacy free text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractCounts {
    pub categories: usize,
    pub projects: usize,
    pub tags: usize,
}

/// A task whose legacy status could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusFallback {
    pub task_id: serde_json::Value,
    pub legacy_status: String,
    pub assigned: String,
}

/// Row counts compared by the validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub legacy_memories: i64,
    pub memories: i64,
    pub legacy_tasks: i64,
    pub tasks: i64,
    pub memory_tags: i64,
    pub task_tags: i64,
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub backup_path: Option<PathBuf>,
    pub seeded: SeedCounts,
    pub extracted: ExtractCounts,
    pub memories_migrated: usize,
    pub tasks_migrated: usize,
    pub memory_tags: usize,
    pub task_tags: usize,
    pub status_fallbacks: Vec<StatusFallback>,
    pub validation: Option<ValidationSummary>,
    pub final_state: MigrationState,
}

impl Default for MigrationReport {
    fn default() -> Self {
        Self {
            backup_path: None,
            seeded: SeedCounts::default(),
            extracted: ExtractCounts::default(),
            memories_migrated: 0,
            tasks_migrated: 0,
            memory_tags: 0,
            task_tags: 0,
            status_fallbacks: Vec::new(),
            validation: None,
            final_state: MigrationState::Idle,
        }
    }
}

/// State shared by the phases of one run.
///
/// The connection is injected so tests can drive phases against any handle.
pub struct MigrationContext<'a> {
    conn: &'a mut Connection,
    options: &'a MigrationOptions,
    report: MigrationReport,
    lookups: Option<Lookups>,
}

impl<'a> MigrationContext<'a> {
    pub fn new(conn: &'a mut Connection, options: &'a MigrationOptions) -> Self {
        Self {
            conn,
            options,
            report: MigrationReport::default(),
            lookups: None,
        }
    }

    pub fn conn(&mut self) -> &mut Connection {
        &mut *self.conn
    }

    pub fn report_mut(&mut self) -> &mut MigrationReport {
        &mut self.report
    }

    pub fn into_report(self) -> MigrationReport {
        self.report
    }

    /// Reload name-to-id lookups from the reference tables.
    pub fn refresh_lookups(&mut self) -> Result<&Lookups> {
        let lookups = Lookups::load(&*self.conn)?;
        Ok(self.lookups.insert(lookups))
    }

    /// Borrow everything a row-writing phase needs at once, loading lookups on
    /// first use.
    pub(crate) fn parts(
        &mut self,
    ) -> Result<(&mut Connection, &MigrationOptions, &Lookups, &mut MigrationReport)> {
        let lookups = match self.lookups.take() {
            Some(lookups) => lookups,
            None => Lookups::load(&*self.conn)?,
        };
        let lookups = self.lookups.insert(lookups);
        Ok((&mut *self.conn, self.options, &*lookups, &mut self.report))
    }
}

/// One step of the pipeline.
pub trait Phase {
    /// The orchestrator state while this phase runs.
    fn state(&self) -> MigrationState;

    fn run(&self, ctx: &mut MigrationContext<'_>) -> Result<()>;
}

/// The fixed pipeline that follows the backup, in execution order.
pub fn default_phases() -> Vec<Box<dyn Phase>> {
    vec![
        Box::new(SchemaBuilder),
        Box::new(ReferenceSeeder),
        Box::new(DataExtractor),
        Box::new(RowMigrator),
        Box::new(RelationshipBuilder),
        Box::new(Validator),
        Box::new(Cutover),
    ]
}
