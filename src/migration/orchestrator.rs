//! Sequences the phases and owns the rollback path.

use super::backup::BackupManager;
use super::schema::LegacyLayout;
use super::{
    MigrationContext, MigrationOptions, MigrationReport, MigrationState, Phase, default_phases,
};
use crate::db::Database;
use crate::db::schema::table_exists;
use crate::error::{MigrationError, MigrationResult};
use crate::types::tables;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Runs the full migration against one database file.
///
/// The file is the single source of truth: it is backed up before the first
/// mutation and restored from that backup if any phase fails.
pub struct MigrationOrchestrator {
    db_path: PathBuf,
    options: MigrationOptions,
    backups: BackupManager,
    phases: Vec<Box<dyn Phase>>,
    state: MigrationState,
}

impl MigrationOrchestrator {
    pub fn new(db_path: impl Into<PathBuf>, options: MigrationOptions) -> Self {
        let backups = match &options.backup_dir {
            Some(dir) => BackupManager::new().with_dir(dir),
            None => BackupManager::new(),
        };
        Self {
            db_path: db_path.into(),
            options,
            backups,
            phases: default_phases(),
            state: MigrationState::Idle,
        }
    }

    /// Insert a phase before the first phase running in `state`.
    /// Appends when no phase matches.
    pub fn insert_before(&mut self, state: MigrationState, phase: Box<dyn Phase>) -> &mut Self {
        let index = self
            .phases
            .iter()
            .position(|p| p.state() == state)
            .unwrap_or(self.phases.len());
        self.phases.insert(index, phase);
        self
    }

    /// Replace every phase running in `state`.
    pub fn replace(&mut self, state: MigrationState, phase: Box<dyn Phase>) -> &mut Self {
        let mut incoming = Some(phase);
        self.phases = std::mem::take(&mut self.phases)
            .into_iter()
            .filter_map(|p| {
                if p.state() == state {
                    incoming.take()
                } else {
                    Some(p)
                }
            })
            .collect();
        if let Some(phase) = incoming {
            self.phases.push(phase);
        }
        self
    }

    /// States of the configured phases, in execution order.
    pub fn phase_states(&self) -> Vec<MigrationState> {
        self.phases.iter().map(|p| p.state()).collect()
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Run every phase. On failure the database is restored and the original
    /// error is returned.
    pub fn run(&mut self) -> MigrationResult<MigrationReport> {
        if self.state != MigrationState::Idle {
            return Err(MigrationError::precondition(format!(
                "orchestrator already ran (state: {})",
                self.state
            )));
        }

        preflight(&self.db_path).map_err(|e| {
            error!("Preflight failed: {:#}", e);
            MigrationError::precondition(format!("{e:#}"))
        })?;

        self.transition(MigrationState::BackingUp);
        let backup = match self.backups.create_backup(&self.db_path) {
            Ok(path) => path,
            Err(e) => {
                error!("Backup failed, nothing was changed: {:#}", e);
                self.transition(MigrationState::Idle);
                return Err(MigrationError::precondition(format!("{e:#}")));
            }
        };

        let mut db = match Database::open(&self.db_path) {
            Ok(db) => db,
            Err(e) => return Err(self.roll_back(&backup, None, MigrationState::BackingUp, e)),
        };

        let mut report = match self.run_phases(&mut db) {
            Ok(report) => report,
            Err((failed, e)) => return Err(self.roll_back(&backup, Some(db), failed, e)),
        };

        if let Err(e) = db.close() {
            warn!("Failed to close database after migration: {:#}", e);
        }

        self.transition(MigrationState::Done);
        report.final_state = MigrationState::Done;
        if self.options.keep_backup {
            report.backup_path = Some(backup);
        } else if let Err(e) = self.backups.discard(&backup) {
            warn!("Failed to discard backup: {:#}", e);
            report.backup_path = Some(backup);
        }

        info!(
            memories = report.memories_migrated,
            tasks = report.tasks_migrated,
            "Migration complete"
        );
        Ok(report)
    }

    fn run_phases(
        &mut self,
        db: &mut Database,
    ) -> std::result::Result<MigrationReport, (MigrationState, anyhow::Error)> {
        let mut ctx = MigrationContext::new(db.conn_mut(), &self.options);
        for phase in &self.phases {
            let state = phase.state();
            debug!(from = %self.state, to = %state, "State transition");
            self.state = state;
            info!(phase = %state, "Starting phase");
            phase.run(&mut ctx).map_err(|e| (state, e))?;
        }
        Ok(ctx.into_report())
    }

    fn roll_back(
        &mut self,
        backup: &Path,
        handle: Option<Database>,
        failed: MigrationState,
        cause: anyhow::Error,
    ) -> MigrationError {
        let original = MigrationError::from_phase(failed, cause);
        error!(phase = %failed, "Migration failed, restoring backup: {}", original);
        self.transition(MigrationState::RolledBack);

        match self.backups.restore(backup, &self.db_path, handle) {
            Ok(()) => original,
            Err(e) => {
                error!(
                    backup = %backup.display(),
                    "Rollback failed, manual recovery required: {:#}", e
                );
                MigrationError::RollbackFailed {
                    original: Box::new(original),
                    backup: backup.to_path_buf(),
                    cause: e,
                }
            }
        }
    }

    fn transition(&mut self, to: MigrationState) {
        debug!(from = %self.state, to = %to, "State transition");
        self.state = to;
    }
}

/// Refuse to start unless the file holds an unmigrated legacy schema.
pub fn preflight(db_path: &Path) -> Result<()> {
    if !db_path.is_file() {
        anyhow::bail!("database file {} not found", db_path.display());
    }

    let db = Database::open(db_path)?;
    db.with_conn(|conn| {
        for table in tables::MIGRATED_MARKERS {
            if table_exists(conn, table)? {
                anyhow::bail!(
                    "table '{}' already exists; the database appears to be migrated",
                    table
                );
            }
        }
        LegacyLayout::inspect(conn)?;
        Ok(())
    })?;
    db.close()
}
