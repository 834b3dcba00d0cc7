//! Copies legacy memory and task rows into the staging tables.

use super::extract::Lookups;
use super::{MigrationContext, MigrationState, Phase, StatusFallback};
use crate::db::schema::table_exists;
use crate::types::{LegacyMemory, LegacyTask, tables, value_to_json};
use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Map a legacy status string to a canonical status name.
///
/// Spaces and hyphens are folded into underscores before matching, so
/// `"In Progress"` and `"in-progress"` both resolve to `in_progress`.
pub fn canonical_status(raw: &str) -> Option<&'static str> {
    let key = raw.trim().to_lowercase().replace([' ', '-'], "_");
    let name = match key.as_str() {
        "not_started" | "todo" | "to_do" | "pending" | "open" | "new" | "backlog" => "not_started",
        "in_progress" | "doing" | "active" | "started" | "wip" => "in_progress",
        "completed" | "done" | "complete" | "finished" | "closed" => "completed",
        "cancelled" | "canceled" | "abandoned" | "wontfix" | "won't_fix" => "cancelled",
        "on_hold" | "blocked" | "paused" | "waiting" | "hold" => "on_hold",
        _ => return None,
    };
    Some(name)
}

/// How a legacy status was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusResolution {
    /// Matched a canonical alias or an existing status row.
    Known(i64),
    /// Legacy value was NULL or blank.
    Missing(i64),
    /// Legacy value was unrecognized; the default was used.
    Fallback(i64),
}

impl StatusResolution {
    pub fn id(&self) -> i64 {
        match self {
            Self::Known(id) | Self::Missing(id) | Self::Fallback(id) => *id,
        }
    }
}

/// Resolves legacy status text against the `statuses` table.
pub struct StatusResolver<'a> {
    statuses: &'a HashMap<String, i64>,
    default_id: i64,
}

impl<'a> StatusResolver<'a> {
    pub fn new(lookups: &'a Lookups, default_status: &str) -> Result<Self> {
        let default_id = lookups
            .statuses
            .get(default_status)
            .copied()
            .ok_or_else(|| anyhow!("default status '{}' does not exist", default_status))?;
        Ok(Self {
            statuses: &lookups.statuses,
            default_id,
        })
    }

    pub fn resolve(&self, raw: Option<&str>) -> StatusResolution {
        let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
            return StatusResolution::Missing(self.default_id);
        };

        let direct = raw.trim().to_lowercase();
        let id = canonical_status(raw)
            .and_then(|name| self.statuses.get(name))
            .or_else(|| self.statuses.get(&direct));

        match id {
            Some(id) => StatusResolution::Known(*id),
            None => StatusResolution::Fallback(self.default_id),
        }
    }
}

/// Copies every legacy row, preserving primary keys and timestamps verbatim.
pub struct RowMigrator;

impl RowMigrator {
    pub fn migrate_memories(conn: &Connection, lookups: &Lookups) -> Result<usize> {
        let mut select = conn.prepare(LegacyMemory::SELECT)?;
        let mut insert = conn.prepare(
            "INSERT INTO memories_new
                (id, title, content, category_id, project_id, priority, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;

        let mut count = 0;
        let rows = select.query_map([], LegacyMemory::from_row)?;
        for row in rows {
            let memory = row?;
            let category_id = lookups
                .category_id(memory.category.as_deref())
                .with_context(|| format!("memory {:?}", memory.id))?;

            insert
                .execute(params![
                    memory.id,
                    memory.title,
                    memory.content,
                    category_id,
                    Option::<i64>::None,
                    memory.priority,
                    memory.created_at,
                    memory.updated_at,
                ])
                .with_context(|| format!("Failed to insert memory {:?}", memory.id))?;
            count += 1;
        }
        Ok(count)
    }

    pub fn migrate_tasks(
        conn: &Connection,
        lookups: &Lookups,
        default_status: &str,
    ) -> Result<(usize, Vec<StatusFallback>)> {
        let resolver = StatusResolver::new(lookups, default_status)?;
        let mut select = conn.prepare(LegacyTask::SELECT)?;
        let mut insert = conn.prepare(
            "INSERT INTO tasks_new
                (id, title, description, status_id, category_id, project_id, priority,
                 due_date, created_at, updated_at, completed_at, archived)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;

        let mut count = 0;
        let mut fallbacks = Vec::new();
        let rows = select.query_map([], LegacyTask::from_row)?;
        for row in rows {
            let task = row?;
            let status = resolver.resolve(task.status.as_deref());
            match status {
                StatusResolution::Fallback(_) => {
                    let legacy_status = task.status.clone().unwrap_or_default();
                    warn!(
                        task_id = ?task.id,
                        legacy_status = %legacy_status,
                        assigned = default_status,
                        "Unrecognized legacy status, using default"
                    );
                    fallbacks.push(StatusFallback {
                        task_id: value_to_json(&task.id),
                        legacy_status,
                        assigned: default_status.to_string(),
                    });
                }
                StatusResolution::Missing(_) => {
                    debug!(task_id = ?task.id, "Task has no legacy status, using default");
                }
                StatusResolution::Known(_) => {}
            }

            let context = || format!("task {:?}", task.id);
            let category_id = lookups
                .category_id(task.category.as_deref())
                .with_context(context)?;
            let project_id = lookups
                .project_id(task.project.as_deref())
                .with_context(context)?;

            insert
                .execute(params![
                    task.id,
                    task.title,
                    task.description,
                    status.id(),
                    category_id,
                    project_id,
                    task.priority,
                    task.due_date,
                    task.created_at,
                    task.updated_at,
                    task.completed_at,
                    task.archived,
                ])
                .with_context(|| format!("Failed to insert task {:?}", task.id))?;
            count += 1;
        }
        Ok((count, fallbacks))
    }
}

/// Raise the staging table's `AUTOINCREMENT` counter to the legacy one so ids
/// of deleted legacy rows are not handed out again.
pub fn carry_sequence(conn: &Connection, legacy: &str, staging: &str) -> Result<()> {
    if !table_exists(conn, "sqlite_sequence")? {
        return Ok(());
    }
    let seq: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1",
            [legacy],
            |row| row.get(0),
        )
        .optional()?;
    let Some(seq) = seq else {
        return Ok(());
    };

    let updated = conn.execute(
        "UPDATE sqlite_sequence SET seq = MAX(seq, ?1) WHERE name = ?2",
        params![seq, staging],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2)",
            params![staging, seq],
        )?;
    }
    debug!(table = staging, seq, "Carried autoincrement counter");
    Ok(())
}

impl Phase for RowMigrator {
    fn state(&self) -> MigrationState {
        MigrationState::MigratingRows
    }

    fn run(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let (conn, options, lookups, report) = ctx.parts()?;
        let tx = conn.transaction()?;
        let memories = Self::migrate_memories(&tx, lookups)?;
        let (tasks, fallbacks) = Self::migrate_tasks(&tx, lookups, &options.default_status)?;
        carry_sequence(&tx, tables::MEMORIES, tables::MEMORIES_NEW)?;
        carry_sequence(&tx, tables::TASKS, tables::TASKS_NEW)?;
        tx.commit()?;

        info!(
            memories,
            tasks,
            status_fallbacks = fallbacks.len(),
            "Migrated legacy rows"
        );
        report.memories_migrated = memories;
        report.tasks_migrated = tasks;
        report.status_fallbacks = fallbacks;
        Ok(())
    }
}
