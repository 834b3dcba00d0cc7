//! Promotes the staging tables to the live names.
//!
//! Two rename steps: legacy tables move to `*_old`, then the staging tables take
//! the live names. The steps are not atomic as a unit. A crash between them
//! leaves `*_old` and `*_new` side by side; `status` reports that layout as
//! interrupted and `restore` recovers from the backup. Legacy tables are never
//! dropped.

use super::{MigrationContext, MigrationState, Phase};
use crate::types::tables;
use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

/// Renames performed by the first step.
pub const RETIRE: [(&str, &str); 2] = [
    (tables::MEMORIES, tables::MEMORIES_OLD),
    (tables::TASKS, tables::TASKS_OLD),
];

/// Renames performed by the second step.
pub const PROMOTE: [(&str, &str); 4] = [
    (tables::MEMORIES_NEW, tables::MEMORIES),
    (tables::TASKS_NEW, tables::TASKS),
    (tables::MEMORY_TAGS_NEW, tables::MEMORY_TAGS),
    (tables::TASK_TAGS_NEW, tables::TASK_TAGS),
];

fn rename_all(conn: &Connection, renames: &[(&str, &str)]) -> Result<()> {
    let batch: String = renames
        .iter()
        .map(|(from, to)| format!("ALTER TABLE {from} RENAME TO {to};\n"))
        .collect();
    conn.execute_batch(&batch)?;
    Ok(())
}

pub struct Cutover;

impl Cutover {
    pub fn retire_legacy(conn: &Connection) -> Result<()> {
        rename_all(conn, &RETIRE).context("Failed to rename legacy tables to *_old")
    }

    pub fn promote_staging(conn: &Connection) -> Result<()> {
        rename_all(conn, &PROMOTE).context("Failed to promote *_new tables")
    }
}

impl Phase for Cutover {
    fn state(&self) -> MigrationState {
        MigrationState::CuttingOver
    }

    fn run(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let conn = ctx.conn();
        Self::retire_legacy(conn)?;
        info!("Legacy tables renamed to memories_old / tasks_old");
        Self::promote_staging(conn)?;
        info!("Normalized tables promoted to live names");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{table_exists, table_foreign_keys};
    use crate::migration::{LegacyLayout, SchemaBuilder};

    #[test]
    fn test_cutover_swaps_tables_and_rewrites_references() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys=ON;
             CREATE TABLE memories (id INTEGER PRIMARY KEY, title TEXT, content TEXT, category TEXT,
                 tags TEXT, priority INTEGER, created_at TEXT, updated_at TEXT);
             CREATE TABLE tasks (id INTEGER PRIMARY KEY, title TEXT, description TEXT, status TEXT,
                 category TEXT, project TEXT, tags TEXT, priority INTEGER, due_date TEXT,
                 created_at TEXT, updated_at TEXT, completed_at TEXT, archived INTEGER);",
        )
        .unwrap();
        let layout = LegacyLayout::inspect(&conn).unwrap();
        SchemaBuilder::create_reference_tables(&conn).unwrap();
        SchemaBuilder::create_staging_tables(&conn, &layout).unwrap();

        Cutover::retire_legacy(&conn).unwrap();
        Cutover::promote_staging(&conn).unwrap();

        let expected = [
            "memories_old",
            "tasks_old",
            "memories",
            "tasks",
            "memory_tags",
            "task_tags",
        ];
        for table in expected {
            assert!(table_exists(&conn, table).unwrap(), "missing {table}");
        }
        for table in tables::STAGING {
            assert!(!table_exists(&conn, table).unwrap(), "{table} still present");
        }

        let fks = table_foreign_keys(&conn, "memory_tags").unwrap();
        assert!(fks.iter().any(|fk| fk.to_table == "memories"));
    }

    #[test]
    fn test_promote_without_staging_fails() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(Cutover::promote_staging(&conn).is_err());
    }
}
