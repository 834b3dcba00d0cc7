//! Normalized table creation.
//!
//! Reference tables are created if missing. Entity and junction tables are
//! created under staging names (`*_new`) beside the untouched legacy tables.

use super::{MigrationContext, MigrationState, Phase};
use crate::db::schema::{ColumnInfo, table_columns, table_exists};
use crate::types::{LegacyMemory, LegacyTask, tables};
use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::{info, warn};

const REFERENCE_DDL: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    color TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS statuses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    is_completed INTEGER NOT NULL DEFAULT 0 CHECK (is_completed IN (0, 1)),
    sort_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

/// Column definitions of one legacy table.
#[derive(Debug, Clone, Default)]
struct LegacyTable {
    columns: HashMap<String, ColumnInfo>,
    autoincrement: bool,
}

impl LegacyTable {
    fn read(conn: &Connection, table: &str, required: &[&str]) -> Result<Self> {
        if !table_exists(conn, table)? {
            return Err(anyhow!("legacy table '{}' not found", table));
        }

        let columns: HashMap<String, ColumnInfo> = table_columns(conn, table)?
            .into_iter()
            .map(|c| (c.name.to_lowercase(), c))
            .collect();

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|c| !columns.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            return Err(anyhow!(
                "legacy table '{}' is missing column(s): {}",
                table,
                missing.join(", ")
            ));
        }

        Ok(Self {
            columns,
            autoincrement: declares_autoincrement(conn, table)?,
        })
    }

    fn declared_type(&self, column: &str) -> &str {
        self.columns
            .get(column)
            .map(|c| c.data_type.as_str())
            .unwrap_or("")
    }

    /// Type plus the `NOT NULL` and `DEFAULT` clauses of a copied column.
    fn definition(&self, column: &str) -> String {
        let Some(info) = self.columns.get(column) else {
            return String::new();
        };
        let mut def = info.data_type.clone();
        if !info.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &info.default_value {
            def.push_str(" DEFAULT ");
            def.push_str(&default_clause(default));
        }
        def.trim_start().to_string()
    }

    fn primary_key(&self) -> String {
        let mut def = format!("{} PRIMARY KEY", self.declared_type("id"));
        if self.autoincrement {
            def.push_str(" AUTOINCREMENT");
        }
        if let Some(info) = self.columns.get("id") {
            if !info.nullable {
                def.push_str(" NOT NULL");
            }
        }
        def.trim_start().to_string()
    }
}

/// Re-emit a `PRAGMA table_info` default. Non-keyword expressions are wrapped in
/// parentheses.
fn default_clause(expr: &str) -> String {
    let keyword = ["CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME"]
        .iter()
        .any(|k| expr.eq_ignore_ascii_case(k));
    if keyword {
        expr.to_string()
    } else {
        format!("({expr})")
    }
}

fn declares_autoincrement(conn: &Connection, table: &str) -> Result<bool> {
    let sql: Option<String> = conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(sql.is_some_and(|sql| sql.to_uppercase().contains("AUTOINCREMENT")))
}

/// Column definitions of the legacy tables.
///
/// Copied columns reuse the legacy declared type, nullability and default so
/// values keep their storage class and later inserts behave as before.
#[derive(Debug, Clone, Default)]
pub struct LegacyLayout {
    memories: LegacyTable,
    tasks: LegacyTable,
}

impl LegacyLayout {
    /// Read the legacy layout, failing if a table or required column is missing.
    pub fn inspect(conn: &Connection) -> Result<Self> {
        Ok(Self {
            memories: LegacyTable::read(conn, tables::MEMORIES, &LegacyMemory::COLUMNS)?,
            tasks: LegacyTable::read(conn, tables::TASKS, &LegacyTask::COLUMNS)?,
        })
    }

    pub fn memory_type(&self, column: &str) -> &str {
        self.memories.declared_type(column)
    }

    pub fn task_type(&self, column: &str) -> &str {
        self.tasks.declared_type(column)
    }

    fn memories_ddl(&self) -> String {
        let d = |c| self.memories.definition(c);
        format!(
            "CREATE TABLE memories_new (
    id {id},
    title {title},
    content {content},
    category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
    project_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,
    priority {priority},
    created_at {created_at},
    updated_at {updated_at}
);
CREATE INDEX idx_memory_category ON memories_new(category_id);
CREATE INDEX idx_memory_project ON memories_new(project_id);
CREATE INDEX idx_memory_priority ON memories_new(priority);",
            id = self.memories.primary_key(),
            title = d("title"),
            content = d("content"),
            priority = d("priority"),
            created_at = d("created_at"),
            updated_at = d("updated_at"),
        )
    }

    fn tasks_ddl(&self) -> String {
        let d = |c| self.tasks.definition(c);
        format!(
            "CREATE TABLE tasks_new (
    id {id},
    title {title},
    description {description},
    status_id INTEGER NOT NULL REFERENCES statuses(id),
    category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
    project_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,
    priority {priority},
    due_date {due_date},
    created_at {created_at},
    updated_at {updated_at},
    completed_at {completed_at},
    archived {archived}
);
CREATE INDEX idx_task_status ON tasks_new(status_id);
CREATE INDEX idx_task_category ON tasks_new(category_id);
CREATE INDEX idx_task_project ON tasks_new(project_id);
CREATE INDEX idx_task_priority ON tasks_new(priority);
CREATE INDEX idx_task_due_date ON tasks_new(due_date);
CREATE INDEX idx_task_archived ON tasks_new(archived);",
            id = self.tasks.primary_key(),
            title = d("title"),
            description = d("description"),
            priority = d("priority"),
            due_date = d("due_date"),
            created_at = d("created_at"),
            updated_at = d("updated_at"),
            completed_at = d("completed_at"),
            archived = d("archived"),
        )
    }

    fn junctions_ddl(&self) -> String {
        format!(
            "CREATE TABLE memory_tags_new (
    memory_id {memory_id} NOT NULL REFERENCES memories_new(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (memory_id, tag_id)
);
CREATE INDEX idx_memory_tag_tag ON memory_tags_new(tag_id);

CREATE TABLE task_tags_new (
    task_id {task_id} NOT NULL REFERENCES tasks_new(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (task_id, tag_id)
);
CREATE INDEX idx_task_tag_tag ON task_tags_new(tag_id);",
            memory_id = self.memory_type("id"),
            task_id = self.task_type("id"),
        )
    }
}

/// Creates the normalized tables and their indexes.
pub struct SchemaBuilder;

impl SchemaBuilder {
    /// Create the reference tables only. Safe to re-run.
    pub fn create_reference_tables(conn: &Connection) -> Result<()> {
        conn.execute_batch(REFERENCE_DDL)
            .context("Failed to create reference tables")
    }

    /// Create the staging entity and junction tables, dropping leftovers from an
    /// interrupted run first.
    pub fn create_staging_tables(conn: &Connection, layout: &LegacyLayout) -> Result<()> {
        // Children before parents so foreign keys never dangle mid-drop.
        for table in [
            tables::MEMORY_TAGS_NEW,
            tables::TASK_TAGS_NEW,
            tables::MEMORIES_NEW,
            tables::TASKS_NEW,
        ] {
            if table_exists(conn, table)? {
                warn!(table, "Dropping leftover staging table from an interrupted run");
                conn.execute_batch(&format!("DROP TABLE {table}"))?;
            }
        }

        conn.execute_batch(&layout.memories_ddl())
            .context("Failed to create memories_new")?;
        conn.execute_batch(&layout.tasks_ddl())
            .context("Failed to create tasks_new")?;
        conn.execute_batch(&layout.junctions_ddl())
            .context("Failed to create junction tables")?;
        Ok(())
    }
}

impl Phase for SchemaBuilder {
    fn state(&self) -> MigrationState {
        MigrationState::BuildingSchema
    }

    fn run(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let tx = ctx.conn().transaction()?;
        let layout = LegacyLayout::inspect(&tx)?;
        Self::create_reference_tables(&tx)?;
        Self::create_staging_tables(&tx, &layout)?;
        tx.commit()?;

        info!("Created normalized schema");
        Ok(())
    }
}
