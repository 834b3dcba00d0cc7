//! Schema introspection queries.
//!
//! Used by preflight checks, the validator, the dry-run harness and the
//! `status` command to tell legacy, interrupted and migrated files apart.

use super::Database;
use crate::types::tables;
use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Information about a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type exactly as written in the DDL (may be empty).
    pub data_type: String,
    pub nullable: bool,
    /// `DEFAULT` expression text, without enclosing parentheses.
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// Information about a foreign key relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

/// Information about a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub row_count: i64,
}

/// Snapshot of every user table with its row count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub tables: Vec<TableInfo>,
}

impl DatabaseSchema {
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn row_counts(&self) -> BTreeMap<String, i64> {
        self.tables
            .iter()
            .map(|t| (t.name.clone(), t.row_count))
            .collect()
    }
}

/// Which layout a database file is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaLayout {
    /// Free-text legacy tables only; ready to migrate.
    Legacy,
    /// Staging tables or a half-finished cutover are present.
    Interrupted,
    /// Normalized tables are live and the legacy tables were kept as `_old`.
    Migrated,
    /// Neither layout recognized.
    Unknown,
}

impl SchemaLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaLayout::Legacy => "legacy",
            SchemaLayout::Interrupted => "interrupted",
            SchemaLayout::Migrated => "migrated",
            SchemaLayout::Unknown => "unknown",
        }
    }
}

/// Quote an identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Check whether a table exists.
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// List user table names in alphabetical order.
pub fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table'
         AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;

    let names: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(names)
}

/// Get column information for a table.
pub fn table_columns(conn: &Connection, table_name: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table_name)))?;

    let columns: Vec<ColumnInfo> = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                data_type: row.get(2)?,
                nullable: row.get::<_, i32>(3)? == 0,
                default_value: row.get(4)?,
                primary_key: row.get::<_, i32>(5)? > 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(columns)
}

/// Get foreign key information for a table.
pub fn table_foreign_keys(conn: &Connection, table_name: &str) -> Result<Vec<ForeignKeyInfo>> {
    let mut stmt = conn.prepare(&format!(
        "PRAGMA foreign_key_list({})",
        quote_ident(table_name)
    ))?;

    let foreign_keys: Vec<ForeignKeyInfo> = stmt
        .query_map([], |row| {
            Ok(ForeignKeyInfo {
                from_column: row.get(3)?,
                to_table: row.get(2)?,
                to_column: row.get::<_, Option<String>>(4)?.unwrap_or_else(|| "id".into()),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(foreign_keys)
}

/// Count rows in a table.
pub fn row_count(conn: &Connection, table_name: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table_name)),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Classify the layout of a database from its table names.
pub fn detect_layout(conn: &Connection) -> Result<SchemaLayout> {
    let names = table_names(conn)?;
    let has = |name: &str| names.iter().any(|n| n == name);

    let staging = tables::STAGING.iter().any(|t| has(t));
    let live = has(tables::MEMORIES) && has(tables::TASKS);
    let old = has(tables::MEMORIES_OLD) || has(tables::TASKS_OLD);

    let layout = if staging || (old && !live) {
        SchemaLayout::Interrupted
    } else if old && live {
        SchemaLayout::Migrated
    } else if live {
        SchemaLayout::Legacy
    } else {
        SchemaLayout::Unknown
    };
    Ok(layout)
}

impl Database {
    /// Get schema and row counts for every user table.
    pub fn get_schema(&self) -> Result<DatabaseSchema> {
        self.with_conn(|conn| {
            let mut tables = Vec::new();
            for name in table_names(conn)? {
                tables.push(TableInfo {
                    columns: table_columns(conn, &name)?,
                    foreign_keys: table_foreign_keys(conn, &name)?,
                    row_count: row_count(conn, &name)?,
                    name,
                });
            }
            Ok(DatabaseSchema { tables })
        })
    }

    /// Get a list of table names only (lightweight).
    pub fn get_table_names(&self) -> Result<Vec<String>> {
        self.with_conn(table_names)
    }

    /// Classify the layout of this database.
    pub fn layout(&self) -> Result<SchemaLayout> {
        self.with_conn(detect_layout)
    }
}
