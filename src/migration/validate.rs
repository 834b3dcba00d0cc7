//! Pre-cutover consistency checks between legacy and staging tables.

use super::extract::parse_tags;
use super::{MigrationContext, MigrationState, Phase, ValidationSummary};
use crate::db::schema::{quote_ident, row_count};
use crate::error::ValidationFailure;
use crate::types::tables;
use anyhow::Result;
use rusqlite::Connection;
use tracing::{error, info};

/// A foreign key column and the reference it must resolve to.
struct ForeignKeyCheck {
    table: &'static str,
    column: &'static str,
    parent: &'static str,
}

const FOREIGN_KEY_CHECKS: [ForeignKeyCheck; 9] = [
    ForeignKeyCheck {
        table: tables::MEMORIES_NEW,
        column: "category_id",
        parent: tables::CATEGORIES,
    },
    ForeignKeyCheck {
        table: tables::MEMORIES_NEW,
        column: "project_id",
        parent: tables::PROJECTS,
    },
    ForeignKeyCheck {
        table: tables::TASKS_NEW,
        column: "status_id",
        parent: tables::STATUSES,
    },
    ForeignKeyCheck {
        table: tables::TASKS_NEW,
        column: "category_id",
        parent: tables::CATEGORIES,
    },
    ForeignKeyCheck {
        table: tables::TASKS_NEW,
        column: "project_id",
        parent: tables::PROJECTS,
    },
    ForeignKeyCheck {
        table: tables::MEMORY_TAGS_NEW,
        column: "memory_id",
        parent: tables::MEMORIES_NEW,
    },
    ForeignKeyCheck {
        table: tables::MEMORY_TAGS_NEW,
        column: "tag_id",
        parent: tables::TAGS,
    },
    ForeignKeyCheck {
        table: tables::TASK_TAGS_NEW,
        column: "task_id",
        parent: tables::TASKS_NEW,
    },
    ForeignKeyCheck {
        table: tables::TASK_TAGS_NEW,
        column: "tag_id",
        parent: tables::TAGS,
    },
];

fn dangling_count(conn: &Connection, check: &ForeignKeyCheck) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {table} c
         WHERE c.{column} IS NOT NULL
         AND NOT EXISTS (SELECT 1 FROM {parent} p WHERE p.id = c.{column})",
        table = quote_ident(check.table),
        column = check.column,
        parent = quote_ident(check.parent),
    );
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

/// Junction rows a legacy table should produce: one per distinct tag per row.
fn expected_links(conn: &Connection, legacy: &str) -> Result<i64> {
    let mut stmt = conn.prepare(&format!(
        "SELECT CAST(tags AS TEXT) FROM {} WHERE tags IS NOT NULL",
        quote_ident(legacy)
    ))?;
    let mut expected = 0i64;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    for row in rows {
        expected += parse_tags(Some(&row?)).len() as i64;
    }
    Ok(expected)
}

/// Rows reported by `PRAGMA foreign_key_check` for one table.
fn engine_fk_violations(conn: &Connection, table: &str) -> Result<i64> {
    let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_check({})", quote_ident(table)))?;
    let mut rows = stmt.query([])?;
    let mut count = 0;
    while rows.next()?.is_some() {
        count += 1;
    }
    Ok(count)
}

/// Compares row counts and foreign-key integrity. Any problem aborts the run
/// before cutover.
pub struct Validator;

impl Validator {
    /// Collect every problem instead of stopping at the first one.
    pub fn check(conn: &Connection) -> Result<(ValidationSummary, Vec<String>)> {
        let mut problems = Vec::new();
        let summary = ValidationSummary {
            legacy_memories: row_count(conn, tables::MEMORIES)?,
            memories: row_count(conn, tables::MEMORIES_NEW)?,
            legacy_tasks: row_count(conn, tables::TASKS)?,
            tasks: row_count(conn, tables::TASKS_NEW)?,
            memory_tags: row_count(conn, tables::MEMORY_TAGS_NEW)?,
            task_tags: row_count(conn, tables::TASK_TAGS_NEW)?,
        };

        if summary.legacy_memories != summary.memories {
            problems.push(format!(
                "memory count mismatch: {} legacy vs {} migrated",
                summary.legacy_memories, summary.memories
            ));
        }
        if summary.legacy_tasks != summary.tasks {
            problems.push(format!(
                "task count mismatch: {} legacy vs {} migrated",
                summary.legacy_tasks, summary.tasks
            ));
        }

        for check in &FOREIGN_KEY_CHECKS {
            let dangling = dangling_count(conn, check)?;
            if dangling > 0 {
                problems.push(format!(
                    "{} row(s) in {}.{} reference a missing {} row",
                    dangling, check.table, check.column, check.parent
                ));
            }
        }

        let missing_status: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks_new WHERE status_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        if missing_status > 0 {
            problems.push(format!("{missing_status} task(s) have no status"));
        }

        for (legacy, actual, junction) in [
            (tables::MEMORIES, summary.memory_tags, tables::MEMORY_TAGS_NEW),
            (tables::TASKS, summary.task_tags, tables::TASK_TAGS_NEW),
        ] {
            let expected = expected_links(conn, legacy)?;
            if expected != actual {
                problems.push(format!(
                    "{junction} has {actual} row(s), expected {expected} from {legacy}.tags"
                ));
            }
        }

        for table in tables::STAGING {
            let violations = engine_fk_violations(conn, table)?;
            if violations > 0 {
                problems.push(format!("{violations} foreign key violation(s) in {table}"));
            }
        }

        Ok((summary, problems))
    }
}

impl Phase for Validator {
    fn state(&self) -> MigrationState {
        MigrationState::Validating
    }

    fn run(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let (summary, problems) = Self::check(ctx.conn())?;
        if !problems.is_empty() {
            for problem in &problems {
                error!(problem = %problem, "Validation problem");
            }
            return Err(ValidationFailure::new(problems).into());
        }

        info!(
            memories = summary.memories,
            tasks = summary.tasks,
            memory_tags = summary.memory_tags,
            task_tags = summary.task_tags,
            "Validation passed"
        );
        ctx.report_mut().validation = Some(summary);
        Ok(())
    }
}
