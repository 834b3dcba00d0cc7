//! Canonical starter catalog of categories, projects and statuses.

use super::{MigrationContext, MigrationState, Phase, SeedCounts};
use crate::types::{CANONICAL_STATUSES, ReferenceTable, StatusDef};
use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use tracing::info;

/// Default categories: (name, description).
pub const DEFAULT_CATEGORIES: [(&str, &str); 5] = [
    ("general", "General notes and tasks"),
    ("work", "Work-related items"),
    ("personal", "Personal items"),
    ("learning", "Study notes and research"),
    ("ideas", "Ideas and brainstorming"),
];

/// Default projects: (name, description, color).
pub const DEFAULT_PROJECTS: [(&str, &str, &str); 2] = [
    ("general", "Items not tied to a specific project", "#6b7280"),
    ("inbox", "Items awaiting triage", "#3b82f6"),
];

/// Insert a name-keyed reference row unless the name already exists.
///
/// Returns true when a row was inserted.
pub fn upsert_by_name(
    conn: &Connection,
    table: ReferenceTable,
    name: &str,
    description: Option<&str>,
) -> Result<bool> {
    let changed = if table.has_description() {
        conn.execute(
            &format!(
                "INSERT INTO {} (name, description) VALUES (?1, ?2)
                 ON CONFLICT(name) DO NOTHING",
                table.table_name()
            ),
            params![name, description],
        )?
    } else {
        conn.execute(
            &format!(
                "INSERT INTO {} (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
                table.table_name()
            ),
            params![name],
        )?
    };
    Ok(changed > 0)
}

fn upsert_project(conn: &Connection, name: &str, description: &str, color: &str) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO projects (name, description, color) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO NOTHING",
        params![name, description, color],
    )?;
    Ok(changed > 0)
}

fn upsert_status(conn: &Connection, status: &StatusDef) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO statuses (name, description, is_completed, sort_order)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(name) DO NOTHING",
        params![
            status.name,
            status.description,
            status.is_completed,
            status.sort_order
        ],
    )?;
    Ok(changed > 0)
}

/// Seeds the default catalog. Rows whose name already exists are left alone.
pub struct ReferenceSeeder;

impl ReferenceSeeder {
    pub fn seed(conn: &Connection) -> Result<SeedCounts> {
        let mut counts = SeedCounts::default();

        for (name, description) in DEFAULT_CATEGORIES {
            if upsert_by_name(conn, ReferenceTable::Categories, name, Some(description))? {
                counts.categories += 1;
            }
        }

        for (name, description, color) in DEFAULT_PROJECTS {
            if upsert_project(conn, name, description, color)? {
                counts.projects += 1;
            }
        }

        for status in &CANONICAL_STATUSES {
            if upsert_status(conn, status)? {
                counts.statuses += 1;
            }
        }

        Ok(counts)
    }
}

impl Phase for ReferenceSeeder {
    fn state(&self) -> MigrationState {
        MigrationState::Seeding
    }

    fn run(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let tx = ctx.conn().transaction()?;
        let counts = Self::seed(&tx).context("Failed to seed reference data")?;
        tx.commit()?;

        info!(
            categories = counts.categories,
            projects = counts.projects,
            statuses = counts.statuses,
            "Seeded reference data"
        );
        ctx.report_mut().seeded = counts;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::row_count;
    use crate::migration::SchemaBuilder;

    fn reference_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        SchemaBuilder::create_reference_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_seed_inserts_catalog() {
        let conn = reference_conn();
        let counts = ReferenceSeeder::seed(&conn).unwrap();

        assert_eq!(counts.categories, DEFAULT_CATEGORIES.len());
        assert_eq!(counts.projects, DEFAULT_PROJECTS.len());
        assert_eq!(counts.statuses, 5);

        let (done, order): (bool, i64) = conn
            .query_row(
                "SELECT is_completed, sort_order FROM statuses WHERE name = 'completed'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!(done);
        assert_eq!(order, 3);
    }

    #[test]
    fn test_seed_twice_adds_nothing() {
        let conn = reference_conn();
        ReferenceSeeder::seed(&conn).unwrap();
        let second = ReferenceSeeder::seed(&conn).unwrap();

        assert_eq!(second, SeedCounts::default());
        assert_eq!(row_count(&conn, "categories").unwrap(), 5);
        assert_eq!(row_count(&conn, "projects").unwrap(), 2);
        assert_eq!(row_count(&conn, "statuses").unwrap(), 5);
    }

    #[test]
    fn test_upsert_keeps_existing_description() {
        let conn = reference_conn();
        assert!(upsert_by_name(&conn, ReferenceTable::Categories, "work", Some("mine")).unwrap());
        assert!(!upsert_by_name(&conn, ReferenceTable::Categories, "work", Some("other")).unwrap());

        let description: String = conn
            .query_row(
                "SELECT description FROM categories WHERE name = 'work'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(description, "mine");
    }

    #[test]
    fn test_upsert_tag_without_description() {
        let conn = reference_conn();
        assert!(upsert_by_name(&conn, ReferenceTable::Tags, "urgent", None).unwrap());
        assert!(!upsert_by_name(&conn, ReferenceTable::Tags, "urgent", None).unwrap());
    }
}
