//! Materializes junction rows from legacy comma-separated tag strings.

use super::extract::{Lookups, parse_tags};
use super::{MigrationContext, MigrationState, Phase};
use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, params};
use tracing::info;

/// One owning entity kind and its tag junction.
struct TagSource {
    select: &'static str,
    insert: &'static str,
    kind: &'static str,
}

const MEMORY_TAGS: TagSource = TagSource {
    select: "SELECT id, CAST(tags AS TEXT) FROM memories WHERE tags IS NOT NULL",
    insert: "INSERT OR IGNORE INTO memory_tags_new (memory_id, tag_id) VALUES (?1, ?2)",
    kind: "memory",
};

const TASK_TAGS: TagSource = TagSource {
    select: "SELECT id, CAST(tags AS TEXT) FROM tasks WHERE tags IS NOT NULL",
    insert: "INSERT OR IGNORE INTO task_tags_new (task_id, tag_id) VALUES (?1, ?2)",
    kind: "task",
};

fn link_tags(conn: &Connection, lookups: &Lookups, source: &TagSource) -> Result<usize> {
    let mut select = conn.prepare(source.select)?;
    let mut insert = conn.prepare(source.insert)?;

    let mut linked = 0;
    let rows = select.query_map([], |row| {
        Ok((row.get::<_, Value>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (id, tags) = row?;
        for tag in parse_tags(Some(&tags)) {
            let tag_id = lookups
                .tag_id(&tag)
                .with_context(|| format!("{} {:?}", source.kind, id))?;
            linked += insert
                .execute(params![id, tag_id])
                .with_context(|| {
                    format!("Failed to link {} {:?} to tag '{}'", source.kind, id, tag)
                })?;
        }
    }
    Ok(linked)
}

/// Builds `memory_tags_new` and `task_tags_new`. Existing pairs are skipped.
pub struct RelationshipBuilder;

impl RelationshipBuilder {
    /// Returns (memory links, task links) inserted.
    pub fn build(conn: &Connection, lookups: &Lookups) -> Result<(usize, usize)> {
        let memory_links = link_tags(conn, lookups, &MEMORY_TAGS)?;
        let task_links = link_tags(conn, lookups, &TASK_TAGS)?;
        Ok((memory_links, task_links))
    }
}

impl Phase for RelationshipBuilder {
    fn state(&self) -> MigrationState {
        MigrationState::BuildingRelationships
    }

    fn run(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let (conn, _, lookups, report) = ctx.parts()?;
        let tx = conn.transaction()?;
        let (memory_tags, task_tags) = Self::build(&tx, lookups)?;
        tx.commit()?;

        info!(memory_tags, task_tags, "Built tag relationships");
        report.memory_tags = memory_tags;
        report.task_tags = task_tags;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{
        DataExtractor, LegacyLayout, ReferenceSeeder, RowMigrator, SchemaBuilder,
    };

    fn migrated_conn() -> (Connection, Lookups) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys=ON;
             CREATE TABLE memories (id INTEGER PRIMARY KEY, title TEXT, content TEXT, category TEXT,
                 tags TEXT, priority INTEGER, created_at TEXT, updated_at TEXT);
             CREATE TABLE tasks (id INTEGER PRIMARY KEY, title TEXT, description TEXT, status TEXT,
                 category TEXT, project TEXT, tags TEXT, priority INTEGER, due_date TEXT,
                 created_at TEXT, updated_at TEXT, completed_at TEXT, archived INTEGER);
             INSERT INTO memories (id, tags) VALUES (1, 'rust, Sqlite, rust'), (2, ''), (3, NULL);
             INSERT INTO tasks (id, status, tags) VALUES (10, 'todo', 'urgent, Review');",
        )
        .unwrap();
        let layout = LegacyLayout::inspect(&conn).unwrap();
        SchemaBuilder::create_reference_tables(&conn).unwrap();
        SchemaBuilder::create_staging_tables(&conn, &layout).unwrap();
        ReferenceSeeder::seed(&conn).unwrap();
        DataExtractor::extract(&conn).unwrap();
        let lookups = Lookups::load(&conn).unwrap();
        RowMigrator::migrate_memories(&conn, &lookups).unwrap();
        RowMigrator::migrate_tasks(&conn, &lookups, "not_started").unwrap();
        (conn, lookups)
    }

    fn tags_of(conn: &Connection, sql: &str, id: i64) -> Vec<String> {
        let mut stmt = conn.prepare(sql).unwrap();
        let mut names: Vec<String> = stmt
            .query_map([id], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        names.sort();
        names
    }

    #[test]
    fn test_build_links_each_distinct_tag_once() {
        let (conn, lookups) = migrated_conn();
        let (memory_links, task_links) = RelationshipBuilder::build(&conn, &lookups).unwrap();

        assert_eq!(memory_links, 2);
        assert_eq!(task_links, 2);

        let memory_sql = "SELECT t.name FROM memory_tags_new mt JOIN tags t ON t.id = mt.tag_id
                          WHERE mt.memory_id = ?1";
        assert_eq!(tags_of(&conn, memory_sql, 1), vec!["rust", "sqlite"]);

        let task_sql = "SELECT t.name FROM task_tags_new tt JOIN tags t ON t.id = tt.tag_id
                        WHERE tt.task_id = ?1";
        assert_eq!(tags_of(&conn, task_sql, 10), vec!["review", "urgent"]);
    }

    #[test]
    fn test_build_is_duplicate_safe() {
        let (conn, lookups) = migrated_conn();
        RelationshipBuilder::build(&conn, &lookups).unwrap();
        let again = RelationshipBuilder::build(&conn, &lookups).unwrap();
        assert_eq!(again, (0, 0));
    }

    #[test]
    fn test_missing_tag_row_is_an_error() {
        let (conn, _) = migrated_conn();
        let empty = Lookups::default();
        assert!(RelationshipBuilder::build(&conn, &empty).is_err());
    }
}
