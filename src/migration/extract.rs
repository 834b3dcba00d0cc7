//! Derives reference rows from legacy free-text columns.

use super::seed::upsert_by_name;
use super::{ExtractCounts, MigrationContext, MigrationState, Phase};
use crate::types::{ReferenceTable, tables};
use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Description stored on reference rows created from legacy values.
pub const MIGRATED_DESCRIPTION: &str = "Auto-created from legacy data during migration";

/// Trim and lowercase a free-text value. Blank values become `None`.
pub fn normalize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Split a comma-separated tag string into normalized, de-duplicated names,
/// keeping first-seen order.
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut tags = Vec::new();
    for part in raw.unwrap_or("").split(',') {
        if let Some(tag) = normalize_name(part) {
            if seen.insert(tag.clone()) {
                tags.push(tag);
            }
        }
    }
    tags
}

/// Name-to-id maps for every reference table.
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    pub categories: HashMap<String, i64>,
    pub projects: HashMap<String, i64>,
    pub statuses: HashMap<String, i64>,
    pub tags: HashMap<String, i64>,
}

impl Lookups {
    pub fn load(conn: &Connection) -> Result<Self> {
        Ok(Self {
            categories: load_names(conn, tables::CATEGORIES)?,
            projects: load_names(conn, tables::PROJECTS)?,
            statuses: load_names(conn, tables::STATUSES)?,
            tags: load_names(conn, tables::TAGS)?,
        })
    }

    /// Resolve a legacy category. Blank text resolves to `None`.
    pub fn category_id(&self, raw: Option<&str>) -> Result<Option<i64>> {
        resolve(&self.categories, "category", raw)
    }

    /// Resolve a legacy project. Blank text resolves to `None`.
    pub fn project_id(&self, raw: Option<&str>) -> Result<Option<i64>> {
        resolve(&self.projects, "project", raw)
    }

    /// Resolve an already normalized tag name.
    pub fn tag_id(&self, name: &str) -> Result<i64> {
        self.tags
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("no tag row for '{}'", name))
    }
}

fn resolve(map: &HashMap<String, i64>, kind: &str, raw: Option<&str>) -> Result<Option<i64>> {
    let Some(name) = raw.and_then(normalize_name) else {
        return Ok(None);
    };
    map.get(&name)
        .copied()
        .map(Some)
        .ok_or_else(|| anyhow!("no {} row for legacy value '{}'", kind, name))
}

fn load_names(conn: &Connection, table: &str) -> Result<HashMap<String, i64>> {
    let mut stmt = conn.prepare(&format!("SELECT name, id FROM {table}"))?;
    let map = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(map)
}

/// Collect the raw text of one column across several legacy tables.
fn collect_text(conn: &Connection, sources: &[(&str, &str)]) -> Result<Vec<String>> {
    let mut values = Vec::new();
    for (table, column) in sources {
        let mut stmt = conn.prepare(&format!(
            "SELECT CAST({column} AS TEXT) FROM {table} WHERE {column} IS NOT NULL"
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for row in rows {
            values.push(row?);
        }
    }
    Ok(values)
}

/// Distinct normalized names from single-valued columns.
pub fn distinct_names(values: &[String]) -> BTreeSet<String> {
    values.iter().filter_map(|v| normalize_name(v)).collect()
}

/// Distinct normalized tags from comma-separated columns.
pub fn distinct_tags(values: &[String]) -> BTreeSet<String> {
    values
        .iter()
        .flat_map(|v| parse_tags(Some(v)))
        .collect()
}

fn insert_missing(
    conn: &Connection,
    table: ReferenceTable,
    names: &BTreeSet<String>,
) -> Result<usize> {
    let mut inserted = 0;
    for name in names {
        if upsert_by_name(conn, table, name, Some(MIGRATED_DESCRIPTION))? {
            debug!(table = table.table_name(), name = %name, "Created reference row");
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Inserts every distinct category, project and tag found in legacy rows.
pub struct DataExtractor;

impl DataExtractor {
    pub fn extract(conn: &Connection) -> Result<ExtractCounts> {
        let categories = distinct_names(&collect_text(
            conn,
            &[(tables::MEMORIES, "category"), (tables::TASKS, "category")],
        )?);
        let projects = distinct_names(&collect_text(conn, &[(tables::TASKS, "project")])?);
        let tags = distinct_tags(&collect_text(
            conn,
            &[(tables::MEMORIES, "tags"), (tables::TASKS, "tags")],
        )?);

        Ok(ExtractCounts {
            categories: insert_missing(conn, ReferenceTable::Categories, &categories)?,
            projects: insert_missing(conn, ReferenceTable::Projects, &projects)?,
            tags: insert_missing(conn, ReferenceTable::Tags, &tags)?,
        })
    }
}

impl Phase for DataExtractor {
    fn state(&self) -> MigrationState {
        MigrationState::Extracting
    }

    fn run(&self, ctx: &mut MigrationContext<'_>) -> Result<()> {
        let tx = ctx.conn().transaction()?;
        let counts = Self::extract(&tx).context("Failed to extract reference values")?;
        tx.commit()?;

        info!(
            categories = counts.categories,
            projects = counts.projects,
            tags = counts.tags,
            "Extracted reference values from legacy columns"
        );
        ctx.report_mut().extracted = counts;
        ctx.refresh_lookups()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{ReferenceSeeder, SchemaBuilder};

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Work "), Some("work".to_string()));
        assert_eq!(normalize_name("   "), None);
        assert_eq!(normalize_name(""), None);
    }

    #[test]
    fn test_parse_tags_dedupes_and_normalizes() {
        assert_eq!(parse_tags(Some("urgent, Review")), vec!["urgent", "review"]);
        assert_eq!(parse_tags(Some("a,A, a ,,b")), vec!["a", "b"]);
        assert!(parse_tags(Some(" , ,")).is_empty());
        assert!(parse_tags(None).is_empty());
    }

    #[test]
    fn test_distinct_names_folds_case_and_whitespace() {
        let values = vec!["Work".to_string(), "work ".to_string(), "".to_string()];
        let names = distinct_names(&values);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["work"]);
    }

    fn legacy_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE memories (id INTEGER PRIMARY KEY, title TEXT, content TEXT, category TEXT,
                 tags TEXT, priority INTEGER, created_at TEXT, updated_at TEXT);
             CREATE TABLE tasks (id INTEGER PRIMARY KEY, title TEXT, description TEXT, status TEXT,
                 category TEXT, project TEXT, tags TEXT, priority INTEGER, due_date TEXT,
                 created_at TEXT, updated_at TEXT, completed_at TEXT, archived INTEGER);
             INSERT INTO memories (id, category, tags) VALUES
                 (1, 'Recipes', 'food, Dinner'), (2, ' recipes', 'food');
             INSERT INTO tasks (id, status, category, project, tags) VALUES
                 (1, 'todo', 'Work', 'Apollo ', 'dinner, launch'), (2, 'done', NULL, '', NULL);",
        )
        .unwrap();
        SchemaBuilder::create_reference_tables(&conn).unwrap();
        ReferenceSeeder::seed(&conn).unwrap();
        conn
    }

    #[test]
    fn test_extract_inserts_only_new_values() {
        let conn = legacy_conn();
        let counts = DataExtractor::extract(&conn).unwrap();

        // "work" is already seeded; "recipes" is new.
        assert_eq!(counts.categories, 1);
        assert_eq!(counts.projects, 1);
        assert_eq!(counts.tags, 3);

        let lookups = Lookups::load(&conn).unwrap();
        assert!(lookups.categories.contains_key("recipes"));
        assert!(lookups.projects.contains_key("apollo"));
        for tag in ["food", "dinner", "launch"] {
            assert!(lookups.tags.contains_key(tag), "missing tag {tag}");
        }

        let again = DataExtractor::extract(&conn).unwrap();
        assert_eq!(again, ExtractCounts::default());
    }

    #[test]
    fn test_lookups_resolve_blank_to_none() {
        let conn = legacy_conn();
        DataExtractor::extract(&conn).unwrap();
        let lookups = Lookups::load(&conn).unwrap();

        assert_eq!(lookups.category_id(None).unwrap(), None);
        assert_eq!(lookups.category_id(Some("  ")).unwrap(), None);
        assert!(lookups.category_id(Some(" RECIPES")).unwrap().is_some());
        assert!(lookups.project_id(Some("unknown")).is_err());
    }
}
