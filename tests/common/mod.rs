//! Shared fixtures: legacy databases built with plain SQL.

#![allow(dead_code)]

use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

pub const LEGACY_SCHEMA: &str = "
CREATE TABLE memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    content TEXT,
    category TEXT,
    tags TEXT,
    priority INTEGER DEFAULT 0,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT DEFAULT 'todo',
    category TEXT,
    project TEXT,
    tags TEXT,
    priority INTEGER DEFAULT 0,
    due_date DATE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    completed_at TIMESTAMP,
    archived BOOLEAN DEFAULT 0
);
";

/// Rows for the end-to-end scenario.
pub const SCENARIO_ROWS: &str = "
INSERT INTO memories (id, title, content, category, tags, priority, created_at, updated_at) VALUES
    (1, 'Standup notes', 'shipped the importer', 'Work', NULL, 2,
     '2024-01-02 09:00:00', '2024-01-02 09:30:00'),
    (2, 'Retro', 'more tests', 'work ', NULL, 1, '2024-01-03 10:00:00', '2024-01-03 10:00:00'),
    (5, 'Loose thought', NULL, '', NULL, 0, '2024-01-04 11:00:00', '2024-01-05 08:15:00');
INSERT INTO tasks (id, title, description, status, category, project, tags, priority, due_date,
                   created_at, updated_at, completed_at, archived) VALUES
    (3, 'Write migration', 'normalize schema', 'todo', 'Work', 'Apollo', 'urgent, Review', 3,
     '2024-02-01', '2024-01-06 12:00:00', '2024-01-06 12:00:00', NULL, 0),
    (7, 'Review PR', NULL, 'in_progress', NULL, NULL, NULL, 1,
     NULL, '2024-01-07 13:00:00', '2024-01-08 14:00:00', NULL, 1);
";

/// A legacy database file inside its own temp dir.
pub struct LegacyDb {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl LegacyDb {
    pub fn with_rows(rows: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("memory.db");
        let conn = Connection::open(&path).expect("open fixture");
        conn.execute_batch(LEGACY_SCHEMA).expect("legacy schema");
        conn.execute_batch(rows).expect("fixture rows");
        drop(conn);
        Self { dir, path }
    }

    pub fn scenario() -> Self {
        Self::with_rows(SCENARIO_ROWS)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    pub fn conn(&self) -> Connection {
        Connection::open(&self.path).expect("open migrated db")
    }
}

pub fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).expect(sql)
}

pub fn names(conn: &Connection, sql: &str) -> Vec<String> {
    let mut stmt = conn.prepare(sql).expect(sql);
    stmt.query_map([], |row| row.get(0))
        .expect(sql)
        .collect::<Result<Vec<String>, _>>()
        .expect(sql)
}

