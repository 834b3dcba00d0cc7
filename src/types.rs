//! Core types shared by the migration phases.

use rusqlite::Row;
use rusqlite::types::Value;
use serde::Serialize;

/// Table names for both layouts.
pub mod tables {
    pub const MEMORIES: &str = "memories";
    pub const TASKS: &str = "tasks";

    pub const MEMORIES_NEW: &str = "memories_new";
    pub const TASKS_NEW: &str = "tasks_new";
    pub const MEMORY_TAGS_NEW: &str = "memory_tags_new";
    pub const TASK_TAGS_NEW: &str = "task_tags_new";

    pub const MEMORIES_OLD: &str = "memories_old";
    pub const TASKS_OLD: &str = "tasks_old";

    pub const MEMORY_TAGS: &str = "memory_tags";
    pub const TASK_TAGS: &str = "task_tags";

    pub const CATEGORIES: &str = "categories";
    pub const PROJECTS: &str = "projects";
    pub const STATUSES: &str = "statuses";
    pub const TAGS: &str = "tags";

    /// Temporary tables populated during a run, promoted at cutover.
    pub const STAGING: [&str; 4] = [MEMORIES_NEW, TASKS_NEW, MEMORY_TAGS_NEW, TASK_TAGS_NEW];

    /// Tables that exist only once a migration has completed.
    pub const MIGRATED_MARKERS: [&str; 4] = [MEMORIES_OLD, TASKS_OLD, MEMORY_TAGS, TASK_TAGS];

    /// Live tables after cutover.
    pub const NORMALIZED: [&str; 8] = [
        CATEGORIES,
        PROJECTS,
        STATUSES,
        TAGS,
        MEMORIES,
        TASKS,
        MEMORY_TAGS,
        TASK_TAGS,
    ];
}

/// Name-keyed reference tables that accept free-text values from legacy rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTable {
    Categories,
    Projects,
    Tags,
}

impl ReferenceTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            ReferenceTable::Categories => tables::CATEGORIES,
            ReferenceTable::Projects => tables::PROJECTS,
            ReferenceTable::Tags => tables::TAGS,
        }
    }

    /// Tags carry only a name.
    pub fn has_description(&self) -> bool {
        !matches!(self, ReferenceTable::Tags)
    }
}

/// Legacy memory row. Columns that are copied verbatim stay as raw SQLite values.
#[derive(Debug, Clone)]
pub struct LegacyMemory {
    pub id: Value,
    pub title: Value,
    pub content: Value,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub priority: Value,
    pub created_at: Value,
    pub updated_at: Value,
}

impl LegacyMemory {
    pub const COLUMNS: [&'static str; 8] = [
        "id",
        "title",
        "content",
        "category",
        "tags",
        "priority",
        "created_at",
        "updated_at",
    ];

    pub const SELECT: &'static str = "SELECT id, title, content, CAST(category AS TEXT),
                CAST(tags AS TEXT), priority, created_at, updated_at
         FROM memories";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            category: row.get(3)?,
            tags: row.get(4)?,
            priority: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

/// Legacy task row.
#[derive(Debug, Clone)]
pub struct LegacyTask {
    pub id: Value,
    pub title: Value,
    pub description: Value,
    pub status: Option<String>,
    pub category: Option<String>,
    pub project: Option<String>,
    pub tags: Option<String>,
    pub priority: Value,
    pub due_date: Value,
    pub created_at: Value,
    pub updated_at: Value,
    pub completed_at: Value,
    pub archived: Value,
}

impl LegacyTask {
    pub const COLUMNS: [&'static str; 13] = [
        "id",
        "title",
        "description",
        "status",
        "category",
        "project",
        "tags",
        "priority",
        "due_date",
        "created_at",
        "updated_at",
        "completed_at",
        "archived",
    ];

    pub const SELECT: &'static str = "SELECT id, title, description, CAST(status AS TEXT),
                CAST(category AS TEXT), CAST(project AS TEXT), CAST(tags AS TEXT),
                priority, due_date, created_at, updated_at, completed_at, archived
         FROM tasks";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            category: row.get(4)?,
            project: row.get(5)?,
            tags: row.get(6)?,
            priority: row.get(7)?,
            due_date: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            completed_at: row.get(11)?,
            archived: row.get(12)?,
        })
    }
}

/// A canonical task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusDef {
    pub name: &'static str,
    pub description: &'static str,
    pub is_completed: bool,
    pub sort_order: i64,
}

/// The five canonical statuses, in display order.
pub const CANONICAL_STATUSES: [StatusDef; 5] = [
    StatusDef {
        name: "not_started",
        description: "Task has not been started",
        is_completed: false,
        sort_order: 0,
    },
    StatusDef {
        name: "in_progress",
        description: "Task is being worked on",
        is_completed: false,
        sort_order: 1,
    },
    StatusDef {
        name: "on_hold",
        description: "Task is paused or blocked",
        is_completed: false,
        sort_order: 2,
    },
    StatusDef {
        name: "completed",
        description: "Task is done",
        is_completed: true,
        sort_order: 3,
    },
    StatusDef {
        name: "cancelled",
        description: "Task was abandoned",
        is_completed: true,
        sort_order: 4,
    },
];

/// Convert a raw SQLite value to JSON for reports.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(f) => serde_json::Value::from(*f),
        Value::Text(s) => serde_json::Value::from(s.as_str()),
        Value::Blob(b) => serde_json::Value::from(format!("<blob {} bytes>", b.len())),
    }
}
