//! Run command: migrate the configured database in place.

use super::confirm_on_terminal;
use crate::config::Config;
use crate::error::MigrationError;
use crate::format::{OutputFormat, format_migration_report_markdown};
use crate::migration::{MigrationOptions, MigrationOrchestrator};
use anyhow::Result;
use clap::Args;

/// Arguments for the run command.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Migrate without prompting for confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Markdown)]
    pub format: OutputFormat,
}

/// Run the migration command.
/// Returns the process exit status.
pub fn run_migrate(config: &Config, args: &RunArgs) -> Result<u8> {
    let db_path = &config.database.path;
    let options = MigrationOptions::from(config);

    if !args.yes {
        println!("Migration plan:");
        println!("  Database: {}", db_path.display());
        match &options.backup_dir {
            Some(dir) => println!("  Backups:  {}", dir.display()),
            None => println!("  Backups:  next to the database"),
        }
        println!();
        if !confirm_on_terminal("This rewrites the database schema in place. Continue?")? {
            println!("Migration cancelled.");
            return Ok(0);
        }
    }

    let mut orchestrator = MigrationOrchestrator::new(db_path, options);
    match orchestrator.run() {
        Ok(report) => {
            match args.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Markdown => print!("{}", format_migration_report_markdown(&report)),
            }
            Ok(0)
        }
        Err(err) => {
            eprintln!("Migration failed: {}", err);
            match &err {
                MigrationError::RollbackFailed { backup, .. } => {
                    eprintln!(
                        "Restore manually with: memtask-migrate restore --backup {}",
                        backup.display()
                    );
                }
                MigrationError::Precondition { .. } => {}
                _ => eprintln!("The database was restored from its backup."),
            }
            Ok(err.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn legacy_config(temp: &TempDir) -> Config {
        let path = temp.path().join("memory.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE memories (id INTEGER PRIMARY KEY, title TEXT, content TEXT, category TEXT,
                 tags TEXT, priority INTEGER, created_at TEXT, updated_at TEXT);
             CREATE TABLE tasks (id INTEGER PRIMARY KEY, title TEXT, description TEXT, status TEXT,
                 category TEXT, project TEXT, tags TEXT, priority INTEGER, due_date TEXT,
                 created_at TEXT, updated_at TEXT, completed_at TEXT, archived INTEGER);
             INSERT INTO memories (title, category, tags) VALUES ('m', 'Work', 'a');
             INSERT INTO tasks (title, status) VALUES ('t', 'todo');",
        )
        .unwrap();
        drop(conn);

        let mut config = Config::default();
        config.database.path = path;
        config.backup.directory = Some(temp.path().join("backups"));
        config
    }

    #[test]
    fn test_run_with_yes_migrates() {
        let temp = TempDir::new().unwrap();
        let config = legacy_config(&temp);
        let args = RunArgs {
            yes: true,
            format: OutputFormat::Json,
        };

        let code = run_migrate(&config, &args).unwrap();
        assert_eq!(code, 0);

        let conn = Connection::open(&config.database.path).unwrap();
        let old: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories_old", [], |row| row.get(0))
            .unwrap();
        assert_eq!(old, 1);
    }

    #[test]
    fn test_second_run_is_a_precondition_failure() {
        let temp = TempDir::new().unwrap();
        let config = legacy_config(&temp);
        let args = RunArgs {
            yes: true,
            format: OutputFormat::Json,
        };

        run_migrate(&config, &args).unwrap();
        let code = run_migrate(&config, &args).unwrap();
        assert_eq!(code, 2);
    }
}
