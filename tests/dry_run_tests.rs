//! Dry runs never touch the source file.

mod common;

use common::LegacyDb;
use memtask_migrate::format::format_dry_run_markdown;
use memtask_migrate::migration::MigrationOptions;
use memtask_migrate::tester::MigrationTester;

#[test]
fn dry_run_passes_and_leaves_source_untouched() {
    let db = LegacyDb::scenario();
    let before = std::fs::read(&db.path).unwrap();

    let report = MigrationTester::new(&db.path, MigrationOptions::default())
        .run()
        .expect("dry run");

    assert!(report.passed, "failures: {:?}", report.failures);
    assert!(report.tables.values().all(|present| *present));
    assert_eq!(report.tables.len(), 8);
    assert_eq!(report.legacy_backups.get("memories_old"), Some(&true));
    assert_eq!(report.legacy_backups.get("tasks_old"), Some(&true));
    assert_eq!(report.row_counts["memories"], 3);
    assert_eq!(report.row_counts["tasks_old"], 2);
    assert_eq!(report.samples["memories"]["id"], 1);
    assert!(report.samples["tasks"].get("status_id").is_some());

    let migration = report.migration.as_ref().expect("migration report");
    assert_eq!(migration.memories_migrated, 3);

    assert_eq!(std::fs::read(&db.path).unwrap(), before);
    // Backups go to the scratch copy, never next to the source.
    let siblings = std::fs::read_dir(db.dir.path()).unwrap().count();
    assert_eq!(siblings, 1);

    let md = format_dry_run_markdown(&report);
    assert!(md.starts_with("# Dry run PASSED"));
    assert!(md.contains("- [x] memory_tags"));
}

#[test]
fn dry_run_reports_failure_on_migrated_source() {
    let db = LegacyDb::scenario();
    let mut options = MigrationOptions::default();
    options.backup_dir = Some(db.backup_dir());
    memtask_migrate::migration::MigrationOrchestrator::new(&db.path, options)
        .run()
        .expect("real migration");

    let report = MigrationTester::new(&db.path, MigrationOptions::default())
        .run()
        .expect("dry run harness");

    assert!(!report.passed);
    assert!(report.migration.is_none());
    assert!(report.failures[0].contains("precondition failed"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["passed"], false);
}
