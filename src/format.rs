//! Output formatting utilities for markdown and JSON.

use crate::migration::MigrationReport;
use crate::tester::DryRunReport;
use clap::ValueEnum;
use std::collections::BTreeMap;

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    Json,
    #[default]
    Markdown,
}

/// Format a completed migration as markdown.
pub fn format_migration_report_markdown(report: &MigrationReport) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Migration {}\n\n", report.final_state));
    md.push_str(&format!("- **memories**: {}\n", report.memories_migrated));
    md.push_str(&format!("- **tasks**: {}\n", report.tasks_migrated));
    md.push_str(&format!("- **memory_tags**: {}\n", report.memory_tags));
    md.push_str(&format!("- **task_tags**: {}\n", report.task_tags));
    md.push_str(&format!(
        "- **seeded**: {} categories, {} projects, {} statuses\n",
        report.seeded.categories, report.seeded.projects, report.seeded.statuses
    ));
    md.push_str(&format!(
        "- **extracted**: {} categories, {} projects, {} tags\n",
        report.extracted.categories, report.extracted.projects, report.extracted.tags
    ));

    if let Some(ref backup) = report.backup_path {
        md.push_str(&format!("- **backup**: `{}`\n", backup.display()));
    }

    if !report.status_fallbacks.is_empty() {
        md.push_str(&format!(
            "\n## Status fallbacks ({})\n\n",
            report.status_fallbacks.len()
        ));
        for fallback in &report.status_fallbacks {
            md.push_str(&format!(
                "- task `{}`: '{}' -> {}\n",
                fallback.task_id, fallback.legacy_status, fallback.assigned
            ));
        }
    }

    md
}

fn push_presence(md: &mut String, title: &str, tables: &BTreeMap<String, bool>) {
    md.push_str(&format!("\n## {}\n\n", title));
    for (table, present) in tables {
        let mark = if *present { "x" } else { " " };
        md.push_str(&format!("- [{}] {}\n", mark, table));
    }
}

/// Format a dry-run report as markdown.
pub fn format_dry_run_markdown(report: &DryRunReport) -> String {
    let mut md = String::new();

    let verdict = if report.passed { "PASSED" } else { "FAILED" };
    md.push_str(&format!("# Dry run {}\n\n", verdict));
    md.push_str(&format!("- **source**: `{}`\n", report.source.display()));

    if !report.failures.is_empty() {
        md.push_str("\n## Failures\n\n");
        for failure in &report.failures {
            md.push_str(&format!("- {}\n", failure));
        }
    }

    if !report.tables.is_empty() {
        push_presence(&mut md, "Tables", &report.tables);
    }
    if !report.legacy_backups.is_empty() {
        push_presence(&mut md, "Legacy tables", &report.legacy_backups);
    }

    if !report.row_counts.is_empty() {
        md.push_str("\n## Row counts\n\n");
        md.push_str("| table | rows |\n|---|---|\n");
        for (table, count) in &report.row_counts {
            md.push_str(&format!("| {} | {} |\n", table, count));
        }
    }

    for (table, sample) in &report.samples {
        md.push_str(&format!("\n### Sample: {}\n\n```json\n", table));
        md.push_str(&serde_json::to_string_pretty(sample).unwrap_or_default());
        md.push_str("\n```\n");
    }

    if let Some(ref migration) = report.migration {
        if !migration.status_fallbacks.is_empty() {
            md.push_str(&format!(
                "\n{} task(s) fell back to the default status.\n",
                migration.status_fallbacks.len()
            ));
        }
    }

    md
}
