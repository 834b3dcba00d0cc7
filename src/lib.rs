//! memtask-migrate library
//!
//! Migrates the legacy free-text memory/task SQLite schema to a normalized
//! schema in place, with backup and rollback. This module exports the core
//! components for testing and integration.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod logging;
pub mod migration;
pub mod tester;
pub mod types;
