//! Database operations and SQLite management.
//!
//! This module owns the SQLite connection, schema management, and the query
//! interfaces for goals, tasks, plans, steps, schedules, diary entries and
//! persisted engine settings.
//! Every mutating operation runs in an `IMMEDIATE` transaction, so a
//! read-validate-write sequence holds the write lock from its first read and
//! concurrent callers (command handlers, the scheduler tick, plan executors)
//! observe each other's changes atomically.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::{DatabaseResultExt, Result};

pub mod diary_queries;
pub mod goal_queries;
pub mod migrations;
pub mod plan_queries;
pub mod rows;
pub mod schedule_queries;
pub mod settings_queries;
pub mod step_queries;
pub mod task_queries;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection and operations handler.
pub struct Database {
    connection: Connection,
}

impl Database {
    /// Opens a connection and initializes the schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let connection = Connection::open(path).db_context("Failed to open database connection")?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .db_context("Failed to set busy timeout")?;

        let db = Self { connection };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Begins a transaction that takes the write lock immediately.
    pub(crate) fn write_transaction(&mut self) -> Result<Transaction<'_>> {
        self.connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .db_context("Failed to begin transaction")
    }
}

/// Builds the value bound to `(?N IS NULL OR scope_key = ?N)` filters.
pub(crate) fn scope_param(scope: Option<&crate::scope::Scope>) -> Option<String> {
    scope.map(crate::scope::Scope::storage_key)
}
