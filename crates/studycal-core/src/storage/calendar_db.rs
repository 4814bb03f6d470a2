//! SQLite-backed calendar: tasks, leave records, thresholds and history.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use super::data_dir;
use super::migrations;
use super::store::{CalendarStore, LeaveRecord};
use crate::error::{DatabaseError, RescheduleError, Result};
use crate::schedule::history::ScheduleHistoryEntry;
use crate::schedule::policy::ThresholdKey;
use crate::task::{Task, TaskKind, TaskStatus};

/// Counts reported by [`CalendarDb::import_tasks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    /// REST tasks dropped because the day was already a rest day
    pub skipped_rest: usize,
}

/// Counts reported by [`CalendarDb::reset_student`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub deleted_tasks: usize,
    pub deleted_leaves: usize,
}

/// SQLite database holding every student's calendar.
pub struct CalendarDb {
    conn: Connection,
}

impl CalendarDb {
    /// Open the calendar database at `<data dir>/studycal.db`.
    ///
    /// Creates tables if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("studycal.db");
        Self::open_at(&path)
    }

    /// Open (or create) a database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        // Base tables (v1 schema); later columns arrive through migrations.
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                seq            INTEGER PRIMARY KEY AUTOINCREMENT,
                id             TEXT NOT NULL UNIQUE,
                student_id     TEXT NOT NULL,
                date           TEXT NOT NULL,
                task_type      TEXT NOT NULL,
                title          TEXT NOT NULL,
                completed      INTEGER NOT NULL DEFAULT 0,
                duration_minutes INTEGER,
                original_date  TEXT,
                status         TEXT NOT NULL DEFAULT 'normal',
                defer_reason   TEXT,
                created_at     TEXT NOT NULL,
                updated_at     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS leave_records (
                student_id TEXT NOT NULL,
                leave_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (student_id, leave_date)
            );

            CREATE TABLE IF NOT EXISTS schedule_config (
                student_id TEXT NOT NULL DEFAULT '',
                key        TEXT NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (student_id, key)
            );

            CREATE TABLE IF NOT EXISTS schedule_history (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id     TEXT NOT NULL,
                operation      TEXT NOT NULL,
                operation_date TEXT NOT NULL,
                affected_count INTEGER NOT NULL,
                details        TEXT NOT NULL DEFAULT '{}',
                created_at     TEXT NOT NULL
            );",
        )?;

        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Store view over the plain connection (autocommit).
    pub fn store(&self) -> CalendarStore<'_> {
        CalendarStore::new(&self.conn)
    }

    /// Begin an IMMEDIATE transaction, taking the write lock up front.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(tx)
    }

    // === Tasks ===

    pub fn create_task(&self, task: &Task) -> Result<()> {
        self.store().insert_task(task)
    }

    /// Ingest planned tasks from the study plan.
    ///
    /// Every task is stored with status `normal` and its own date as
    /// original date. A REST task for a day that already has one is
    /// dropped. The batch is all-or-nothing.
    pub fn import_tasks(&mut self, tasks: &[Task]) -> Result<ImportSummary> {
        let tx = self.transaction()?;
        let store = CalendarStore::new(&tx);
        let mut summary = ImportSummary::default();

        for task in tasks {
            if task.kind == TaskKind::Rest && store.has_kind_on(&task.student_id, task.date, &TaskKind::Rest)? {
                tracing::warn!(
                    student_id = task.student_id.as_str(),
                    date = %task.date,
                    "skipping duplicate REST task on import"
                );
                summary.skipped_rest += 1;
                continue;
            }

            let mut planned = task.clone();
            planned.status = TaskStatus::Normal;
            planned.defer_reason = None;
            planned.original_date = Some(task.date);
            store.insert_task(&planned)?;
            summary.imported += 1;
        }

        tx.commit()?;
        tracing::info!(
            imported = summary.imported,
            skipped_rest = summary.skipped_rest,
            "tasks imported"
        );
        Ok(summary)
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        self.store().get_task(id)
    }

    /// A student's tasks, optionally restricted to one date.
    pub fn list_tasks(&self, student_id: &str, date: Option<NaiveDate>) -> Result<Vec<Task>> {
        match date {
            Some(date) => self.store().tasks_on(student_id, date),
            None => self.store().tasks_for_student(student_id),
        }
    }

    pub fn set_completed(&self, id: &str, completed: bool) -> Result<Task> {
        let found = self.store().set_completed(id, completed, Utc::now())?;
        self.updated(id, found)
    }

    pub fn set_duration(&self, id: &str, minutes: Option<u32>) -> Result<Task> {
        let found = self.store().set_duration(id, minutes, Utc::now())?;
        self.updated(id, found)
    }

    pub fn set_proof(&self, id: &str, proof: Option<&str>) -> Result<Task> {
        let found = self.store().set_proof(id, proof, Utc::now())?;
        self.updated(id, found)
    }

    fn updated(&self, id: &str, found: bool) -> Result<Task> {
        let task = if found { self.get_task(id)? } else { None };
        task.ok_or_else(|| RescheduleError::TaskNotFound(id.to_string()).into())
    }

    /// Turn a date into a rest day by adding a REST task.
    ///
    /// Returns `None` when the date already is a rest day.
    pub fn mark_rest_day(&self, student_id: &str, date: NaiveDate) -> Result<Option<Task>> {
        let store = self.store();
        if store.has_kind_on(student_id, date, &TaskKind::Rest)? {
            return Ok(None);
        }
        let marker = Task::rest_marker(student_id, date);
        store.insert_task(&marker)?;
        Ok(Some(marker))
    }

    // === Leave, thresholds, history ===

    pub fn leave_records(&self, student_id: &str) -> Result<Vec<LeaveRecord>> {
        self.store().leave_records(student_id)
    }

    /// Stored override for `key`; `None` scope reads the global row.
    pub fn threshold_override(&self, student_id: Option<&str>, key: ThresholdKey) -> Result<Option<String>> {
        self.store().config_value(student_id, key.as_str())
    }

    /// Store an override for `key`; `None` scope writes the global row.
    pub fn set_threshold(&self, student_id: Option<&str>, key: ThresholdKey, value: u32) -> Result<()> {
        self.store()
            .set_config_value(student_id, key.as_str(), &value.to_string(), Utc::now())
    }

    /// Newest history entries first.
    pub fn history(&self, student_id: &str, limit: usize) -> Result<Vec<ScheduleHistoryEntry>> {
        self.store().history_for(student_id, limit)
    }

    // === Reset ===

    /// Delete a student's tasks, leave records and rollover markers in one
    /// transaction. History and threshold overrides survive.
    pub fn reset_student(&mut self, student_id: &str) -> Result<ResetSummary> {
        let tx = self.transaction()?;
        let (deleted_tasks, deleted_leaves) = CalendarStore::new(&tx).delete_calendar(student_id)?;
        tx.commit()?;
        tracing::info!(student_id, deleted_tasks, deleted_leaves, "student calendar reset");
        Ok(ResetSummary {
            deleted_tasks,
            deleted_leaves,
        })
    }
}
