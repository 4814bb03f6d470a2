//! SQL access to the calendar tables.
//!
//! [`CalendarStore`] borrows a connection, so the same queries serve both
//! plain reads against a [`CalendarDb`](super::CalendarDb) and the writes an
//! engine entry point performs inside its transaction (a
//! `rusqlite::Transaction` derefs to `Connection`).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::schedule::history::{OperationType, ScheduleHistoryEntry};
use crate::task::{DeferReason, Task, TaskKind, TaskStatus, DATE_FORMAT};

const TASK_COLUMNS: &str = "id, student_id, date, task_type, title, completed, duration_minutes, \
     proof, original_date, status, defer_reason, created_at, updated_at";

const HISTORY_COLUMNS: &str =
    "id, student_id, operation, operation_date, affected_count, details, created_at";

/// Scope value used for global schedule_config rows.
const GLOBAL_SCOPE: &str = "";

/// An approved leave day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRecord {
    pub student_id: String,
    pub leave_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Outcome of claiming an idempotency marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerClaim {
    /// The caller owns this run; the marker now carries the caller's timestamp.
    Claimed,
    /// Another run claimed the marker inside the window.
    Recent { processed_at: DateTime<Utc> },
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_error(idx: usize, err: ValidationError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|_| conversion_error(idx, ValidationError::InvalidDate(raw)))
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let original_date = match row.get::<_, Option<String>>(8)? {
        Some(raw) => Some(
            NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                .map_err(|_| conversion_error(8, ValidationError::InvalidDate(raw)))?,
        ),
        None => None,
    };

    let status_str: String = row.get(9)?;
    let status = TaskStatus::parse(&status_str).ok_or_else(|| {
        conversion_error(
            9,
            ValidationError::InvalidValue {
                field: "status".to_string(),
                message: status_str.clone(),
            },
        )
    })?;

    Ok(Task {
        id: row.get(0)?,
        student_id: row.get(1)?,
        date: parse_date_column(row, 2)?,
        kind: TaskKind::parse(&row.get::<_, String>(3)?),
        title: row.get(4)?,
        completed: row.get(5)?,
        duration_minutes: row.get(6)?,
        proof: row.get(7)?,
        original_date,
        status,
        defer_reason: row.get::<_, Option<String>>(10)?.map(DeferReason::from),
        created_at: parse_datetime_fallback(&row.get::<_, String>(11)?),
        updated_at: parse_datetime_fallback(&row.get::<_, String>(12)?),
    })
}

fn row_to_history(row: &Row) -> rusqlite::Result<ScheduleHistoryEntry> {
    let op_str: String = row.get(2)?;
    let operation = OperationType::parse(&op_str).ok_or_else(|| {
        conversion_error(
            2,
            ValidationError::InvalidValue {
                field: "operation".to_string(),
                message: op_str.clone(),
            },
        )
    })?;
    let details: String = row.get(5)?;

    Ok(ScheduleHistoryEntry {
        id: row.get(0)?,
        student_id: row.get(1)?,
        operation,
        operation_date: parse_date_column(row, 3)?,
        affected_count: row.get::<_, i64>(4)? as usize,
        details: serde_json::from_str(&details).unwrap_or(serde_json::Value::String(details)),
        created_at: parse_datetime_fallback(&row.get::<_, String>(6)?),
    })
}

/// Queries over the calendar tables on a borrowed connection.
#[derive(Clone, Copy)]
pub struct CalendarStore<'c> {
    conn: &'c Connection,
}

impl<'c> CalendarStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn query_tasks(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(sql)?;
        let tasks = stmt
            .query_map(args, row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    // === Tasks ===

    /// Insert a task row as-is.
    pub fn insert_task(&self, task: &Task) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                task.id,
                task.student_id,
                format_date(task.date),
                task.kind.as_str(),
                task.title,
                task.completed,
                task.duration_minutes,
                task.proof,
                task.original_date.map(format_date),
                task.status.as_str(),
                task.defer_reason.as_ref().map(DeferReason::as_str),
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    /// All of a student's tasks, by date then insertion order.
    pub fn tasks_for_student(&self, student_id: &str) -> Result<Vec<Task>> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE student_id = ?1 ORDER BY date ASC, seq ASC"
            ),
            params![student_id],
        )
    }

    /// Every task on one date, REST and LEAVE markers included.
    pub fn tasks_on(&self, student_id: &str, date: NaiveDate) -> Result<Vec<Task>> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE student_id = ?1 AND date = ?2
                 ORDER BY seq ASC"
            ),
            params![student_id, format_date(date)],
        )
    }

    /// Study tasks on a date that a cascade would displace, in insertion order.
    pub fn occupants_on(&self, student_id: &str, date: NaiveDate) -> Result<Vec<Task>> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE student_id = ?1 AND date = ?2 AND task_type NOT IN (?3, ?4)
                 ORDER BY seq ASC"
            ),
            params![
                student_id,
                format_date(date),
                TaskKind::REST_TAG,
                TaskKind::LEAVE_TAG
            ],
        )
    }

    /// Incomplete study tasks on a date, in insertion order.
    pub fn incomplete_on(&self, student_id: &str, date: NaiveDate) -> Result<Vec<Task>> {
        self.query_tasks(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE student_id = ?1 AND date = ?2 AND completed = 0
                   AND task_type NOT IN (?3, ?4)
                 ORDER BY seq ASC"
            ),
            params![
                student_id,
                format_date(date),
                TaskKind::REST_TAG,
                TaskKind::LEAVE_TAG
            ],
        )
    }

    /// Number of study tasks on a date.
    pub fn count_occupants(&self, student_id: &str, date: NaiveDate) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks
             WHERE student_id = ?1 AND date = ?2 AND task_type NOT IN (?3, ?4)",
            params![
                student_id,
                format_date(date),
                TaskKind::REST_TAG,
                TaskKind::LEAVE_TAG
            ],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Whether any task of `kind` exists on the date.
    pub fn has_kind_on(&self, student_id: &str, date: NaiveDate, kind: &TaskKind) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM tasks WHERE student_id = ?1 AND date = ?2 AND task_type = ?3
             )",
            params![student_id, format_date(date), kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Delete tasks by id. Returns how many rows went away.
    pub fn delete_tasks<S: AsRef<str>>(&self, ids: &[S]) -> Result<usize> {
        let mut stmt = self.conn.prepare("DELETE FROM tasks WHERE id = ?1")?;
        let mut deleted = 0;
        for id in ids {
            deleted += stmt.execute(params![id.as_ref()])?;
        }
        Ok(deleted)
    }

    /// Move a task in place, keeping its identity.
    ///
    /// A missing `original_date` is backfilled with the pre-move date; an
    /// existing one is never touched.
    pub fn move_task(
        &self,
        id: &str,
        date: NaiveDate,
        status: TaskStatus,
        defer_reason: Option<&DeferReason>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET original_date = COALESCE(original_date, date),
                 date = ?2,
                 status = ?3,
                 defer_reason = ?4,
                 updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                format_date(date),
                status.as_str(),
                defer_reason.map(DeferReason::as_str),
                now.to_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn set_completed(&self, id: &str, completed: bool, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks SET completed = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, completed, now.to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    pub fn set_duration(&self, id: &str, minutes: Option<u32>, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks SET duration_minutes = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, minutes, now.to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    pub fn set_proof(&self, id: &str, proof: Option<&str>, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks SET proof = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, proof, now.to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    // === Leave ===

    pub fn leave_exists(&self, student_id: &str, date: NaiveDate) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM leave_records WHERE student_id = ?1 AND leave_date = ?2)",
            params![student_id, format_date(date)],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn insert_leave(&self, student_id: &str, date: NaiveDate, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO leave_records (student_id, leave_date, created_at) VALUES (?1, ?2, ?3)",
            params![student_id, format_date(date), now.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn leave_records(&self, student_id: &str) -> Result<Vec<LeaveRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id, leave_date, created_at FROM leave_records
             WHERE student_id = ?1 ORDER BY leave_date ASC",
        )?;
        let records = stmt
            .query_map(params![student_id], |row| {
                Ok(LeaveRecord {
                    student_id: row.get(0)?,
                    leave_date: parse_date_column(row, 1)?,
                    created_at: parse_datetime_fallback(&row.get::<_, String>(2)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    // === Schedule config ===

    /// Raw value stored for exactly this scope (`None` = global).
    pub fn config_value(&self, student_id: Option<&str>, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM schedule_config WHERE student_id = ?1 AND key = ?2",
                params![student_id.unwrap_or(GLOBAL_SCOPE), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_config_value(
        &self,
        student_id: Option<&str>,
        key: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO schedule_config (student_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(student_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![student_id.unwrap_or(GLOBAL_SCOPE), key, value, now.to_rfc3339()],
        )?;
        Ok(())
    }

    // === History ===

    /// Append an entry, returning it with its assigned id.
    pub fn append_history(&self, entry: &ScheduleHistoryEntry) -> Result<ScheduleHistoryEntry> {
        self.conn.execute(
            "INSERT INTO schedule_history
                (student_id, operation, operation_date, affected_count, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.student_id,
                entry.operation.as_str(),
                format_date(entry.operation_date),
                entry.affected_count as i64,
                serde_json::to_string(&entry.details)?,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(ScheduleHistoryEntry {
            id: self.conn.last_insert_rowid(),
            ..entry.clone()
        })
    }

    /// A student's history, newest first.
    pub fn history_for(&self, student_id: &str, limit: usize) -> Result<Vec<ScheduleHistoryEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM schedule_history
             WHERE student_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let entries = stmt
            .query_map(params![student_id, limit as i64], row_to_history)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    // === Idempotency markers ===

    /// Claim the (student, date, operation) marker unless it was claimed
    /// less than `window` before `now`.
    ///
    /// Must run inside the caller's write transaction so the read and the
    /// upsert cannot interleave with another writer.
    pub fn claim_marker(
        &self,
        student_id: &str,
        date: NaiveDate,
        operation: OperationType,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<MarkerClaim> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT processed_at FROM processed_days
                 WHERE student_id = ?1 AND date = ?2 AND operation = ?3",
                params![student_id, format_date(date), operation.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(raw) = existing {
            if let Ok(processed_at) = DateTime::parse_from_rfc3339(&raw) {
                let processed_at = processed_at.with_timezone(&Utc);
                if now - processed_at < window {
                    return Ok(MarkerClaim::Recent { processed_at });
                }
            }
        }

        self.conn.execute(
            "INSERT INTO processed_days (student_id, date, operation, processed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(student_id, date, operation) DO UPDATE SET
                processed_at = excluded.processed_at",
            params![
                student_id,
                format_date(date),
                operation.as_str(),
                now.to_rfc3339()
            ],
        )?;
        Ok(MarkerClaim::Claimed)
    }

    // === Reset ===

    /// Hard-delete a student's calendar: tasks, leave records and markers.
    ///
    /// Threshold overrides and the history log are kept.
    pub fn delete_calendar(&self, student_id: &str) -> Result<(usize, usize)> {
        let tasks = self
            .conn
            .execute("DELETE FROM tasks WHERE student_id = ?1", params![student_id])?;
        let leaves = self.conn.execute(
            "DELETE FROM leave_records WHERE student_id = ?1",
            params![student_id],
        )?;
        self.conn.execute(
            "DELETE FROM processed_days WHERE student_id = ?1",
            params![student_id],
        )?;
        Ok((tasks, leaves))
    }
}
