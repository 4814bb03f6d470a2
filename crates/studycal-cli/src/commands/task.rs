//! Task management commands for CLI.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Subcommand;
use serde::Deserialize;
use studycal_core::task::parse_date;
use studycal_core::{RescheduleError, Task, TaskKind};

use super::{open_engine, print_json};

/// One entry of an import file, as produced by the study planner.
#[derive(Deserialize)]
struct PlannedTask {
    student_id: String,
    date: NaiveDate,
    /// Subject tag, `REST` or `LEAVE`
    task_type: String,
    title: String,
    #[serde(default)]
    completed: bool,
    duration_minutes: Option<u32>,
}

impl From<PlannedTask> for Task {
    fn from(planned: PlannedTask) -> Self {
        let mut task = Task::new(
            planned.student_id,
            planned.date,
            TaskKind::parse(&planned.task_type),
            planned.title,
        )
        .completed(planned.completed);
        task.duration_minutes = planned.duration_minutes;
        task
    }
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a study task
    Add {
        /// Student ID
        #[arg(long)]
        student: String,
        /// Scheduled date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
        /// Subject tag, e.g. "Math"
        #[arg(long)]
        subject: String,
        /// Task title
        title: String,
        /// Planned duration in minutes
        #[arg(long)]
        duration: Option<u32>,
    },
    /// List a student's tasks
    List {
        /// Student ID
        #[arg(long)]
        student: String,
        /// Only tasks on this date
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Get task details
    Get {
        /// Task ID
        id: String,
    },
    /// Mark a task completed
    Complete {
        /// Task ID
        id: String,
        /// Mark it incomplete again instead
        #[arg(long)]
        undo: bool,
    },
    /// Set or clear the duration
    Duration {
        /// Task ID
        id: String,
        /// Minutes; omit to clear
        minutes: Option<u32>,
    },
    /// Attach or clear a completion proof
    Proof {
        /// Task ID
        id: String,
        /// Proof reference (file name, URL); omit to clear
        proof: Option<String>,
    },
    /// Make a date a rest day
    Rest {
        /// Student ID
        #[arg(long)]
        student: String,
        /// Date (YYYY-MM-DD)
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },
    /// Import planned tasks from a JSON array file
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
    /// Delete a student's tasks, leave records and rollover markers
    Reset {
        /// Student ID
        #[arg(long)]
        student: String,
    },
    /// Pull a future task onto today
    Advance {
        /// Student ID
        #[arg(long)]
        student: String,
        /// Task ID
        id: String,
    },
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = open_engine()?;

    match action {
        TaskAction::Add {
            student,
            date,
            subject,
            title,
            duration,
        } => {
            let mut task = Task::subject(student, date, subject, title);
            if let Some(minutes) = duration {
                task = task.with_duration(minutes);
            }
            engine.db().create_task(&task)?;
            print_json(&task)?;
        }
        TaskAction::List { student, date } => {
            let tasks = engine.db().list_tasks(&student, date)?;
            print_json(&tasks)?;
        }
        TaskAction::Get { id } => {
            let task = engine
                .db()
                .get_task(&id)?
                .ok_or(RescheduleError::TaskNotFound(id))?;
            print_json(&task)?;
        }
        TaskAction::Complete { id, undo } => {
            let task = engine.db().set_completed(&id, !undo)?;
            print_json(&task)?;
        }
        TaskAction::Duration { id, minutes } => {
            let task = engine.db().set_duration(&id, minutes)?;
            print_json(&task)?;
        }
        TaskAction::Proof { id, proof } => {
            let task = engine.db().set_proof(&id, proof.as_deref())?;
            print_json(&task)?;
        }
        TaskAction::Rest { student, date } => match engine.db().mark_rest_day(&student, date)? {
            Some(marker) => print_json(&marker)?,
            None => eprintln!("{date} is already a rest day for {student}"),
        },
        TaskAction::Import { file } => {
            let content = std::fs::read_to_string(&file)?;
            let planned: Vec<PlannedTask> = serde_json::from_str(&content)?;
            let tasks: Vec<Task> = planned.into_iter().map(Task::from).collect();
            let summary = engine.db_mut().import_tasks(&tasks)?;
            print_json(&summary)?;
        }
        TaskAction::Reset { student } => {
            let summary = engine.db_mut().reset_student(&student)?;
            print_json(&summary)?;
        }
        TaskAction::Advance { student, id } => {
            let task = engine.advance_task(&student, &id)?;
            print_json(&task)?;
        }
    }
    Ok(())
}
