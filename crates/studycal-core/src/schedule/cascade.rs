//! Cascading rescheduler.
//!
//! Placing a batch of displaced tasks on the next work date pushes that
//! date's existing study tasks (its occupants) one more step down the line,
//! and so on until a date with no occupants is reached.
//!
//! The cascade runs in two phases over an explicit work stack:
//!
//! 1. **Plan** walks the hops read-only. Every hop targets a date strictly
//!    after the previous one, so reading occupants from the untouched store
//!    sees exactly what the step-by-step cascade would see. The depth bound
//!    is enforced here.
//! 2. **Apply** deletes each batch's source rows and reinserts the batch on
//!    its target with new identities.
//!
//! A plan that would exceed the depth bound is never applied, so hitting
//! the guard leaves the calendar untouched instead of dropping the batch
//! that could not be placed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;

use super::calendar::WorkDateFinder;
use super::policy::ReschedulePolicy;
use crate::error::Result;
use crate::storage::CalendarStore;
use crate::task::Task;

/// One level of a cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub depth: usize,
    /// Date the batch was displaced from
    pub from: NaiveDate,
    /// Date the batch landed on
    pub target: NaiveDate,
    /// Ids minted for the placed batch, in batch order
    pub placed_ids: Vec<String>,
    /// Occupants of `target` pushed on to the next hop
    pub displaced: usize,
}

/// Result of one cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Tasks placed across every level
    pub affected_count: usize,
    pub hops: Vec<Hop>,
    /// The depth guard tripped and nothing was written
    pub depth_exhausted: bool,
    /// Human-readable account of every hop
    pub trace: String,
}

impl Placement {
    /// Where the initial batch landed.
    pub fn first_target(&self) -> Option<NaiveDate> {
        self.hops.first().map(|hop| hop.target)
    }

    /// Ids of every task created by this cascade.
    pub fn placed_ids(&self) -> impl Iterator<Item = &str> {
        self.hops
            .iter()
            .flat_map(|hop| hop.placed_ids.iter().map(String::as_str))
    }
}

struct PlannedHop {
    depth: usize,
    from: NaiveDate,
    target: NaiveDate,
    batch: Vec<Task>,
    displaced: usize,
}

enum Plan {
    Ready(Vec<PlannedHop>),
    Exhausted { hops: Vec<PlannedHop>, stuck_at: NaiveDate },
}

/// Places displaced tasks forward, cascading into occupied days.
pub struct CascadingRescheduler<'a, 'c> {
    store: &'a CalendarStore<'c>,
    policy: &'a ReschedulePolicy,
}

impl<'a, 'c> CascadingRescheduler<'a, 'c> {
    pub fn new(store: &'a CalendarStore<'c>, policy: &'a ReschedulePolicy) -> Self {
        Self { store, policy }
    }

    /// Place `tasks` on the next work date after `start`.
    ///
    /// The batch's current rows are removed as part of the placement; the
    /// caller must not delete them first. Batches keep their order and are
    /// never split.
    pub fn place_tasks(
        &self,
        student_id: &str,
        start: NaiveDate,
        tasks: Vec<Task>,
        now: DateTime<Utc>,
    ) -> Result<Placement> {
        match self.plan(student_id, start, tasks)? {
            Plan::Ready(hops) => self.apply(hops, now),
            Plan::Exhausted { hops, stuck_at } => {
                let mut trace = describe(&hops);
                let _ = write!(
                    trace,
                    "{}cascade depth limit {} exceeded at {stuck_at}; nothing moved",
                    if trace.is_empty() { "" } else { "; " },
                    self.policy.max_cascade_depth,
                );
                tracing::warn!(
                    student_id,
                    %start,
                    max_depth = self.policy.max_cascade_depth,
                    "cascade aborted: {trace}"
                );
                Ok(Placement {
                    depth_exhausted: true,
                    trace,
                    ..Placement::default()
                })
            }
        }
    }

    fn plan(&self, student_id: &str, start: NaiveDate, tasks: Vec<Task>) -> Result<Plan> {
        let finder = WorkDateFinder::new(self.store, self.policy.rest_lookahead_days);
        let incoming: HashSet<String> = tasks.iter().map(|t| t.id.clone()).collect();

        let mut hops: Vec<PlannedHop> = Vec::new();
        let mut stack = vec![(start, tasks, 0usize)];

        while let Some((from, batch, depth)) = stack.pop() {
            if batch.is_empty() {
                continue;
            }
            if depth > self.policy.max_cascade_depth {
                return Ok(Plan::Exhausted { hops, stuck_at: from });
            }

            let target = finder.next_work_date(student_id, from)?;
            let mut occupants = self.store.occupants_on(student_id, target)?;
            occupants.retain(|task| !incoming.contains(&task.id));

            hops.push(PlannedHop {
                depth,
                from,
                target,
                batch,
                displaced: occupants.len(),
            });
            stack.push((target, occupants, depth + 1));
        }

        Ok(Plan::Ready(hops))
    }

    fn apply(&self, planned: Vec<PlannedHop>, now: DateTime<Utc>) -> Result<Placement> {
        let trace = describe(&planned);
        let mut placement = Placement {
            trace,
            ..Placement::default()
        };

        for hop in planned {
            let source_ids: Vec<&str> = hop.batch.iter().map(|t| t.id.as_str()).collect();
            self.store.delete_tasks(&source_ids)?;

            let mut placed_ids = Vec::with_capacity(hop.batch.len());
            for task in &hop.batch {
                let moved = task.cascaded_to(hop.target, now);
                self.store.insert_task(&moved)?;
                placed_ids.push(moved.id);
            }

            tracing::debug!(
                depth = hop.depth,
                from = %hop.from,
                target = %hop.target,
                placed = placed_ids.len(),
                displaced = hop.displaced,
                "cascade hop"
            );

            placement.affected_count += placed_ids.len();
            placement.hops.push(Hop {
                depth: hop.depth,
                from: hop.from,
                target: hop.target,
                placed_ids,
                displaced: hop.displaced,
            });
        }

        Ok(placement)
    }
}

fn describe(hops: &[PlannedHop]) -> String {
    let mut trace = String::new();
    for hop in hops {
        if !trace.is_empty() {
            trace.push_str("; ");
        }
        let _ = write!(
            trace,
            "depth {}: {} -> {} placed {}, displaced {}",
            hop.depth,
            hop.from,
            hop.target,
            hop.batch.len(),
            hop.displaced
        );
    }
    trace
}
