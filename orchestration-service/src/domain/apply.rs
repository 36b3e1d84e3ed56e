use chrono::{DateTime, Utc};
use shared::types::{Product, Shift, ShiftStatus};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::plan::PlannedShift;

/// A shift row to be persisted, before it has a database-generated id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewShift {
    pub team_id: Uuid,
    pub template_id: Option<Uuid>,
    pub product: Product,
    pub employee_id: Option<Uuid>,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
}

impl NewShift {
    pub fn from_planned(team_id: Uuid, planned: &PlannedShift) -> Self {
        Self {
            team_id,
            template_id: planned.template_id,
            product: planned.product,
            employee_id: planned.employee_id,
            start_ts: planned.start,
            end_ts: planned.end,
        }
    }
}

/// One write decided by the idempotency diff.
#[derive(Debug, Clone)]
pub enum ShiftMutation {
    Insert(NewShift),
    /// The existing row keeps its history as `superseded`; the replacement is
    /// inserted fresh.
    Supersede {
        existing_id: Uuid,
        replacement: NewShift,
    },
}

/// The outcome of diffing a plan against the persisted state.
#[derive(Debug, Default)]
pub struct ApplyDiff {
    pub mutations: Vec<ShiftMutation>,
    pub kept: u32,
}

impl ApplyDiff {
    pub fn inserted(&self) -> u32 {
        self.mutations
            .iter()
            .filter(|m| matches!(m, ShiftMutation::Insert(_)))
            .count() as u32
    }

    pub fn superseded(&self) -> u32 {
        self.mutations
            .iter()
            .filter(|m| matches!(m, ShiftMutation::Supersede { .. }))
            .count() as u32
    }

    pub fn is_noop(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Final persisted counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub inserted: u32,
    pub superseded: u32,
    pub kept: u32,
}

/// Compute the minimal mutation set that makes the store match the plan.
///
/// The idempotency key is `(product, start_ts)` within the team. An existing
/// non-superseded row with the same key and the same `(employee, end)` is
/// kept untouched; a differing one is superseded and replaced; a missing one
/// is inserted. Re-diffing the same plan against its own result is a no-op.
pub fn diff_against_existing(existing: &[Shift], planned: &[NewShift]) -> ApplyDiff {
    let index: HashMap<(Product, DateTime<Utc>), &Shift> = existing
        .iter()
        .filter(|s| s.status != ShiftStatus::Superseded)
        .map(|s| ((s.product, s.start_ts), s))
        .collect();

    let mut diff = ApplyDiff::default();
    for shift in planned {
        match index.get(&(shift.product, shift.start_ts)) {
            Some(current)
                if current.employee_id == shift.employee_id && current.end_ts == shift.end_ts =>
            {
                diff.kept += 1;
            }
            Some(current) => diff.mutations.push(ShiftMutation::Supersede {
                existing_id: current.id,
                replacement: shift.clone(),
            }),
            None => diff.mutations.push(ShiftMutation::Insert(shift.clone())),
        }
    }
    diff
}
