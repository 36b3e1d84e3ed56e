use chrono::{DateTime, NaiveDate, Utc};
use shared::types::{
    ConstraintKind, ConstraintResolution, ConstraintSeverity, Product,
};
use uuid::Uuid;

/// One shift of the provisional plan, before persistence.
///
/// `employee_id = None` is an unassigned placeholder: the window enters the
/// plan (and the database) so downstream tooling can see the gap.
#[derive(Debug, Clone)]
pub struct PlannedShift {
    pub product: Product,
    pub unit_anchor: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub employee_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
}

impl PlannedShift {
    pub fn duration_hours(&self) -> f64 {
        shared::time::elapsed_hours(self.start, self.end)
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        shared::time::overlaps(self.start, self.end, start, end)
    }
}

/// A constraint occurrence that influenced the run, before it gets a run id.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub employee_id: Option<Uuid>,
    pub product: Product,
    pub window_start: Option<DateTime<Utc>>,
    pub kind: ConstraintKind,
    pub severity: ConstraintSeverity,
    pub resolution: ConstraintResolution,
    pub note: String,
}

/// Aggregate counters persisted on the run row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub shifts_planned: i32,
    pub shifts_assigned: i32,
    pub shifts_unassigned: i32,
    pub violations: i32,
}

impl RunTotals {
    pub fn tally(shifts: &[PlannedShift], events: &[EventRecord]) -> Self {
        let assigned = shifts.iter().filter(|s| s.employee_id.is_some()).count();
        Self {
            shifts_planned: shifts.len() as i32,
            shifts_assigned: assigned as i32,
            shifts_unassigned: (shifts.len() - assigned) as i32,
            violations: events
                .iter()
                .filter(|e| e.severity == ConstraintSeverity::Violation)
                .count() as i32,
        }
    }
}

/// The full result of the planning pipeline for one run.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub shifts: Vec<PlannedShift>,
    pub events: Vec<EventRecord>,
    pub totals: RunTotals,
}
