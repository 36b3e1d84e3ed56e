use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use shared::types::{ConflictHandling, ConstraintKind, Employee, Product};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::domain::context::PlanningContext;
use crate::domain::plan::PlannedShift;
use crate::domain::windows::{PlanningUnit, ShiftWindow};

/// Why a candidate was passed over (or flagged) for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Availability,
    SkillMismatch,
    ApprovedLeaveFull,
    ApprovedLeaveDaytime,
    RecurringLeave,
    DoubleAssignment,
    RestPeriod,
    MaxConsecutiveWeeks,
}

impl SkipReason {
    /// Audit kind for this reason. Availability-flag skips are not audited:
    /// flagged-out employees never enter a candidate list in the first place.
    pub fn kind(self) -> Option<ConstraintKind> {
        match self {
            SkipReason::Availability => None,
            SkipReason::ApprovedLeaveFull | SkipReason::ApprovedLeaveDaytime => {
                Some(ConstraintKind::ApprovedLeave)
            }
            SkipReason::RecurringLeave => Some(ConstraintKind::RecurringLeave),
            SkipReason::DoubleAssignment => Some(ConstraintKind::DoubleAssignment),
            SkipReason::SkillMismatch => Some(ConstraintKind::SkillMismatch),
            SkipReason::RestPeriod => Some(ConstraintKind::RestPeriod),
            SkipReason::MaxConsecutiveWeeks => Some(ConstraintKind::Overtime),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            SkipReason::Availability => "not available for product",
            SkipReason::SkillMismatch => "missing required skills",
            SkipReason::ApprovedLeaveFull => "approved leave (full unavailability)",
            SkipReason::ApprovedLeaveDaytime => "approved leave (daytime only)",
            SkipReason::RecurringLeave => "recurring leave pattern",
            SkipReason::DoubleAssignment => "already assigned overlapping shift",
            SkipReason::RestPeriod => "minimum rest period",
            SkipReason::MaxConsecutiveWeeks => "maximum consecutive weeks reached",
        }
    }
}

/// Outcome of the per-window feasibility predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feasibility {
    Feasible,
    /// Assignable now, to be repaired by split coverage afterwards.
    Warn(SkipReason),
    Skip(SkipReason),
}

/// Outcome of evaluating a whole planning unit for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitFeasibility {
    Eligible {
        /// Indices into the unit's windows that carried a `Warn`.
        warnings: Vec<(usize, SkipReason)>,
    },
    Disqualified(SkipReason),
}

/// Per-window feasibility, checks in fixed order, first failure wins.
///
/// `permissive_recurring` turns a recurring-leave hit on a business-hours
/// product into a `Warn` so the unit stays assignable and split coverage can
/// repair the affected days. Waakdienst and the reassignment pass evaluate
/// strictly.
pub fn check_window(
    ctx: &PlanningContext,
    config: &OrchestratorConfig,
    employee: &Employee,
    window: &ShiftWindow,
    plan: &[PlannedShift],
    permissive_recurring: bool,
) -> Feasibility {
    let product = window.product;

    if !employee.available_for(product) {
        return Feasibility::Skip(SkipReason::Availability);
    }

    if !employee.has_skills(ctx.required_skills(product)) {
        return Feasibility::Skip(SkipReason::SkillMismatch);
    }

    if let Some(leave) = ctx.blocking_leave(employee.id, product, window.start, window.end) {
        let reason = match leave.conflict_handling {
            ConflictHandling::FullUnavailable => SkipReason::ApprovedLeaveFull,
            _ => SkipReason::ApprovedLeaveDaytime,
        };
        return Feasibility::Skip(reason);
    }

    if ctx.recurring_blocks(employee.id, product, window.start, window.end) {
        if permissive_recurring && product.is_business_hours() {
            return Feasibility::Warn(SkipReason::RecurringLeave);
        }
        return Feasibility::Skip(SkipReason::RecurringLeave);
    }

    if has_double_assignment(ctx.tz, employee.id, window, plan) {
        return Feasibility::Skip(SkipReason::DoubleAssignment);
    }

    if violates_rest_period(ctx, config, employee.id, window, plan) {
        return Feasibility::Skip(SkipReason::RestPeriod);
    }

    Feasibility::Feasible
}

/// Evaluate a candidate against the unit as a whole: any window `Skip`
/// disqualifies the candidate for the entire unit, warnings accumulate, and
/// the consecutive-weeks cap is checked once per unit.
pub fn check_unit(
    ctx: &PlanningContext,
    config: &OrchestratorConfig,
    employee: &Employee,
    unit: &PlanningUnit,
    plan: &[PlannedShift],
    permissive_recurring: bool,
) -> UnitFeasibility {
    let mut warnings = Vec::new();

    for (idx, window) in unit.windows.iter().enumerate() {
        match check_window(ctx, config, employee, window, plan, permissive_recurring) {
            Feasibility::Feasible => {}
            Feasibility::Warn(reason) => warnings.push((idx, reason)),
            Feasibility::Skip(reason) => return UnitFeasibility::Disqualified(reason),
        }
    }

    if let Some(cap) = employee.max_consecutive_weeks {
        let streak = consecutive_units_before(ctx, plan, employee.id, unit.product, unit.anchor);
        if streak >= i64::from(cap) {
            return UnitFeasibility::Disqualified(SkipReason::MaxConsecutiveWeeks);
        }
    }

    UnitFeasibility::Eligible { warnings }
}

/// Overlap with another assignment of the same employee, across products,
/// excluding windows of the same planning unit (one engineer covers a whole
/// unit, and Waakdienst weekend blocks overlap their Friday evening by
/// construction) and the Wednesday handover corridor.
fn has_double_assignment(
    tz: Tz,
    employee: Uuid,
    window: &ShiftWindow,
    plan: &[PlannedShift],
) -> bool {
    plan.iter().any(|s| {
        s.employee_id == Some(employee)
            && !same_unit(s, window)
            && s.overlaps(window.start, window.end)
            && !handover_exempt(
                tz,
                s.product,
                s.start,
                s.end,
                window.product,
                window.start,
                window.end,
            )
    })
}

fn same_unit(planned: &PlannedShift, window: &ShiftWindow) -> bool {
    planned.product == window.product && planned.unit_anchor == window.unit_anchor
}

const CORRIDOR_START: NaiveTime = NaiveTime::from_hms_opt(8, 0, 0).expect("valid time");
const CORRIDOR_END: NaiveTime = NaiveTime::from_hms_opt(17, 0, 0).expect("valid time");

/// The Wednesday 08:00-17:00 corridor: an Incidents (or Standby) shift may
/// coexist with a Waakdienst window there while the on-call week hands over.
pub fn handover_exempt(
    tz: Tz,
    a_product: Product,
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_product: Product,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    let cross_product = (a_product.is_business_hours() && b_product == Product::Waakdienst)
        || (b_product.is_business_hours() && a_product == Product::Waakdienst);
    if !cross_product {
        return false;
    }

    let ov_start = a_start.max(b_start).with_timezone(&tz);
    let ov_end = a_end.min(b_end).with_timezone(&tz);

    ov_start.date_naive() == ov_end.date_naive()
        && ov_start.weekday() == Weekday::Wed
        && ov_start.time() >= CORRIDOR_START
        && ov_end.time() <= CORRIDOR_END
}

fn violates_rest_period(
    ctx: &PlanningContext,
    config: &OrchestratorConfig,
    employee: Uuid,
    window: &ShiftWindow,
    plan: &[PlannedShift],
) -> bool {
    let min_rest = config.min_rest_hours(window.product);
    if min_rest <= 0 {
        return false;
    }
    let min_rest = Duration::hours(min_rest);

    let too_close = |start: DateTime<Utc>, end: DateTime<Utc>| {
        // Gap before this window or after it, whichever side the other shift is on.
        (end <= window.start && window.start - end < min_rest)
            || (start >= window.end && start - window.end < min_rest)
    };

    let planned = plan
        .iter()
        .filter(|s| s.employee_id == Some(employee) && !same_unit(s, window))
        .any(|s| too_close(s.start, s.end));
    if planned {
        return true;
    }

    ctx.history
        .iter()
        .filter(|s| s.employee_id == Some(employee))
        .any(|s| too_close(s.start_ts, s.end_ts))
}

/// How many units of `product` the employee already covers in the weeks
/// immediately before `anchor`, looking at both the current plan and applied
/// history.
pub fn consecutive_units_before(
    ctx: &PlanningContext,
    plan: &[PlannedShift],
    employee: Uuid,
    product: Product,
    anchor: chrono::NaiveDate,
) -> i64 {
    let covered = |candidate: chrono::NaiveDate| {
        plan.iter().any(|s| {
            s.employee_id == Some(employee) && s.product == product && s.unit_anchor == candidate
        }) || ctx.history.iter().any(|s| {
            s.employee_id == Some(employee)
                && s.product == product
                && unit_anchor_of(ctx.tz, product, s.start_ts) == candidate
        })
    };

    let mut streak = 0;
    let mut candidate = anchor - Duration::days(7);
    while covered(candidate) {
        streak += 1;
        candidate -= Duration::days(7);
    }
    streak
}

/// Recover the planning-unit anchor of a persisted shift from its start.
pub fn unit_anchor_of(tz: Tz, product: Product, start: DateTime<Utc>) -> chrono::NaiveDate {
    let local_date = start.with_timezone(&tz).date_naive();
    match product {
        Product::Incidents | Product::IncidentsStandby => shared::time::monday_of_week(local_date),
        Product::Waakdienst => shared::time::waakdienst_anchor(local_date),
    }
}
