use chrono::NaiveDate;
use shared::types::{
    ConstraintKind, ConstraintResolution, ConstraintSeverity, Employee, Product,
};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::domain::constraints::{Feasibility, UnitFeasibility, check_unit, check_window};
use crate::domain::context::PlanningContext;
use crate::domain::fairness::FairnessCalculator;
use crate::domain::plan::{EventRecord, PlannedShift};
use crate::domain::windows::{PlanningUnit, ShiftWindow};

/// Post-plan conflict resolution over the whole provisional plan.
///
/// Business-hours units are split: the original assignee keeps the clean
/// days, blocked days move to a replacement one by one. Waakdienst units are
/// never split; an infeasible assignee hands the whole week to the next-best
/// engineer. Finally the Incidents/Standby same-day double-assignment check
/// reruns, since splits can have moved people around.
pub fn resolve_conflicts(
    ctx: &PlanningContext,
    config: &OrchestratorConfig,
    fairness: &mut FairnessCalculator,
    plan: &mut Vec<PlannedShift>,
    events: &mut Vec<EventRecord>,
) {
    for product in [Product::Incidents, Product::IncidentsStandby] {
        split_blocked_days(ctx, config, product, fairness, plan, events);
    }
    reassign_waakdienst_units(ctx, config, fairness, plan, events);
    repair_standby_double_assignments(ctx, config, fairness, plan, events);
}

/// Indices of `plan` grouped per planning unit of one product, in
/// chronological unit order.
fn unit_indices(plan: &[PlannedShift], product: Product) -> BTreeMap<NaiveDate, Vec<usize>> {
    let mut units: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (idx, shift) in plan.iter().enumerate() {
        if shift.product == product {
            units.entry(shift.unit_anchor).or_default().push(idx);
        }
    }
    units
}

fn window_of(shift: &PlannedShift) -> ShiftWindow {
    ShiftWindow {
        product: shift.product,
        unit_anchor: shift.unit_anchor,
        start: shift.start,
        end: shift.end,
    }
}

/// What (if anything) blocks `employee` on this window, evaluated strictly.
fn blocking_kind(
    ctx: &PlanningContext,
    employee: Uuid,
    shift: &PlannedShift,
) -> Option<ConstraintKind> {
    if ctx
        .blocking_leave(employee, shift.product, shift.start, shift.end)
        .is_some()
    {
        return Some(ConstraintKind::ApprovedLeave);
    }
    if ctx.recurring_blocks(employee, shift.product, shift.start, shift.end) {
        return Some(ConstraintKind::RecurringLeave);
    }
    None
}

/// Best replacement for a single window, by the shared constraint and
/// fairness path, excluding the unit's original assignee.
fn find_replacement<'a>(
    ctx: &'a PlanningContext,
    config: &OrchestratorConfig,
    fairness: &FairnessCalculator,
    plan: &[PlannedShift],
    window: &ShiftWindow,
    exclude: Uuid,
) -> Option<&'a Employee> {
    let flagged: Vec<&Employee> = ctx
        .members
        .iter()
        .filter(|m| m.available_for(window.product) && m.id != exclude)
        .collect();

    fairness
        .rank(&flagged, window.product)
        .into_iter()
        .find(|candidate| {
            check_window(ctx, config, candidate, window, plan, false) == Feasibility::Feasible
        })
}

fn split_blocked_days(
    ctx: &PlanningContext,
    config: &OrchestratorConfig,
    product: Product,
    fairness: &mut FairnessCalculator,
    plan: &mut Vec<PlannedShift>,
    events: &mut Vec<EventRecord>,
) {
    for (anchor, indices) in unit_indices(plan, product) {
        let Some(original) = indices.iter().find_map(|&i| plan[i].employee_id) else {
            continue;
        };

        for idx in indices {
            // Later splits may already have moved this day off the original.
            if plan[idx].employee_id != Some(original) {
                continue;
            }
            let Some(kind) = blocking_kind(ctx, original, &plan[idx]) else {
                continue;
            };

            let window = window_of(&plan[idx]);
            let hours = plan[idx].duration_hours();
            match find_replacement(ctx, config, fairness, plan, &window, original) {
                Some(replacement) => {
                    let replacement_id = replacement.id;
                    let replacement_name = replacement.display_name.clone();
                    plan[idx].employee_id = Some(replacement_id);
                    fairness.debit(replacement_id, product, hours);
                    fairness.debit(original, product, -hours);
                    fairness.note_assignment(replacement_id);
                    events.push(EventRecord {
                        employee_id: Some(original),
                        product,
                        window_start: Some(window.start),
                        kind,
                        severity: ConstraintSeverity::Warning,
                        resolution: ConstraintResolution::Split,
                        note: format!(
                            "week of {anchor}: blocked day covered by {replacement_name}"
                        ),
                    });
                }
                None => {
                    plan[idx].employee_id = None;
                    fairness.debit(original, product, -hours);
                    events.push(EventRecord {
                        employee_id: None,
                        product,
                        window_start: Some(window.start),
                        kind: ConstraintKind::MinimumStaffing,
                        severity: ConstraintSeverity::Violation,
                        resolution: ConstraintResolution::Skipped,
                        note: format!(
                            "week of {anchor}: blocked day left unassigned, no replacement"
                        ),
                    });
                }
            }
        }
    }
}

/// Waakdienst units are atomic: if the assignee became infeasible anywhere in
/// the week, the whole unit moves to the next-best engineer.
fn reassign_waakdienst_units(
    ctx: &PlanningContext,
    config: &OrchestratorConfig,
    fairness: &mut FairnessCalculator,
    plan: &mut Vec<PlannedShift>,
    events: &mut Vec<EventRecord>,
) {
    for (anchor, indices) in unit_indices(plan, Product::Waakdienst) {
        let Some(original) = indices.iter().find_map(|&i| plan[i].employee_id) else {
            continue;
        };

        let Some(kind) = indices
            .iter()
            .find_map(|&i| blocking_kind(ctx, original, &plan[i]))
        else {
            continue;
        };

        let unit = PlanningUnit {
            product: Product::Waakdienst,
            anchor,
            windows: indices.iter().map(|&i| window_of(&plan[i])).collect(),
        };
        let total_hours: f64 = indices.iter().map(|&i| plan[i].duration_hours()).sum();

        let flagged: Vec<&Employee> = ctx
            .members
            .iter()
            .filter(|m| m.available_for(Product::Waakdienst) && m.id != original)
            .collect();
        let replacement = fairness
            .rank(&flagged, Product::Waakdienst)
            .into_iter()
            .find(|candidate| {
                matches!(
                    check_unit(ctx, config, candidate, &unit, plan, false),
                    UnitFeasibility::Eligible { .. }
                )
            })
            .map(|e| (e.id, e.display_name.clone()));

        match replacement {
            Some((replacement_id, replacement_name)) => {
                for &i in &indices {
                    plan[i].employee_id = Some(replacement_id);
                }
                fairness.debit(replacement_id, Product::Waakdienst, total_hours);
                fairness.debit(original, Product::Waakdienst, -total_hours);
                fairness.note_assignment(replacement_id);
                events.push(EventRecord {
                    employee_id: Some(original),
                    product: Product::Waakdienst,
                    window_start: unit.windows.first().map(|w| w.start),
                    kind,
                    severity: ConstraintSeverity::Warning,
                    resolution: ConstraintResolution::Reassigned,
                    note: format!("on-call week of {anchor} reassigned to {replacement_name}"),
                });
            }
            None => {
                for &i in &indices {
                    plan[i].employee_id = None;
                }
                fairness.debit(original, Product::Waakdienst, -total_hours);
                events.push(EventRecord {
                    employee_id: None,
                    product: Product::Waakdienst,
                    window_start: unit.windows.first().map(|w| w.start),
                    kind: ConstraintKind::MinimumStaffing,
                    severity: ConstraintSeverity::Violation,
                    resolution: ConstraintResolution::Skipped,
                    note: format!("on-call week of {anchor} left unassigned, no replacement"),
                });
            }
        }
    }
}

/// Same engineer holding Incidents and Standby on the same business day:
/// move the Standby side to the next-best engineer.
fn repair_standby_double_assignments(
    ctx: &PlanningContext,
    config: &OrchestratorConfig,
    fairness: &mut FairnessCalculator,
    plan: &mut Vec<PlannedShift>,
    events: &mut Vec<EventRecord>,
) {
    for idx in 0..plan.len() {
        if plan[idx].product != Product::IncidentsStandby {
            continue;
        }
        let Some(engineer) = plan[idx].employee_id else {
            continue;
        };
        let (start, end) = (plan[idx].start, plan[idx].end);
        let doubled = plan.iter().any(|s| {
            s.product == Product::Incidents
                && s.employee_id == Some(engineer)
                && s.overlaps(start, end)
        });
        if !doubled {
            continue;
        }

        let window = window_of(&plan[idx]);
        let hours = plan[idx].duration_hours();
        match find_replacement(ctx, config, fairness, plan, &window, engineer) {
            Some(replacement) => {
                let replacement_id = replacement.id;
                let replacement_name = replacement.display_name.clone();
                plan[idx].employee_id = Some(replacement_id);
                fairness.debit(replacement_id, Product::IncidentsStandby, hours);
                fairness.debit(engineer, Product::IncidentsStandby, -hours);
                fairness.note_assignment(replacement_id);
                events.push(EventRecord {
                    employee_id: Some(engineer),
                    product: Product::IncidentsStandby,
                    window_start: Some(start),
                    kind: ConstraintKind::DoubleAssignment,
                    severity: ConstraintSeverity::Warning,
                    resolution: ConstraintResolution::Reassigned,
                    note: format!("standby day moved to {replacement_name}"),
                });
            }
            None => {
                plan[idx].employee_id = None;
                fairness.debit(engineer, Product::IncidentsStandby, -hours);
                events.push(EventRecord {
                    employee_id: Some(engineer),
                    product: Product::IncidentsStandby,
                    window_start: Some(start),
                    kind: ConstraintKind::DoubleAssignment,
                    severity: ConstraintSeverity::Violation,
                    resolution: ConstraintResolution::Skipped,
                    note: "standby day unassigned: doubled with incidents, no replacement"
                        .to_string(),
                });
            }
        }
    }
}
