use chrono::NaiveDate;
use shared::types::{
    ConstraintKind, ConstraintResolution, ConstraintSeverity, Employee, Product, ShiftStatus,
};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::domain::constraints::{SkipReason, UnitFeasibility, check_unit, unit_anchor_of};
use crate::domain::context::PlanningContext;
use crate::domain::fairness::FairnessCalculator;
use crate::domain::plan::{EventRecord, PlannedShift};
use crate::domain::windows::PlanningUnit;

/// Plan one product: walk its units chronologically and, per unit, the
/// fairness-ranked candidates until the first fully feasible one.
///
/// Candidates passed over on the way to the pick are recorded as audit
/// events, since their skip changed the outcome. A unit with no feasible
/// candidate still enters the plan as unassigned placeholders so the gap is
/// visible downstream.
pub fn plan_product(
    ctx: &PlanningContext,
    config: &OrchestratorConfig,
    product: Product,
    units: &[PlanningUnit],
    fairness: &mut FairnessCalculator,
    plan: &mut Vec<PlannedShift>,
    events: &mut Vec<EventRecord>,
) {
    let template_id = ctx.template_id(product);
    let flagged: Vec<&Employee> = ctx
        .members
        .iter()
        .filter(|m| m.available_for(product))
        .collect();

    // Team staffing floor: a rotation pool below the configured minimum is
    // reported once per run, before any unit is planned.
    if let Some(floor) = ctx.settings.min_staffing(product)
        && !units.is_empty()
        && (flagged.len() as i16) < floor
    {
        tracing::warn!(
            product = %product,
            eligible = flagged.len(),
            floor,
            "Rotation pool below the configured staffing minimum"
        );
        events.push(EventRecord {
            employee_id: None,
            product,
            window_start: None,
            kind: ConstraintKind::MinimumStaffing,
            severity: ConstraintSeverity::Warning,
            resolution: ConstraintResolution::Accepted,
            note: format!(
                "{} eligible engineers, team minimum is {floor}",
                flagged.len()
            ),
        });
    }

    for unit in units {
        let mut ranked = fairness.rank(&flagged, product);
        // A partial unit whose earlier windows were applied by a previous run
        // already has an intended assignee; keep the week with them when
        // still feasible.
        if let Some(applied_assignee) = applied_unit_assignee(ctx, product, unit.anchor)
            && let Some(pos) = ranked.iter().position(|e| e.id == applied_assignee)
        {
            let sticky = ranked.remove(pos);
            ranked.insert(0, sticky);
        }
        let mut chosen: Option<(&Employee, Vec<(usize, SkipReason)>)> = None;

        for candidate in ranked {
            match check_unit(ctx, config, candidate, unit, plan, true) {
                UnitFeasibility::Eligible { warnings } => {
                    chosen = Some((candidate, warnings));
                    break;
                }
                UnitFeasibility::Disqualified(reason) => {
                    if let Some(kind) = reason.kind() {
                        events.push(EventRecord {
                            employee_id: Some(candidate.id),
                            product,
                            window_start: unit.windows.first().map(|w| w.start),
                            kind,
                            severity: ConstraintSeverity::Info,
                            resolution: ConstraintResolution::Skipped,
                            note: format!(
                                "{} skipped for week of {}: {}",
                                candidate.display_name,
                                unit.anchor,
                                reason.describe()
                            ),
                        });
                    }
                }
            }
        }

        match chosen {
            Some((engineer, warnings)) => {
                for (idx, reason) in &warnings {
                    events.push(EventRecord {
                        employee_id: Some(engineer.id),
                        product,
                        window_start: unit.windows.get(*idx).map(|w| w.start),
                        kind: ConstraintKind::RecurringLeave,
                        severity: ConstraintSeverity::Warning,
                        resolution: ConstraintResolution::Accepted,
                        note: format!(
                            "{} assigned week of {} with {}",
                            engineer.display_name,
                            unit.anchor,
                            reason.describe()
                        ),
                    });
                }
                for window in &unit.windows {
                    plan.push(PlannedShift {
                        product,
                        unit_anchor: unit.anchor,
                        start: window.start,
                        end: window.end,
                        employee_id: Some(engineer.id),
                        template_id,
                    });
                }
                fairness.debit(engineer.id, product, unit.total_hours());
                fairness.note_assignment(engineer.id);
            }
            None => {
                tracing::warn!(
                    product = %product,
                    anchor = %unit.anchor,
                    "No feasible engineer for planning unit"
                );
                events.push(EventRecord {
                    employee_id: None,
                    product,
                    window_start: unit.windows.first().map(|w| w.start),
                    kind: ConstraintKind::MinimumStaffing,
                    severity: ConstraintSeverity::Violation,
                    resolution: ConstraintResolution::Skipped,
                    note: format!("week of {} left unassigned: no feasible engineer", unit.anchor),
                });
                for window in &unit.windows {
                    plan.push(PlannedShift {
                        product,
                        unit_anchor: unit.anchor,
                        start: window.start,
                        end: window.end,
                        employee_id: None,
                        template_id,
                    });
                }
            }
        }
    }
}

/// The engineer a previous run already applied for this planning unit, if
/// any of its windows reach into this run's history.
fn applied_unit_assignee(
    ctx: &PlanningContext,
    product: Product,
    anchor: NaiveDate,
) -> Option<Uuid> {
    ctx.history
        .iter()
        .filter(|s| s.product == product && s.status == ShiftStatus::Applied)
        .find(|s| unit_anchor_of(ctx.tz, product, s.start_ts) == anchor)
        .and_then(|s| s.employee_id)
}
