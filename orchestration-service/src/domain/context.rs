use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use shared::time::local_instant;
use shared::types::{
    Employee, Holiday, LeaveRequest, LeaveStatus, Product, RecurringLeavePattern, Shift,
    ShiftTemplate, Team, TeamSettings,
};
use std::collections::HashSet;
use uuid::Uuid;

/// Everything a run needs, fetched once up front.
///
/// The selector loop is pure over this snapshot: no I/O happens between the
/// initial batch load and the final apply, which is what makes plans
/// reproducible for identical inputs.
#[derive(Debug, Clone)]
pub struct PlanningContext {
    pub team: Team,
    pub settings: TeamSettings,
    pub tz: Tz,
    /// Active roster, sorted by id so every iteration order is stable.
    pub members: Vec<Employee>,
    pub leaves: Vec<LeaveRequest>,
    pub recurring: Vec<RecurringLeavePattern>,
    pub holidays: HashSet<chrono::NaiveDate>,
    pub templates: Vec<ShiftTemplate>,
    /// Applied shifts strictly before the horizon start (fairness history and
    /// consecutive-week lookback). Never contains shifts being re-planned.
    pub history: Vec<Shift>,
}

impl PlanningContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        team: Team,
        settings: TeamSettings,
        tz: Tz,
        mut members: Vec<Employee>,
        leaves: Vec<LeaveRequest>,
        recurring: Vec<RecurringLeavePattern>,
        holidays: Vec<Holiday>,
        templates: Vec<ShiftTemplate>,
        history: Vec<Shift>,
    ) -> Self {
        members.retain(|m| m.active);
        members.sort_by_key(|m| m.id);
        Self {
            team,
            settings,
            tz,
            members,
            leaves,
            recurring,
            holidays: holidays.into_iter().map(|h| h.date).collect(),
            templates,
            history,
        }
    }

    pub fn employee(&self, id: Uuid) -> Option<&Employee> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Required skills for a product, from the team's shift template set.
    pub fn required_skills(&self, product: Product) -> &[String] {
        self.templates
            .iter()
            .find(|t| t.product == product)
            .map(|t| t.required_skills.as_slice())
            .unwrap_or(&[])
    }

    pub fn template_id(&self, product: Product) -> Option<Uuid> {
        self.templates
            .iter()
            .find(|t| t.product == product)
            .map(|t| t.id)
    }

    /// First approved leave of `employee` that blocks `product` and intersects
    /// the interval.
    pub fn blocking_leave(
        &self,
        employee: Uuid,
        product: Product,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<&LeaveRequest> {
        self.leaves.iter().find(|l| {
            l.employee_id == employee && l.blocks(product) && l.intersects(start, end)
        })
    }

    /// Whether any approved leave (blocking or not for this product) with the
    /// given status intersects the interval. Used by the availability rollup.
    pub fn leave_intersecting(
        &self,
        employee: Uuid,
        status: LeaveStatus,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bool {
        self.leaves
            .iter()
            .any(|l| l.employee_id == employee && l.status == status && l.intersects(start, end))
    }

    /// Expand the employee's recurring patterns over the civil dates the
    /// interval touches and return true if any expanded occurrence both
    /// blocks `product` and intersects the interval.
    pub fn recurring_blocks(
        &self,
        employee: Uuid,
        product: Product,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bool {
        self.recurring.iter().any(|p| {
            p.employee_id == employee
                && p.coverage.blocks(product)
                && self.pattern_intersects(p, start, end)
        })
    }

    fn pattern_intersects(
        &self,
        pattern: &RecurringLeavePattern,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bool {
        let first = start.with_timezone(&self.tz).date_naive();
        let last = end.with_timezone(&self.tz).date_naive();

        let mut date = first;
        while date <= last {
            if pattern.applies_on(date) {
                let occ_start = local_instant(self.tz, date, pattern.start_time);
                let occ_end = local_instant(self.tz, date, pattern.end_time);
                if shared::time::overlaps(occ_start, occ_end, start, end) {
                    return true;
                }
            }
            date += Duration::days(1);
        }
        false
    }
}
