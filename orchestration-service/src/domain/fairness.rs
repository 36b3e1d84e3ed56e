use chrono::{DateTime, Utc};
use shared::types::{Employee, Product, Shift, ShiftStatus};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::OrchestratorConfig;

const HOURS_PER_WEEK: f64 = 168.0;

/// Per-run fairness snapshot: decayed historical load per `(employee,
/// product)`, plus the debit of everything assigned so far in this run.
///
/// Built once from the prefetched history and never persisted; the next run
/// rebuilds it from scratch (memoizing across runs would leak stale state).
#[derive(Debug)]
pub struct FairnessCalculator {
    historical: HashMap<(Uuid, Product), f64>,
    debits: HashMap<(Uuid, Product), f64>,
    run_assignments: HashMap<Uuid, u32>,
    bonuses: HashMap<Uuid, f64>,
}

impl FairnessCalculator {
    /// Build the snapshot. `reference` is the horizon start instant: decay is
    /// measured against it, never against the wall clock, so identical inputs
    /// reproduce identical orderings.
    pub fn build(
        config: &OrchestratorConfig,
        reference: DateTime<Utc>,
        members: &[Employee],
        history: &[Shift],
    ) -> Self {
        let mut historical: HashMap<(Uuid, Product), f64> = HashMap::new();

        for shift in history {
            if shift.status != ShiftStatus::Applied || shift.start_ts >= reference {
                continue;
            }
            let Some(employee_id) = shift.employee_id else {
                continue;
            };
            let hours = shared::time::elapsed_hours(shift.start_ts, shift.end_ts);
            let age_weeks =
                (reference - shift.start_ts).num_hours() as f64 / HOURS_PER_WEEK;
            let half_life = config.half_life_weeks(shift.product);
            let weighted = hours * (-age_weeks / half_life).exp();
            *historical.entry((employee_id, shift.product)).or_default() += weighted;
        }

        let bonus = config.fairness.availability_bonus;
        let bonuses = members
            .iter()
            .map(|m| {
                // Engineers carrying only one of the two availability flags
                // get the (default zero) rarely-available compensation.
                let limited = !(m.available_for_incidents && m.available_for_waakdienst);
                (m.id, if limited { bonus } else { 0.0 })
            })
            .collect();

        Self {
            historical,
            debits: HashMap::new(),
            run_assignments: HashMap::new(),
            bonuses,
        }
    }

    /// Lower is preferred.
    pub fn score(&self, employee: Uuid, product: Product) -> f64 {
        let key = (employee, product);
        self.historical.get(&key).copied().unwrap_or(0.0)
            + self.debits.get(&key).copied().unwrap_or(0.0)
            - self.bonuses.get(&employee).copied().unwrap_or(0.0)
    }

    /// Record hours assigned (or, negative, released) in the current run.
    pub fn debit(&mut self, employee: Uuid, product: Product, hours: f64) {
        *self.debits.entry((employee, product)).or_default() += hours;
    }

    /// Bump the run-local assignment counter used as the first tie-break.
    pub fn note_assignment(&mut self, employee: Uuid) {
        *self.run_assignments.entry(employee).or_default() += 1;
    }

    pub fn assignments_of(&self, employee: Uuid) -> u32 {
        self.run_assignments.get(&employee).copied().unwrap_or(0)
    }

    /// Total, reproducible preference order: score, then fewest assignments
    /// this run, then seniority, then id.
    pub fn rank<'a>(&self, candidates: &[&'a Employee], product: Product) -> Vec<&'a Employee> {
        let mut ranked = candidates.to_vec();
        ranked.sort_by(|a, b| {
            self.score(a.id, product)
                .total_cmp(&self.score(b.id, product))
                .then_with(|| self.assignments_of(a.id).cmp(&self.assignments_of(b.id)))
                .then_with(|| a.seniority_start_date.cmp(&b.seniority_start_date))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked
    }

    /// Stable per-employee snapshot for the run log.
    pub fn snapshot(&self, members: &[Employee]) -> Vec<(Uuid, Product, f64)> {
        let mut rows = Vec::with_capacity(members.len() * Product::PLANNING_ORDER.len());
        for member in members {
            for product in Product::PLANNING_ORDER {
                rows.push((member.id, product, self.score(member.id, product)));
            }
        }
        rows
    }
}
