use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use shared::time::{end_of_day, start_of_day};
use shared::types::{
    ConstraintEvent, LeaveStatus, OrchestrationRun, Product, RunMode, RunStatus, Shift, Team,
    TeamSettings,
};

use crate::config::OrchestratorConfig;
use crate::domain::apply::{ApplyOutcome, NewShift, diff_against_existing};
use crate::domain::context::PlanningContext;
use crate::domain::fairness::FairnessCalculator;
use crate::domain::plan::{EventRecord, PlanOutcome, PlannedShift, RunTotals};
use crate::domain::reassign::resolve_conflicts;
use crate::domain::run_state::PendingRun;
use crate::domain::selector::plan_product;
use crate::domain::store::{RosterStore, RunStore, ShiftStore};
use crate::domain::windows::{PlanningUnit, generate_units};
use crate::error::OrchestratorError;

/// What a run returned to its caller: the plan structure, the audit events,
/// and (apply mode only) the persistence outcome.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub team_id: Uuid,
    pub horizon_start: NaiveDate,
    pub horizon_end: NaiveDate,
    pub mode: RunMode,
    pub totals: RunTotals,
    pub outcome: Option<ApplyOutcome>,
    pub shifts: Vec<PlannedShift>,
    pub events: Vec<EventRecord>,
}

/// A persisted run with its audit trail, for `get_run`.
#[derive(Debug)]
pub struct RunDetails {
    pub run: OrchestrationRun,
    pub events: Vec<ConstraintEvent>,
    pub shifts: Vec<Shift>,
}

/// One interval of the coverage view: an applied shift, an unassigned
/// placeholder, or a gap where nothing is scheduled at all.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub product: Option<Product>,
    pub employee_id: Option<Uuid>,
    pub covered: bool,
}

/// Per-employee availability rollup over a date range.
///
/// Pending leave never blocks selection; its day count is carried for
/// display only.
#[derive(Debug, Clone)]
pub struct EmployeeAvailability {
    pub employee_id: Uuid,
    pub display_name: String,
    pub available_for_product: bool,
    pub approved_leave_days: u32,
    pub pending_leave_days: u32,
    pub recurring_leave_days: u32,
    pub assigned_hours: f64,
}

/// Orchestrates scheduling runs: horizon validation, context load, the pure
/// planning pipeline, and preview/apply semantics. This is the stable
/// contract an external HTTP layer adapts.
pub struct OrchestrationService {
    roster: Arc<dyn RosterStore>,
    shifts: Arc<dyn ShiftStore>,
    runs: Arc<dyn RunStore>,
    config: OrchestratorConfig,
}

impl OrchestrationService {
    pub fn new(
        roster: Arc<dyn RosterStore>,
        shifts: Arc<dyn ShiftStore>,
        runs: Arc<dyn RunStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            roster,
            shifts,
            runs,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Settings of every team with automatic scheduling enabled.
    pub async fn auto_scheduled_teams(&self) -> Result<Vec<TeamSettings>, OrchestratorError> {
        self.roster.auto_scheduled_teams().await
    }

    pub(crate) async fn shifts_latest_applied_end(
        &self,
        team_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, OrchestratorError> {
        self.shifts.latest_applied_end(team_id).await
    }

    pub(crate) async fn runs_fail_stale(&self) -> Result<u64, OrchestratorError> {
        self.runs.fail_stale_runs().await
    }

    /// Plan (and in apply mode persist) one run over the horizon.
    ///
    /// An empty `products` list means "every product the team has enabled".
    /// The per-run timeout is enforced at the suspension points: the batch
    /// load, the existing-shift read, and the final transactional apply. The
    /// selection loop itself runs to completion once started.
    #[tracing::instrument(skip(self))]
    pub async fn create_run(
        &self,
        team_id: Uuid,
        horizon_start: NaiveDate,
        horizon_end: NaiveDate,
        products: Vec<Product>,
        mode: RunMode,
    ) -> Result<RunSummary, OrchestratorError> {
        if horizon_end < horizon_start {
            return Err(OrchestratorError::InvalidHorizon {
                start: horizon_start,
                end: horizon_end,
                reason: "horizon end before start".to_string(),
            });
        }

        let team = self
            .roster
            .team(team_id)
            .await?
            .ok_or(OrchestratorError::UnknownTeam(team_id))?;
        let settings = self
            .roster
            .team_settings(team_id)
            .await?
            .unwrap_or_else(|| default_settings(team_id));

        let products = if products.is_empty() {
            settings.enabled_products()
        } else {
            // Normalize to the fixed planning order, dropping duplicates.
            Product::PLANNING_ORDER
                .into_iter()
                .filter(|p| products.contains(p))
                .collect()
        };

        let deadline = Instant::now() + std::time::Duration::from_secs(self.config.run_timeout_secs);

        let ctx = self
            .at_deadline(
                deadline,
                self.load_context(team, settings, horizon_start, horizon_end),
            )
            .await??;

        let outcome = build_plan(&ctx, &self.config, horizon_start, horizon_end, &products)?;
        tracing::info!(
            shifts = outcome.shifts.len(),
            unassigned = outcome.totals.shifts_unassigned,
            violations = outcome.totals.violations,
            "Plan built"
        );

        let run_id = Uuid::new_v4();
        let summary = |apply_outcome| RunSummary {
            run_id,
            team_id,
            horizon_start,
            horizon_end,
            mode,
            totals: outcome.totals,
            outcome: apply_outcome,
            shifts: outcome.shifts.clone(),
            events: outcome.events.clone(),
        };

        if mode == RunMode::Preview {
            return Ok(summary(None));
        }

        let run = OrchestrationRun {
            id: run_id,
            team_id,
            horizon_start,
            horizon_end,
            mode,
            status: RunStatus::Pending,
            shifts_planned: 0,
            shifts_assigned: 0,
            shifts_unassigned: 0,
            violations: 0,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.runs.create_run(run.clone()).await?;
        let pending = PendingRun::from_run(run).ok_or_else(|| {
            OrchestratorError::Internal(format!("Newly created run {run_id} is not pending"))
        })?;
        let (running, id, status) = pending.start();
        self.runs.update_status(id, status).await?;

        let apply_result = self
            .apply_plan(deadline, running, &ctx, &outcome)
            .await;
        match apply_result {
            Ok(apply_outcome) => Ok(summary(Some(apply_outcome))),
            Err(e) => {
                if let Err(update_err) = self.runs.update_status(run_id, RunStatus::Failed).await {
                    tracing::error!(%run_id, "Failed to mark run as failed: {update_err}");
                }
                Err(e)
            }
        }
    }

    /// Diff against the persisted state and commit run + events + mutations
    /// in one transaction.
    async fn apply_plan(
        &self,
        deadline: Instant,
        running: crate::domain::run_state::RunningRun,
        ctx: &PlanningContext,
        outcome: &PlanOutcome,
    ) -> Result<ApplyOutcome, OrchestratorError> {
        let team_id = ctx.team.id;
        let planned: Vec<NewShift> = outcome
            .shifts
            .iter()
            .map(|s| NewShift::from_planned(team_id, s))
            .collect();

        let (diff_from, diff_to) = match plan_bounds(&outcome.shifts) {
            Some(bounds) => bounds,
            None => {
                // Nothing to persist; complete the run with empty totals.
                let (completed, _, _) = running.complete(outcome.totals, Utc::now());
                self.shifts
                    .apply_run(completed.into_inner(), outcome.events.clone(), Vec::new())
                    .await?;
                return Ok(ApplyOutcome::default());
            }
        };

        let existing = self
            .at_deadline(
                deadline,
                self.shifts.applied_overlapping(team_id, diff_from, diff_to),
            )
            .await??;

        let diff = diff_against_existing(&existing, &planned);
        let apply_outcome = ApplyOutcome {
            inserted: diff.inserted(),
            superseded: diff.superseded(),
            kept: diff.kept,
        };

        let (completed, _, _) = running.complete(outcome.totals, Utc::now());
        self.at_deadline(
            deadline,
            self.shifts
                .apply_run(completed.into_inner(), outcome.events.clone(), diff.mutations),
        )
        .await??;

        tracing::info!(
            inserted = apply_outcome.inserted,
            superseded = apply_outcome.superseded,
            kept = apply_outcome.kept,
            "Run applied"
        );
        Ok(apply_outcome)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_run(&self, run_id: Uuid) -> Result<RunDetails, OrchestratorError> {
        let run = self
            .runs
            .find_by_id(run_id)
            .await?
            .ok_or(OrchestratorError::RunNotFound(run_id))?;
        let events = self.runs.events_for(run_id).await?;
        let shifts = self.runs.shifts_for_run(run_id).await?;
        Ok(RunDetails { run, events, shifts })
    }

    #[tracing::instrument(skip(self))]
    pub async fn enable_auto(&self, team_id: Uuid) -> Result<TeamSettings, OrchestratorError> {
        self.set_auto(team_id, true).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn disable_auto(&self, team_id: Uuid) -> Result<TeamSettings, OrchestratorError> {
        self.set_auto(team_id, false).await
    }

    async fn set_auto(
        &self,
        team_id: Uuid,
        enabled: bool,
    ) -> Result<TeamSettings, OrchestratorError> {
        let mut settings = self.settings_for(team_id).await?;
        settings.auto_schedule = enabled;
        self.roster.save_team_settings(settings.clone()).await?;
        Ok(settings)
    }

    #[tracing::instrument(skip(self))]
    pub async fn toggle_product(
        &self,
        team_id: Uuid,
        product: Product,
        enabled: bool,
    ) -> Result<TeamSettings, OrchestratorError> {
        let mut settings = self.settings_for(team_id).await?;
        match product {
            Product::Incidents => settings.incidents_enabled = enabled,
            Product::IncidentsStandby => settings.standby_enabled = enabled,
            Product::Waakdienst => settings.waakdienst_enabled = enabled,
        }
        self.roster.save_team_settings(settings.clone()).await?;
        Ok(settings)
    }

    async fn settings_for(&self, team_id: Uuid) -> Result<TeamSettings, OrchestratorError> {
        self.roster
            .team(team_id)
            .await?
            .ok_or(OrchestratorError::UnknownTeam(team_id))?;
        Ok(self
            .roster
            .team_settings(team_id)
            .await?
            .unwrap_or_else(|| default_settings(team_id)))
    }

    /// Per-interval coverage view: applied shifts plus the gaps between them.
    #[tracing::instrument(skip(self))]
    pub async fn coverage(
        &self,
        team_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        product: Option<Product>,
    ) -> Result<Vec<CoverageSlot>, OrchestratorError> {
        if end_date < start_date {
            return Err(OrchestratorError::InvalidHorizon {
                start: start_date,
                end: end_date,
                reason: "range end before start".to_string(),
            });
        }
        let tz = self.config.timezone();
        let from = start_of_day(tz, start_date);
        let to = end_of_day(tz, end_date);

        let mut shifts = self.shifts.applied_overlapping(team_id, from, to).await?;
        if let Some(product) = product {
            shifts.retain(|s| s.product == product);
        }
        shifts.sort_by_key(|s| s.start_ts);

        let mut slots: Vec<CoverageSlot> = shifts
            .iter()
            .map(|s| CoverageSlot {
                start: s.start_ts,
                end: s.end_ts,
                product: Some(s.product),
                employee_id: s.employee_id,
                covered: s.employee_id.is_some(),
            })
            .collect();

        // Uncovered sub-intervals of the requested range, from the merged
        // assigned coverage.
        let mut cursor = from;
        for shift in shifts.iter().filter(|s| s.employee_id.is_some()) {
            if shift.start_ts > cursor {
                slots.push(gap(cursor, shift.start_ts));
            }
            cursor = cursor.max(shift.end_ts);
        }
        if cursor < to {
            slots.push(gap(cursor, to));
        }

        slots.sort_by_key(|s| (s.start, s.end));
        Ok(slots)
    }

    /// Per-employee availability rollup for one product over a date range.
    #[tracing::instrument(skip(self))]
    pub async fn availability(
        &self,
        team_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        product: Product,
    ) -> Result<Vec<EmployeeAvailability>, OrchestratorError> {
        if end_date < start_date {
            return Err(OrchestratorError::InvalidHorizon {
                start: start_date,
                end: end_date,
                reason: "range end before start".to_string(),
            });
        }
        let team = self
            .roster
            .team(team_id)
            .await?
            .ok_or(OrchestratorError::UnknownTeam(team_id))?;
        let settings = self
            .roster
            .team_settings(team_id)
            .await?
            .unwrap_or_else(|| default_settings(team_id));

        let tz = self.config.timezone();
        let from = start_of_day(tz, start_date);
        let to = end_of_day(tz, end_date);

        let members = self.roster.members(team_id).await?;
        let leaves = self.roster.leaves_overlapping(team_id, from, to).await?;
        let recurring = self.roster.recurring_patterns(team_id).await?;
        let assigned = self.shifts.applied_overlapping(team_id, from, to).await?;

        let ctx = PlanningContext::new(
            team,
            settings,
            tz,
            members,
            leaves,
            recurring,
            vec![],
            vec![],
            vec![],
        );

        let mut rollup = Vec::with_capacity(ctx.members.len());
        for member in &ctx.members {
            let mut approved_leave_days = 0;
            let mut pending_leave_days = 0;
            let mut recurring_leave_days = 0;
            let mut date = start_date;
            while date <= end_date {
                let day_start = start_of_day(tz, date);
                let day_end = end_of_day(tz, date);
                if ctx
                    .blocking_leave(member.id, product, day_start, day_end)
                    .is_some()
                {
                    approved_leave_days += 1;
                }
                if ctx.leave_intersecting(member.id, LeaveStatus::Pending, day_start, day_end) {
                    pending_leave_days += 1;
                }
                if ctx.recurring_blocks(member.id, product, day_start, day_end) {
                    recurring_leave_days += 1;
                }
                date += Duration::days(1);
            }

            let assigned_hours = assigned
                .iter()
                .filter(|s| s.employee_id == Some(member.id) && s.product == product)
                .map(|s| shared::time::elapsed_hours(s.start_ts, s.end_ts))
                .sum();

            rollup.push(EmployeeAvailability {
                employee_id: member.id,
                display_name: member.display_name.clone(),
                available_for_product: member.available_for(product),
                approved_leave_days,
                pending_leave_days,
                recurring_leave_days,
                assigned_hours,
            });
        }
        Ok(rollup)
    }

    /// Batch load of everything the planning pipeline reads.
    async fn load_context(
        &self,
        team: Team,
        settings: TeamSettings,
        horizon_start: NaiveDate,
        horizon_end: NaiveDate,
    ) -> Result<PlanningContext, OrchestratorError> {
        let tz = self.config.timezone();
        let h_start = start_of_day(tz, horizon_start);
        let h_end = end_of_day(tz, horizon_end);
        // On-call weeks reach a few days past either edge of the horizon.
        let leave_from = h_start - Duration::days(7);
        let leave_to = h_end + Duration::days(7);
        let history_since = h_start - Duration::weeks(self.config.history_weeks);

        let team_id = team.id;
        let members = self.roster.members(team_id).await?;
        let leaves = self
            .roster
            .leaves_overlapping(team_id, leave_from, leave_to)
            .await?;
        let recurring = self.roster.recurring_patterns(team_id).await?;
        let holidays = self
            .roster
            .holidays_between(horizon_start - Duration::days(7), horizon_end)
            .await?;
        let templates = self.roster.templates(team_id).await?;
        let history = self
            .shifts
            .applied_overlapping(team_id, history_since, h_start)
            .await?;

        tracing::debug!(
            members = members.len(),
            leaves = leaves.len(),
            recurring = recurring.len(),
            history = history.len(),
            "Planning context loaded"
        );

        Ok(PlanningContext::new(
            team, settings, tz, members, leaves, recurring, holidays, templates, history,
        ))
    }

    async fn at_deadline<T>(
        &self,
        deadline: Instant,
        fut: impl Future<Output = T>,
    ) -> Result<T, OrchestratorError> {
        tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| OrchestratorError::Timeout(self.config.run_timeout_secs))
    }
}

/// Parse wire product codes (canonical or aliased) into typed products.
///
/// This is the adapter the external HTTP layer calls before `create_run`;
/// unknown codes surface as `UnknownProduct`.
pub fn parse_products(codes: &[String]) -> Result<Vec<Product>, OrchestratorError> {
    codes
        .iter()
        .map(|code| {
            code.parse::<Product>()
                .map_err(|_| OrchestratorError::UnknownProduct(code.clone()))
        })
        .collect()
}

fn default_settings(team_id: Uuid) -> TeamSettings {
    TeamSettings {
        team_id,
        auto_schedule: false,
        incidents_enabled: true,
        standby_enabled: false,
        waakdienst_enabled: true,
        schedule_on_holidays: false,
        incidents_min_staffing: None,
        standby_min_staffing: None,
        waakdienst_min_staffing: None,
    }
}

fn gap(start: DateTime<Utc>, end: DateTime<Utc>) -> CoverageSlot {
    CoverageSlot {
        start,
        end,
        product: None,
        employee_id: None,
        covered: false,
    }
}

/// Earliest window start and latest window end of the plan.
fn plan_bounds(shifts: &[PlannedShift]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let min = shifts.iter().map(|s| s.start).min()?;
    let max = shifts.iter().map(|s| s.end).max()?;
    Some((min, max))
}

/// The pure planning pipeline: window generation per product, the
/// fairness-driven selector in fixed product order, then the reassignment
/// pass over the whole plan. No I/O.
pub fn build_plan(
    ctx: &PlanningContext,
    config: &OrchestratorConfig,
    horizon_start: NaiveDate,
    horizon_end: NaiveDate,
    products: &[Product],
) -> Result<PlanOutcome, OrchestratorError> {
    let tz = ctx.tz;
    let mut per_product: Vec<(Product, Vec<PlanningUnit>)> = Vec::with_capacity(products.len());
    for product in Product::PLANNING_ORDER {
        if !products.contains(&product) {
            continue;
        }
        let units = generate_units(
            product,
            tz,
            horizon_start,
            horizon_end,
            &ctx.holidays,
            ctx.settings.schedule_on_holidays,
        )?;
        per_product.push((product, units));
    }

    // Fairness decay is measured against the earliest planned instant, and
    // history rows at or after it are excluded: a window being (re)planned
    // must never count as its own history, or re-runs would drift.
    let cutoff = per_product
        .iter()
        .flat_map(|(_, units)| units.iter())
        .flat_map(|u| u.windows.iter())
        .map(|w| w.start)
        .min()
        .unwrap_or_else(|| start_of_day(tz, horizon_start));
    let fairness_history: Vec<_> = ctx
        .history
        .iter()
        .filter(|s| s.start_ts < cutoff)
        .cloned()
        .collect();
    let mut fairness = FairnessCalculator::build(config, cutoff, &ctx.members, &fairness_history);
    for (employee, product, score) in fairness.snapshot(&ctx.members) {
        tracing::debug!(%employee, %product, score, "Fairness snapshot");
    }

    let mut shifts = Vec::new();
    let mut events = Vec::new();
    for (product, units) in &per_product {
        plan_product(
            ctx,
            config,
            *product,
            units,
            &mut fairness,
            &mut shifts,
            &mut events,
        );
    }

    resolve_conflicts(ctx, config, &mut fairness, &mut shifts, &mut events);

    let totals = RunTotals::tally(&shifts, &events);
    Ok(PlanOutcome {
        shifts,
        events,
        totals,
    })
}
