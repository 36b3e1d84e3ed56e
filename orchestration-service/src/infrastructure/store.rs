use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use shared::types::{
    ConstraintEvent, ConstraintKind, ConstraintResolution, ConstraintSeverity, Employee, Holiday,
    LeaveRequest, OrchestrationRun, Product, RecurringLeavePattern, RunStatus, Shift,
    ShiftTemplate, Team, TeamSettings,
};

use crate::domain::apply::{NewShift, ShiftMutation};
use crate::domain::plan::EventRecord;
use crate::domain::store::{RosterStore, RunStore, ShiftStore};
use crate::error::OrchestratorError;

/// Advisory-lock key for a team: the first half of its UUID.
fn team_lock_key(team_id: Uuid) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&team_id.as_bytes()[..8]);
    i64::from_le_bytes(bytes)
}

/// A unique-key collision on apply means another run got there first.
fn map_apply_error(team_id: Uuid, e: sqlx::Error) -> OrchestratorError {
    if let sqlx::Error::Database(db) = &e
        && db.code().as_deref() == Some("23505")
    {
        return OrchestratorError::Busy(team_id);
    }
    OrchestratorError::Storage(e)
}

// region: Roster

pub struct PgRosterStore {
    pool: PgPool,
}

impl PgRosterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RosterStore for PgRosterStore {
    #[tracing::instrument(skip(self))]
    async fn team(&self, team_id: Uuid) -> Result<Option<Team>, OrchestratorError> {
        let team = sqlx::query_as::<_, Team>(
            r#"
            SELECT id, name, department_id
            FROM teams
            WHERE id = $1
            "#,
        )
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(team)
    }

    #[tracing::instrument(skip(self))]
    async fn team_settings(
        &self,
        team_id: Uuid,
    ) -> Result<Option<TeamSettings>, OrchestratorError> {
        let settings = sqlx::query_as::<_, TeamSettings>(
            r#"
            SELECT team_id, auto_schedule, incidents_enabled, standby_enabled,
                   waakdienst_enabled, schedule_on_holidays,
                   incidents_min_staffing, standby_min_staffing, waakdienst_min_staffing
            FROM team_settings
            WHERE team_id = $1
            "#,
        )
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    #[tracing::instrument(skip(self, settings), fields(team_id = %settings.team_id))]
    async fn save_team_settings(&self, settings: TeamSettings) -> Result<(), OrchestratorError> {
        sqlx::query(
            r#"
            INSERT INTO team_settings
                (team_id, auto_schedule, incidents_enabled, standby_enabled,
                 waakdienst_enabled, schedule_on_holidays,
                 incidents_min_staffing, standby_min_staffing, waakdienst_min_staffing)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (team_id) DO UPDATE SET
                auto_schedule = EXCLUDED.auto_schedule,
                incidents_enabled = EXCLUDED.incidents_enabled,
                standby_enabled = EXCLUDED.standby_enabled,
                waakdienst_enabled = EXCLUDED.waakdienst_enabled,
                schedule_on_holidays = EXCLUDED.schedule_on_holidays,
                incidents_min_staffing = EXCLUDED.incidents_min_staffing,
                standby_min_staffing = EXCLUDED.standby_min_staffing,
                waakdienst_min_staffing = EXCLUDED.waakdienst_min_staffing
            "#,
        )
        .bind(settings.team_id)
        .bind(settings.auto_schedule)
        .bind(settings.incidents_enabled)
        .bind(settings.standby_enabled)
        .bind(settings.waakdienst_enabled)
        .bind(settings.schedule_on_holidays)
        .bind(settings.incidents_min_staffing)
        .bind(settings.standby_min_staffing)
        .bind(settings.waakdienst_min_staffing)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn auto_scheduled_teams(&self) -> Result<Vec<TeamSettings>, OrchestratorError> {
        let settings = sqlx::query_as::<_, TeamSettings>(
            r#"
            SELECT team_id, auto_schedule, incidents_enabled, standby_enabled,
                   waakdienst_enabled, schedule_on_holidays,
                   incidents_min_staffing, standby_min_staffing, waakdienst_min_staffing
            FROM team_settings
            WHERE auto_schedule
            ORDER BY team_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(settings)
    }

    #[tracing::instrument(skip(self))]
    async fn members(&self, team_id: Uuid) -> Result<Vec<Employee>, OrchestratorError> {
        let members = sqlx::query_as::<_, Employee>(
            r#"
            SELECT e.id, e.display_name, e.email, e.active,
                   e.available_for_incidents, e.available_for_waakdienst,
                   e.skills, e.seniority_start_date, e.max_consecutive_weeks
            FROM employees e
            JOIN team_memberships m ON m.employee_id = e.id
            WHERE m.team_id = $1
            ORDER BY e.id
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    #[tracing::instrument(skip(self))]
    async fn leaves_overlapping(
        &self,
        team_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LeaveRequest>, OrchestratorError> {
        let leaves = sqlx::query_as::<_, LeaveRequest>(
            r#"
            SELECT l.id, l.employee_id, l.start_ts, l.end_ts,
                   l.status, l.conflict_handling
            FROM leave_requests l
            JOIN team_memberships m ON m.employee_id = l.employee_id
            WHERE m.team_id = $1
              AND l.start_ts < $3
              AND l.end_ts > $2
              AND l.status IN ('APPROVED', 'PENDING')
            ORDER BY l.start_ts
            "#,
        )
        .bind(team_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(leaves)
    }

    #[tracing::instrument(skip(self))]
    async fn recurring_patterns(
        &self,
        team_id: Uuid,
    ) -> Result<Vec<RecurringLeavePattern>, OrchestratorError> {
        let patterns = sqlx::query_as::<_, RecurringLeavePattern>(
            r#"
            SELECT p.id, p.employee_id, p.weekday_mask, p.start_time, p.end_time,
                   p.effective_from, p.effective_until, p.coverage
            FROM recurring_leave_patterns p
            JOIN team_memberships m ON m.employee_id = p.employee_id
            WHERE m.team_id = $1
            ORDER BY p.id
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(patterns)
    }

    #[tracing::instrument(skip(self))]
    async fn holidays_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Holiday>, OrchestratorError> {
        let holidays = sqlx::query_as::<_, Holiday>(
            r#"
            SELECT date, name
            FROM holidays
            WHERE date BETWEEN $1 AND $2
            ORDER BY date
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(holidays)
    }

    #[tracing::instrument(skip(self))]
    async fn templates(&self, team_id: Uuid) -> Result<Vec<ShiftTemplate>, OrchestratorError> {
        let templates = sqlx::query_as::<_, ShiftTemplate>(
            r#"
            SELECT id, team_id, product, required_skills
            FROM shift_templates
            WHERE team_id = $1
            ORDER BY product
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(templates)
    }
}

// endregion: Roster

// region: Shifts

pub struct PgShiftStore {
    pool: PgPool,
}

impl PgShiftStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SHIFT_COLUMNS: &str =
    "id, team_id, template_id, product, employee_id, start_ts, end_ts, run_id, status";

/// One batched round trip for every shift row a run inserts.
async fn insert_shifts(
    tx: &mut sqlx::PgConnection,
    run_id: Uuid,
    shifts: &[&NewShift],
) -> Result<(), sqlx::Error> {
    let team_ids: Vec<Uuid> = shifts.iter().map(|s| s.team_id).collect();
    let template_ids: Vec<Option<Uuid>> = shifts.iter().map(|s| s.template_id).collect();
    let products: Vec<Product> = shifts.iter().map(|s| s.product).collect();
    let employee_ids: Vec<Option<Uuid>> = shifts.iter().map(|s| s.employee_id).collect();
    let start_ts: Vec<DateTime<Utc>> = shifts.iter().map(|s| s.start_ts).collect();
    let end_ts: Vec<DateTime<Utc>> = shifts.iter().map(|s| s.end_ts).collect();
    let run_ids: Vec<Uuid> = vec![run_id; shifts.len()];

    sqlx::query(
        r#"
        INSERT INTO shifts
            (team_id, template_id, product, employee_id, start_ts, end_ts, run_id, status)
        SELECT u.*, 'APPLIED'::shift_status
        FROM UNNEST($1::uuid[], $2::uuid[], $3::product[], $4::uuid[],
                    $5::timestamptz[], $6::timestamptz[], $7::uuid[]) AS u
        "#,
    )
    .bind(&team_ids)
    .bind(&template_ids)
    .bind(&products)
    .bind(&employee_ids)
    .bind(&start_ts)
    .bind(&end_ts)
    .bind(&run_ids)
    .execute(tx)
    .await?;
    Ok(())
}

#[async_trait]
impl ShiftStore for PgShiftStore {
    #[tracing::instrument(skip(self))]
    async fn applied_overlapping(
        &self,
        team_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Shift>, OrchestratorError> {
        let shifts = sqlx::query_as::<_, Shift>(&format!(
            r#"
            SELECT {SHIFT_COLUMNS}
            FROM shifts
            WHERE team_id = $1
              AND status = 'APPLIED'
              AND start_ts < $3
              AND end_ts > $2
            ORDER BY start_ts
            "#
        ))
        .bind(team_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(shifts)
    }

    #[tracing::instrument(skip(self))]
    async fn latest_applied_end(
        &self,
        team_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, OrchestratorError> {
        let latest = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r#"
            SELECT max(end_ts)
            FROM shifts
            WHERE team_id = $1 AND status = 'APPLIED'
            "#,
        )
        .bind(team_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(latest)
    }

    #[tracing::instrument(skip(self, run, events, mutations), fields(run_id = %run.id, team_id = %run.team_id))]
    async fn apply_run(
        &self,
        run: OrchestrationRun,
        events: Vec<EventRecord>,
        mutations: Vec<ShiftMutation>,
    ) -> Result<(), OrchestratorError> {
        let team_id = run.team_id;
        let mut tx = self.pool.begin().await?;

        // Team scheduling lock: held until commit/rollback so two concurrent
        // extenders cannot produce colliding supersessions.
        let locked = sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_xact_lock($1)")
            .bind(team_lock_key(team_id))
            .fetch_one(&mut *tx)
            .await?;
        if !locked {
            return Err(OrchestratorError::Busy(team_id));
        }

        // Supersessions first, then one batched insert for every new row.
        let mut superseded_ids: Vec<Uuid> = Vec::new();
        let mut inserts: Vec<&NewShift> = Vec::new();
        for mutation in &mutations {
            match mutation {
                ShiftMutation::Insert(shift) => inserts.push(shift),
                ShiftMutation::Supersede {
                    existing_id,
                    replacement,
                } => {
                    superseded_ids.push(*existing_id);
                    inserts.push(replacement);
                }
            }
        }

        if !superseded_ids.is_empty() {
            sqlx::query("UPDATE shifts SET status = 'SUPERSEDED' WHERE id = ANY($1)")
                .bind(&superseded_ids)
                .execute(&mut *tx)
                .await?;
        }
        if !inserts.is_empty() {
            insert_shifts(&mut *tx, run.id, &inserts)
                .await
                .map_err(|e| map_apply_error(team_id, e))?;
        }

        if !events.is_empty() {
            let employee_ids: Vec<Option<Uuid>> = events.iter().map(|e| e.employee_id).collect();
            let products: Vec<Product> = events.iter().map(|e| e.product).collect();
            let window_starts: Vec<Option<DateTime<Utc>>> =
                events.iter().map(|e| e.window_start).collect();
            let kinds: Vec<ConstraintKind> = events.iter().map(|e| e.kind).collect();
            let severities: Vec<ConstraintSeverity> = events.iter().map(|e| e.severity).collect();
            let resolutions: Vec<ConstraintResolution> =
                events.iter().map(|e| e.resolution).collect();
            let notes: Vec<String> = events.iter().map(|e| e.note.clone()).collect();
            let run_ids: Vec<Uuid> = vec![run.id; events.len()];

            sqlx::query(
                r#"
                INSERT INTO orchestration_constraints
                    (run_id, employee_id, product, window_start, kind, severity, resolution, note)
                SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::product[], $4::timestamptz[],
                                     $5::constraint_kind[], $6::constraint_severity[],
                                     $7::constraint_resolution[], $8::text[])
                "#,
            )
            .bind(&run_ids)
            .bind(&employee_ids)
            .bind(&products)
            .bind(&window_starts)
            .bind(&kinds)
            .bind(&severities)
            .bind(&resolutions)
            .bind(&notes)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE orchestration_runs
            SET status = $2, shifts_planned = $3, shifts_assigned = $4,
                shifts_unassigned = $5, violations = $6, completed_at = $7
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.status)
        .bind(run.shifts_planned)
        .bind(run.shifts_assigned)
        .bind(run.shifts_unassigned)
        .bind(run.violations)
        .bind(run.completed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

// endregion: Shifts

// region: Runs

pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RUN_COLUMNS: &str = "id, team_id, horizon_start, horizon_end, mode, status, \
     shifts_planned, shifts_assigned, shifts_unassigned, violations, started_at, completed_at";

#[async_trait]
impl RunStore for PgRunStore {
    #[tracing::instrument(skip(self, run), fields(run_id = %run.id))]
    async fn create_run(&self, run: OrchestrationRun) -> Result<(), OrchestratorError> {
        sqlx::query(
            r#"
            INSERT INTO orchestration_runs
                (id, team_id, horizon_start, horizon_end, mode, status,
                 shifts_planned, shifts_assigned, shifts_unassigned, violations,
                 started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(run.id)
        .bind(run.team_id)
        .bind(run.horizon_start)
        .bind(run.horizon_end)
        .bind(run.mode)
        .bind(run.status)
        .bind(run.shifts_planned)
        .bind(run.shifts_assigned)
        .bind(run.shifts_unassigned)
        .bind(run.violations)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_id(
        &self,
        run_id: Uuid,
    ) -> Result<Option<OrchestrationRun>, OrchestratorError> {
        let run = sqlx::query_as::<_, OrchestrationRun>(&format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM orchestration_runs
            WHERE id = $1
            "#
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(run)
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
    ) -> Result<(), OrchestratorError> {
        let result = sqlx::query(
            r#"
            UPDATE orchestration_runs
            SET status = $2,
                completed_at = CASE
                    WHEN $2 IN ('COMPLETED', 'FAILED') THEN now()
                    ELSE completed_at
                END
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::RunNotFound(run_id));
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn events_for(&self, run_id: Uuid) -> Result<Vec<ConstraintEvent>, OrchestratorError> {
        let events = sqlx::query_as::<_, ConstraintEvent>(
            r#"
            SELECT id, run_id, employee_id, product, window_start,
                   kind, severity, resolution, note
            FROM orchestration_constraints
            WHERE run_id = $1
            ORDER BY window_start NULLS FIRST, id
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    #[tracing::instrument(skip(self))]
    async fn shifts_for_run(&self, run_id: Uuid) -> Result<Vec<Shift>, OrchestratorError> {
        let shifts = sqlx::query_as::<_, Shift>(&format!(
            r#"
            SELECT {SHIFT_COLUMNS}
            FROM shifts
            WHERE run_id = $1
            ORDER BY start_ts
            "#
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(shifts)
    }

    #[tracing::instrument(skip(self))]
    async fn fail_stale_runs(&self) -> Result<u64, OrchestratorError> {
        let result = sqlx::query(
            r#"
            UPDATE orchestration_runs
            SET status = 'FAILED', completed_at = now()
            WHERE status IN ('PENDING', 'RUNNING')
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// endregion: Runs

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_stable_per_team() {
        let team = Uuid::new_v4();
        assert_eq!(team_lock_key(team), team_lock_key(team));
        assert_ne!(team_lock_key(team), team_lock_key(Uuid::new_v4()));
    }
}
