use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::types::{
    ConstraintEvent, Employee, Holiday, LeaveRequest, OrchestrationRun, RecurringLeavePattern,
    RunStatus, Shift, ShiftTemplate, Team, TeamSettings,
};
use uuid::Uuid;

use crate::domain::apply::ShiftMutation;
use crate::domain::plan::EventRecord;
use crate::error::OrchestratorError;

/// Read contracts over the externally-owned roster and leave models.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait RosterStore: Send + Sync {
    async fn team(&self, team_id: Uuid) -> Result<Option<Team>, OrchestratorError>;
    async fn team_settings(&self, team_id: Uuid)
    -> Result<Option<TeamSettings>, OrchestratorError>;
    async fn save_team_settings(&self, settings: TeamSettings) -> Result<(), OrchestratorError>;
    async fn auto_scheduled_teams(&self) -> Result<Vec<TeamSettings>, OrchestratorError>;
    async fn members(&self, team_id: Uuid) -> Result<Vec<Employee>, OrchestratorError>;
    /// Approved and pending leave intersecting the interval (pending is
    /// display-only; the evaluator filters by status).
    async fn leaves_overlapping(
        &self,
        team_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LeaveRequest>, OrchestratorError>;
    async fn recurring_patterns(
        &self,
        team_id: Uuid,
    ) -> Result<Vec<RecurringLeavePattern>, OrchestratorError>;
    async fn holidays_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Holiday>, OrchestratorError>;
    async fn templates(&self, team_id: Uuid) -> Result<Vec<ShiftTemplate>, OrchestratorError>;
}

/// Write contract over the shift table this service owns.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait ShiftStore: Send + Sync {
    /// Applied (non-superseded) shifts intersecting `[from, to)`.
    async fn applied_overlapping(
        &self,
        team_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Shift>, OrchestratorError>;
    async fn latest_applied_end(
        &self,
        team_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, OrchestratorError>;
    /// Execute every mutation, the audit events and the run completion in one
    /// transaction under the team scheduling lock. All or nothing.
    async fn apply_run(
        &self,
        run: OrchestrationRun,
        events: Vec<EventRecord>,
        mutations: Vec<ShiftMutation>,
    ) -> Result<(), OrchestratorError>;
}

/// Persistence for the run audit log.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, run: OrchestrationRun) -> Result<(), OrchestratorError>;
    async fn find_by_id(
        &self,
        run_id: Uuid,
    ) -> Result<Option<OrchestrationRun>, OrchestratorError>;
    async fn update_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
    ) -> Result<(), OrchestratorError>;
    async fn events_for(&self, run_id: Uuid) -> Result<Vec<ConstraintEvent>, OrchestratorError>;
    async fn shifts_for_run(&self, run_id: Uuid) -> Result<Vec<Shift>, OrchestratorError>;
    /// Mark runs left `Pending`/`Running` by a crashed process as `Failed`.
    async fn fail_stale_runs(&self) -> Result<u64, OrchestratorError>;
}
