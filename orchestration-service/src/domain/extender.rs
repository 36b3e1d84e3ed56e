use chrono::{Months, NaiveDate};
use shared::types::RunMode;
use uuid::Uuid;

use crate::domain::service::{OrchestrationService, RunSummary};
use crate::error::OrchestratorError;

impl OrchestrationService {
    /// Extend one team's schedule so applied coverage reaches
    /// `today + horizon_months`.
    ///
    /// Returns `Ok(None)` when the horizon already extends far enough. The
    /// gap run starts at the civil date of the latest applied shift end (the
    /// boundary week is regenerated and deduped by the idempotent apply), or
    /// at `today` for a team with no applied shifts yet.
    #[tracing::instrument(skip(self))]
    pub async fn extend_team(
        &self,
        team_id: Uuid,
        today: NaiveDate,
    ) -> Result<Option<RunSummary>, OrchestratorError> {
        let tz = self.config().timezone();
        let target_end = today
            .checked_add_months(Months::new(self.config().horizon_months))
            .ok_or_else(|| {
                OrchestratorError::Internal(format!("horizon overflow from {today}"))
            })?;

        let current_end = self
            .shifts_latest_applied_end(team_id)
            .await?
            .map(|ts| ts.with_timezone(&tz).date_naive())
            .unwrap_or(today);

        if current_end >= target_end {
            tracing::info!(%team_id, %current_end, %target_end, "Horizon already extends far enough");
            return Ok(None);
        }

        tracing::info!(%team_id, %current_end, %target_end, "Extending schedule");
        let summary = self
            .create_run(team_id, current_end, target_end, vec![], RunMode::Apply)
            .await?;
        Ok(Some(summary))
    }

    /// Mark runs a crashed process left `Pending`/`Running` as failed, so the
    /// audit log never shows a run as live across restarts.
    #[tracing::instrument(skip(self))]
    pub async fn recover_stale_runs(&self) -> Result<u64, OrchestratorError> {
        let failed = self.runs_fail_stale().await?;
        if failed == 0 {
            tracing::info!("No stale runs to recover");
        } else {
            tracing::warn!(count = failed, "Marked stale runs as failed");
        }
        Ok(failed)
    }
}
