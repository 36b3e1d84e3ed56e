use chrono::{DateTime, Utc};
use shared::types::{OrchestrationRun, RunStatus};
use uuid::Uuid;

use crate::domain::plan::RunTotals;

/// wrapper for a run in `Pending` status.
/// consuming `start` into `RunningRun`.
pub struct PendingRun {
    inner: OrchestrationRun,
}

/// wrapper for a run in `Running` status.
/// consuming `complete` or `fail` into terminal states.
pub struct RunningRun {
    inner: OrchestrationRun,
}

/// Terminal state: run completed and is immutable from here on.
pub struct CompletedRun {
    inner: OrchestrationRun,
}

/// Terminal state: run failed without applying.
pub struct FailedRun {
    inner: OrchestrationRun,
}

impl PendingRun {
    pub fn from_run(run: OrchestrationRun) -> Option<Self> {
        if run.status == RunStatus::Pending {
            Some(Self { inner: run })
        } else {
            None
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn inner(&self) -> &OrchestrationRun {
        &self.inner
    }

    pub fn start(mut self) -> (RunningRun, Uuid, RunStatus) {
        let id = self.inner.id;
        self.inner.status = RunStatus::Running;
        (RunningRun { inner: self.inner }, id, RunStatus::Running)
    }
}

impl RunningRun {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn inner(&self) -> &OrchestrationRun {
        &self.inner
    }

    pub fn complete(
        mut self,
        totals: RunTotals,
        completed_at: DateTime<Utc>,
    ) -> (CompletedRun, Uuid, RunStatus) {
        let id = self.inner.id;
        self.inner.status = RunStatus::Completed;
        self.inner.shifts_planned = totals.shifts_planned;
        self.inner.shifts_assigned = totals.shifts_assigned;
        self.inner.shifts_unassigned = totals.shifts_unassigned;
        self.inner.violations = totals.violations;
        self.inner.completed_at = Some(completed_at);
        (CompletedRun { inner: self.inner }, id, RunStatus::Completed)
    }

    pub fn fail(mut self, completed_at: DateTime<Utc>) -> (FailedRun, Uuid, RunStatus) {
        let id = self.inner.id;
        self.inner.status = RunStatus::Failed;
        self.inner.completed_at = Some(completed_at);
        (FailedRun { inner: self.inner }, id, RunStatus::Failed)
    }
}

impl CompletedRun {
    pub fn into_inner(self) -> OrchestrationRun {
        self.inner
    }
}

impl FailedRun {
    pub fn into_inner(self) -> OrchestrationRun {
        self.inner
    }
}
