use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

// Orchestration Service Error
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid horizon: {start} to {end} ({reason})")]
    InvalidHorizon {
        start: NaiveDate,
        end: NaiveDate,
        reason: String,
    },

    #[error("Unknown team: {0}")]
    UnknownTeam(Uuid),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Run {0} not found")]
    RunNotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Team {0} is being scheduled by another run")]
    Busy(Uuid),

    #[error("Run timed out after {0} seconds")]
    Timeout(u64),

    #[error("Internal invariant broken: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Transient failures are worth retrying at the next extender tick;
    /// everything else needs data or code changes first.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Storage(_) | OrchestratorError::Busy(_) | OrchestratorError::Timeout(_)
        )
    }
}
