use orchestration_service::{
    config::OrchestratorConfig,
    domain::service::OrchestrationService,
    infrastructure::store::{PgRosterStore, PgRunStore, PgShiftStore},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::{env, process::ExitCode};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Nightly extender entrypoint, meant to be invoked from cron.
///
/// Exits 0 on success; non-zero only on infrastructural failure. Scheduling
/// constraint violations are data (they live in the run's audit log) and
/// never fail the process.
#[tokio::main]
async fn main() -> ExitCode {
    let _guard = shared::telemetry::init_telemetry("orchestration-service");

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let config_path =
        env::var("ORCHESTRATOR_CONFIG_PATH").unwrap_or_else(|_| "orchestrator.toml".to_string());
    let config = OrchestratorConfig::load(&config_path).expect("Failed to load config");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to establish connection into Postgres");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    let service = Arc::new(OrchestrationService::new(
        Arc::new(PgRosterStore::new(pool.clone())),
        Arc::new(PgShiftStore::new(pool.clone())),
        Arc::new(PgRunStore::new(pool.clone())),
        config,
    ));

    if let Err(e) = service.recover_stale_runs().await {
        tracing::warn!("Failed to recover stale runs: {e}");
    }

    let teams = match service.auto_scheduled_teams().await {
        Ok(teams) => teams,
        Err(e) => {
            tracing::error!("Failed to list auto-scheduled teams: {e}");
            return ExitCode::FAILURE;
        }
    };
    if teams.is_empty() {
        tracing::info!("No teams with automatic scheduling enabled");
        return ExitCode::SUCCESS;
    }

    let today = shared::time::today_in(service.config().timezone());
    tracing::info!(teams = teams.len(), %today, "Starting nightly extension");

    // Teams are independent datasets: extend them concurrently. Within a
    // team, serialization is guaranteed by the scheduling lock on apply.
    let tracker = TaskTracker::new();
    let cancel = CancellationToken::new();
    let failures = Arc::new(AtomicU32::new(0));

    for settings in teams {
        let team_id = settings.team_id;
        let service = Arc::clone(&service);
        let cancel = cancel.clone();
        let failures = Arc::clone(&failures);

        let span = tracing::info_span!("extend_team", %team_id);
        tracker.spawn(
            async move {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::warn!("Extension cancelled before completion");
                    }
                    result = service.extend_team(team_id, today) => match result {
                        Ok(Some(summary)) => tracing::info!(
                            run_id = %summary.run_id,
                            planned = summary.totals.shifts_planned,
                            unassigned = summary.totals.shifts_unassigned,
                            "Team extended"
                        ),
                        Ok(None) => tracing::info!("Nothing to extend"),
                        Err(e) => {
                            tracing::error!("Extension failed: {e}");
                            failures.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            }
            .instrument(span),
        );
    }
    tracker.close();

    tokio::select! {
        () = tracker.wait() => {}
        () = shared::shutdown::shutdown_signal() => {
            cancel.cancel();
            if tokio::time::timeout(shared::shutdown::DEFAULT_SHUTDOWN_TIMEOUT, tracker.wait())
                .await
                .is_err()
            {
                tracing::warn!("Shutdown timeout reached before all teams finished");
            }
        }
    }

    let failed = failures.load(Ordering::SeqCst);
    if failed > 0 {
        tracing::error!(failed, "Nightly extension finished with failures");
        return ExitCode::FAILURE;
    }
    tracing::info!("Nightly extension finished");
    ExitCode::SUCCESS
}
