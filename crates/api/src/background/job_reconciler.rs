//! Catch-up for generation jobs whose webhook never arrived.
//!
//! Every minute, open jobs older than [`MIN_AGE`] are polled at the GPU
//! provider. Jobs past the configured timeout are failed and refunded.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::engine::jobs;
use crate::state::AppState;

/// How often the reconciler runs.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Jobs younger than this are left to their webhook.
const MIN_AGE: chrono::Duration = chrono::Duration::minutes(1);

/// Jobs handled per tick and media kind.
const BATCH_SIZE: i64 = 100;

/// Run the reconciliation loop until `cancel` is triggered.
pub async fn run(state: AppState, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = RECONCILE_INTERVAL.as_secs(),
        timeout_mins = state.config.job_timeout_mins,
        "Job reconciler started"
    );

    let mut interval = tokio::time::interval(RECONCILE_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job reconciler stopping");
                break;
            }
            _ = interval.tick() => {
                reconcile_once(&state).await;
            }
        }
    }
}

/// One reconciliation pass over open jobs.
pub async fn reconcile_once(state: &AppState) {
    let now = Utc::now();
    let open = match jobs::open_jobs(state, now - MIN_AGE, BATCH_SIZE).await {
        Ok(open) => open,
        Err(e) => {
            tracing::error!(error = %e, "Job reconciler: failed to list open jobs");
            return;
        }
    };

    if open.is_empty() {
        tracing::debug!("Job reconciler: nothing to do");
        return;
    }

    tracing::debug!(count = open.len(), "Job reconciler: checking open jobs");
    for job in &open {
        if let Err(e) = jobs::reconcile_stale(state, job, now).await {
            tracing::warn!(
                kind = job.kind.as_str(),
                id = job.id,
                error = %e,
                "Job reconciler: reconciliation failed"
            );
        }
    }
}
