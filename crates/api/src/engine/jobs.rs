//! GPU job submission and status reconciliation.
//!
//! Jobs are submitted with a signed webhook URL. The provider posts the final
//! status there; the reconciler polls the same status for jobs whose webhook
//! never arrived. Both paths end in [`apply_update`], which translates a
//! provider status into row updates, CDN copies, refunds and events.

use muse_core::credits::UsageKind;
use muse_core::generation::{
    job_timed_out, reconcile, webhook_signing_payload, GenerationStatus, MediaKind,
    ProviderJobState, Reconciliation, IMAGE_KIND_UPSCALE, VIDEO_KIND_TALKING_AVATAR,
};
use muse_core::hashing::{hmac_sha256_hex, verify_hmac_sha256_hex};
use muse_core::types::{DbId, Timestamp};
use muse_db::models::image::GeneratedImage;
use muse_db::models::nut_transaction::LedgerRef;
use muse_db::models::video::GeneratedVideo;
use muse_db::repositories::{ImageRepo, VideoRepo};
use muse_events::{event_types, PlatformEvent};
use muse_providers::{fetch_output, GpuInput, GpuJob, GpuTask, ProviderError};

use crate::config::ServerConfig;
use crate::engine::credits;
use crate::error::AppResult;
use crate::state::AppState;

/// A generation row (image or video) reduced to what job handling needs.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub kind: MediaKind,
    pub id: DbId,
    pub user_id: DbId,
    pub status: GenerationStatus,
    pub task: GpuTask,
    pub provider_job_id: Option<String>,
    pub nuts_cost: i64,
    pub created_at: Timestamp,
}

impl JobRow {
    pub fn from_image(image: &GeneratedImage) -> Self {
        let task = if image.kind == IMAGE_KIND_UPSCALE {
            GpuTask::Upscale
        } else {
            GpuTask::Txt2Img
        };
        Self {
            kind: MediaKind::Image,
            id: image.id,
            user_id: image.user_id,
            status: parse_status(&image.status),
            task,
            provider_job_id: image.provider_job_id.clone(),
            nuts_cost: image.nuts_cost,
            created_at: image.created_at,
        }
    }

    pub fn from_video(video: &GeneratedVideo) -> Self {
        let task = if video.kind == VIDEO_KIND_TALKING_AVATAR {
            GpuTask::TalkingAvatar
        } else {
            GpuTask::Img2Video
        };
        Self {
            kind: MediaKind::Video,
            id: video.id,
            user_id: video.user_id,
            status: parse_status(&video.status),
            task,
            provider_job_id: video.provider_job_id.clone(),
            nuts_cost: video.nuts_cost,
            created_at: video.created_at,
        }
    }

    fn usage_kind(&self) -> UsageKind {
        match self.kind {
            MediaKind::Image => UsageKind::Image,
            MediaKind::Video => UsageKind::Video,
        }
    }
}

/// Unknown statuses are treated as terminal so nothing overwrites them.
fn parse_status(status: &str) -> GenerationStatus {
    GenerationStatus::parse(status).unwrap_or(GenerationStatus::Failed)
}

// ---------------------------------------------------------------------------
// Webhook URLs
// ---------------------------------------------------------------------------

/// Hex HMAC over `"{kind}:{id}"` with the server's webhook secret.
pub fn webhook_signature(secret: &str, kind: MediaKind, id: DbId) -> String {
    hmac_sha256_hex(secret, webhook_signing_payload(kind, id).as_bytes())
}

pub fn verify_webhook_signature(secret: &str, kind: MediaKind, id: DbId, signature: &str) -> bool {
    verify_hmac_sha256_hex(secret, webhook_signing_payload(kind, id).as_bytes(), signature)
}

/// The URL the GPU provider posts the job status to.
pub fn webhook_url(config: &ServerConfig, kind: MediaKind, id: DbId) -> String {
    format!(
        "{}/api/v1/webhooks/gpu?kind={}&id={id}&sig={}",
        config.public_base_url,
        kind.as_str(),
        webhook_signature(&config.webhook_secret, kind, id)
    )
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

pub async fn load(state: &AppState, kind: MediaKind, id: DbId) -> AppResult<Option<JobRow>> {
    let row = match kind {
        MediaKind::Image => ImageRepo::find_by_id(&state.pool, id)
            .await?
            .map(|image| JobRow::from_image(&image)),
        MediaKind::Video => VideoRepo::find_by_id(&state.pool, id)
            .await?
            .map(|video| JobRow::from_video(&video)),
    };
    Ok(row)
}

/// Pending or processing jobs created before `created_before`, oldest first.
pub async fn open_jobs(
    state: &AppState,
    created_before: Timestamp,
    limit: i64,
) -> AppResult<Vec<JobRow>> {
    let images = ImageRepo::list_open_jobs(&state.pool, created_before, limit).await?;
    let videos = VideoRepo::list_open_jobs(&state.pool, created_before, limit).await?;

    let mut jobs: Vec<JobRow> = images
        .iter()
        .map(JobRow::from_image)
        .chain(videos.iter().map(JobRow::from_video))
        .collect();
    jobs.sort_by_key(|job| job.created_at);
    Ok(jobs)
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Queue `input` for `job` at the GPU provider.
///
/// On failure the row is marked failed, the charge refunded, and the provider
/// error returned. A provider that answers with a final status right away is
/// reconciled immediately.
pub async fn submit(state: &AppState, job: &JobRow, input: &GpuInput) -> AppResult<()> {
    let url = webhook_url(&state.config, job.kind, job.id);

    let accepted = match state.gpu.submit(input, &url).await {
        Ok(accepted) => accepted,
        Err(e) => {
            tracing::error!(
                kind = job.kind.as_str(),
                id = job.id,
                error = %e,
                "GPU submission failed"
            );
            if let Err(fail_err) = fail(state, job, &format!("Submission failed: {e}")).await {
                tracing::error!(id = job.id, error = %fail_err, "Failed to record submission failure");
            }
            return Err(e.into());
        }
    };

    if !accepted.id.is_empty() {
        match job.kind {
            MediaKind::Image => {
                ImageRepo::set_provider_job_id(&state.pool, job.id, &accepted.id).await?
            }
            MediaKind::Video => {
                VideoRepo::set_provider_job_id(&state.pool, job.id, &accepted.id).await?
            }
        }
    }

    tracing::info!(
        kind = job.kind.as_str(),
        id = job.id,
        task = job.task.as_str(),
        provider_job_id = %accepted.id,
        "GPU job submitted"
    );

    if matches!(
        accepted.state(),
        Some(
            ProviderJobState::Completed
                | ProviderJobState::Failed
                | ProviderJobState::Cancelled
                | ProviderJobState::TimedOut
        )
    ) {
        apply_update(state, job, &accepted).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Apply a provider status document to a stored job.
///
/// Terminal rows are left alone, so duplicate webhooks and late polls are
/// no-ops.
pub async fn apply_update(state: &AppState, job: &JobRow, update: &GpuJob) -> AppResult<()> {
    let Some(provider_state) = update.state() else {
        tracing::warn!(
            kind = job.kind.as_str(),
            id = job.id,
            status = %update.status,
            "Unknown provider job status, ignoring"
        );
        return Ok(());
    };

    let output = update.output_ref();
    match reconcile(
        job.status,
        provider_state,
        output.as_deref(),
        update.error.as_deref(),
    ) {
        Reconciliation::NoChange => {
            tracing::debug!(kind = job.kind.as_str(), id = job.id, "Job update: no change");
        }
        Reconciliation::MarkProcessing => match job.kind {
            MediaKind::Image => {
                ImageRepo::mark_processing(&state.pool, job.id).await?;
            }
            MediaKind::Video => {
                VideoRepo::mark_processing(&state.pool, job.id).await?;
            }
        },
        Reconciliation::Complete { output } => match store_output(state, job, &output).await {
            Ok((url, path)) => complete(state, job, &url, &path).await?,
            Err(e) => {
                tracing::error!(
                    kind = job.kind.as_str(),
                    id = job.id,
                    error = %e,
                    "Failed to copy job output to storage"
                );
                fail(state, job, &format!("Failed to store output: {e}")).await?;
            }
        },
        Reconciliation::Fail { reason } => fail(state, job, &reason).await?,
    }
    Ok(())
}

/// Poll or time out a job whose webhook has not arrived.
pub async fn reconcile_stale(state: &AppState, job: &JobRow, now: Timestamp) -> AppResult<()> {
    if job_timed_out(job.created_at, now, state.config.job_timeout_mins) {
        return fail(state, job, "Generation timed out").await;
    }

    let Some(provider_job_id) = job.provider_job_id.as_deref() else {
        return Ok(());
    };
    let update = state.gpu.status(job.task, provider_job_id).await?;
    apply_update(state, job, &update).await
}

/// Download or decode the output and upload it to the CDN.
///
/// Returns the public URL and the storage path.
async fn store_output(
    state: &AppState,
    job: &JobRow,
    output: &str,
) -> Result<(String, String), ProviderError> {
    let blob = fetch_output(&state.http, output).await?;
    let (fallback_ext, fallback_type) = match job.kind {
        MediaKind::Image => ("png", "image/png"),
        MediaKind::Video => ("mp4", "video/mp4"),
    };
    let path = format!(
        "{}s/{}/{}.{}",
        job.kind.as_str(),
        job.user_id,
        job.id,
        blob.extension(fallback_ext)
    );
    let content_type = blob
        .content_type
        .clone()
        .unwrap_or_else(|| fallback_type.to_string());

    let url = state.storage.upload(&path, blob.bytes, &content_type).await?;
    Ok((url, path))
}

async fn complete(state: &AppState, job: &JobRow, url: &str, path: &str) -> AppResult<()> {
    let updated = match job.kind {
        MediaKind::Image => ImageRepo::mark_completed(&state.pool, job.id, url, path)
            .await?
            .is_some(),
        MediaKind::Video => VideoRepo::mark_completed(&state.pool, job.id, url, path)
            .await?
            .is_some(),
    };
    if !updated {
        return Ok(());
    }

    tracing::info!(kind = job.kind.as_str(), id = job.id, url, "Generation completed");
    let event_type = match job.kind {
        MediaKind::Image => event_types::IMAGE_COMPLETED,
        MediaKind::Video => event_types::VIDEO_COMPLETED,
    };
    state.event_bus.publish(
        PlatformEvent::new(event_type)
            .with_source(job.kind.as_str(), job.id)
            .with_actor(job.user_id)
            .with_payload(serde_json::json!({ "url": url })),
    );
    Ok(())
}

/// Mark the job failed and refund it, once.
async fn fail(state: &AppState, job: &JobRow, reason: &str) -> AppResult<()> {
    let updated = match job.kind {
        MediaKind::Image => ImageRepo::mark_failed(&state.pool, job.id, reason)
            .await?
            .is_some(),
        MediaKind::Video => VideoRepo::mark_failed(&state.pool, job.id, reason)
            .await?
            .is_some(),
    };
    if !updated {
        return Ok(());
    }

    tracing::warn!(kind = job.kind.as_str(), id = job.id, reason, "Generation failed");
    credits::refund(
        state,
        job.user_id,
        job.usage_kind(),
        job.nuts_cost,
        Some(job.created_at),
        Some(LedgerRef {
            entity_type: job.kind.as_str(),
            entity_id: job.id,
        }),
    )
    .await;

    let event_type = match job.kind {
        MediaKind::Image => event_types::IMAGE_FAILED,
        MediaKind::Video => event_types::VIDEO_FAILED,
    };
    state.event_bus.publish(
        PlatformEvent::new(event_type)
            .with_source(job.kind.as_str(), job.id)
            .with_actor(job.user_id)
            .with_payload(serde_json::json!({ "error": reason, "refunded": job.nuts_cost })),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_signature_round_trip() {
        let sig = webhook_signature("secret", MediaKind::Image, 42);
        assert!(verify_webhook_signature("secret", MediaKind::Image, 42, &sig));
        assert!(!verify_webhook_signature("secret", MediaKind::Video, 42, &sig));
        assert!(!verify_webhook_signature("secret", MediaKind::Image, 43, &sig));
        assert!(!verify_webhook_signature("other", MediaKind::Image, 42, &sig));
    }

    #[test]
    fn unknown_status_is_terminal() {
        assert_eq!(parse_status("processing"), GenerationStatus::Processing);
        assert_eq!(parse_status("bogus"), GenerationStatus::Failed);
    }
}
