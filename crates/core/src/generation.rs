//! Generation job lifecycle: status values, provider status mapping,
//! webhook reconciliation, and request parameter bounds.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Stored status of a generated image or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Processing => "processing",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(GenerationStatus::Pending),
            "processing" => Ok(GenerationStatus::Processing),
            "completed" => Ok(GenerationStatus::Completed),
            "failed" => Ok(GenerationStatus::Failed),
            other => Err(CoreError::Validation(format!(
                "Invalid status '{other}'. Must be one of: pending, processing, completed, failed"
            ))),
        }
    }

    /// Completed and failed rows never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }
}

/// Job state reported by the GPU provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderJobState {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl ProviderJobState {
    /// Parse a provider status string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IN_QUEUE" | "QUEUED" | "PENDING" => Some(ProviderJobState::InQueue),
            "IN_PROGRESS" | "RUNNING" | "PROCESSING" => Some(ProviderJobState::InProgress),
            "COMPLETED" | "SUCCEEDED" | "SUCCESS" => Some(ProviderJobState::Completed),
            "FAILED" | "ERROR" => Some(ProviderJobState::Failed),
            "CANCELLED" | "CANCELED" => Some(ProviderJobState::Cancelled),
            "TIMED_OUT" | "TIMEOUT" => Some(ProviderJobState::TimedOut),
            _ => None,
        }
    }
}

/// The action to take on a stored job after a provider status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing to write (duplicate update, or the row is already terminal).
    NoChange,
    /// Move a pending row to processing.
    MarkProcessing,
    /// Copy the output to storage and mark completed.
    Complete { output: String },
    /// Mark failed and refund the charge.
    Fail { reason: String },
}

/// Decide how a provider status update changes a stored job.
pub fn reconcile(
    current: GenerationStatus,
    state: ProviderJobState,
    output: Option<&str>,
    error: Option<&str>,
) -> Reconciliation {
    if current.is_terminal() {
        return Reconciliation::NoChange;
    }

    let fail = |default: &str| Reconciliation::Fail {
        reason: error
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(default)
            .to_string(),
    };

    match state {
        ProviderJobState::InQueue => Reconciliation::NoChange,
        ProviderJobState::InProgress => match current {
            GenerationStatus::Pending => Reconciliation::MarkProcessing,
            _ => Reconciliation::NoChange,
        },
        ProviderJobState::Completed => match output.map(str::trim).filter(|o| !o.is_empty()) {
            Some(output) => Reconciliation::Complete {
                output: output.to_string(),
            },
            None => fail("Provider returned no output"),
        },
        ProviderJobState::Failed => fail("Generation failed"),
        ProviderJobState::Cancelled => fail("Generation was cancelled"),
        ProviderJobState::TimedOut => fail("Generation timed out"),
    }
}

/// Whether a non-terminal job has been running longer than `timeout_mins`.
pub fn job_timed_out(created_at: Timestamp, now: Timestamp, timeout_mins: i64) -> bool {
    now - created_at > chrono::Duration::minutes(timeout_mins)
}

// ---------------------------------------------------------------------------
// Media kinds and webhook signing
// ---------------------------------------------------------------------------

/// Which table a GPU webhook refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// The message signed into a GPU webhook URL.
pub fn webhook_signing_payload(kind: MediaKind, id: DbId) -> String {
    format!("{}:{id}", kind.as_str())
}

// ---------------------------------------------------------------------------
// Parameter bounds
// ---------------------------------------------------------------------------

pub const DEFAULT_WIDTH: i32 = 768;
pub const DEFAULT_HEIGHT: i32 = 1024;
pub const MIN_DIMENSION: i32 = 256;
pub const MAX_DIMENSION: i32 = 1536;
pub const DIMENSION_STEP: i32 = 64;

/// Allowed upscale factors.
pub const UPSCALE_FACTORS: [i32; 2] = [2, 4];

pub const DEFAULT_VIDEO_DURATION_SECS: i32 = 4;
pub const MIN_VIDEO_DURATION_SECS: i32 = 2;
pub const MAX_VIDEO_DURATION_SECS: i32 = 10;

/// Image kinds stored in `generated_images.kind`.
pub const IMAGE_KIND_GENERATION: &str = "generation";
pub const IMAGE_KIND_UPSCALE: &str = "upscale";

/// Video kinds stored in `generated_videos.kind`.
pub const VIDEO_KIND_IMG2VIDEO: &str = "img2video";
pub const VIDEO_KIND_TALKING_AVATAR: &str = "talking_avatar";

/// Width and height must lie in range and be multiples of 64.
pub fn validate_dimensions(width: i32, height: i32) -> Result<(), CoreError> {
    for (label, value) in [("width", width), ("height", height)] {
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) || value % DIMENSION_STEP != 0 {
            return Err(CoreError::Validation(format!(
                "{label} must be a multiple of {DIMENSION_STEP} between {MIN_DIMENSION} and {MAX_DIMENSION}"
            )));
        }
    }
    Ok(())
}

pub fn validate_upscale_factor(scale: i32) -> Result<(), CoreError> {
    if UPSCALE_FACTORS.contains(&scale) {
        Ok(())
    } else {
        Err(CoreError::Validation("Upscale factor must be 2 or 4".into()))
    }
}

/// Largest side an upscale may produce.
pub const MAX_UPSCALED_DIMENSION: i32 = MAX_DIMENSION * 4;

/// Output size of upscaling a `width` x `height` image by `scale`.
///
/// Upscales can be chained, so the result is bounded by
/// [`MAX_UPSCALED_DIMENSION`] rather than by the generation limits.
pub fn upscaled_size(width: i32, height: i32, scale: i32) -> Result<(i32, i32), CoreError> {
    validate_upscale_factor(scale)?;
    match (width.checked_mul(scale), height.checked_mul(scale)) {
        (Some(w), Some(h)) if w <= MAX_UPSCALED_DIMENSION && h <= MAX_UPSCALED_DIMENSION => {
            Ok((w, h))
        }
        _ => Err(CoreError::Validation(format!(
            "Upscaled image would exceed {MAX_UPSCALED_DIMENSION} pixels per side"
        ))),
    }
}

pub fn validate_video_duration(secs: i32) -> Result<(), CoreError> {
    if (MIN_VIDEO_DURATION_SECS..=MAX_VIDEO_DURATION_SECS).contains(&secs) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Video duration must be between {MIN_VIDEO_DURATION_SECS} and {MAX_VIDEO_DURATION_SECS} seconds"
        )))
    }
}
