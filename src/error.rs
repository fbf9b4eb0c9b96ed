//! Error types for the relocalization pipeline.
//!
//! Every variant is recoverable per request. Nothing in the pipeline retries on
//! its own; the caller decides whether to trigger another placement.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by capture, discovery, transfer, and placement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    // Discovery
    #[error("pose service unavailable: {0}")]
    Unavailable(String),

    // Device metadata / capture
    #[error("camera intrinsics unavailable")]
    IntrinsicsUnavailable,

    #[error("no camera frame has been captured yet")]
    FrameUnavailable,

    #[error("frame capture failed: {0}")]
    CaptureFailed(String),

    // Transfer
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("pose service error: {0}")]
    ServiceError(String),

    #[error("response decode failed: {0}")]
    DecodeFailed(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("a placement request is already in flight")]
    PlacementInProgress,

    // Placement
    #[error("degenerate pose estimate: {0}")]
    DegenerateEstimate(String),

    #[error("no anchor has been placed")]
    NoActiveAnchor,

    #[error("variant index {index} out of range ({len} variants)")]
    VariantOutOfRange { index: usize, len: usize },

    #[error("unknown variant '{0}'")]
    UnknownVariant(String),
}

/// Result alias used across the pipeline.
pub type PipelineResult<T> = Result<T, PipelineError>;
