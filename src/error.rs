//! Error taxonomy for the detection runner.
//!
//! Startup validation failures are fatal and must be reported before any
//! capture or writer is opened. `FrameLoadFailure` is recovered locally by the
//! still-image source; `StreamReadFailure` ends the run through the normal
//! cleanup path.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("model path is invalid or model was not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("input {0} is invalid")]
    InvalidSource(String),

    #[error("file extension {extension} is not supported ({})", .path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("resolution must be WxH with positive integers, got {0:?}")]
    InvalidResolution(String),

    #[error("recording only works for video and camera sources")]
    RecordingNotSupported,

    #[error("recording requires an explicit --resolution")]
    RecordingResolutionRequired,

    #[error("could not read image file {}: {reason}", .path.display())]
    FrameLoadFailure { path: PathBuf, reason: String },

    #[error("unable to read frames from {source_name}: {reason}")]
    StreamReadFailure { source_name: String, reason: String },

    #[error("class index {index} is outside the detector label map ({labels} labels)")]
    UnknownClassIndex { index: usize, labels: usize },
}

impl PipelineError {
    /// Errors raised while validating arguments, before any resource is opened.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            PipelineError::ModelNotFound(_)
                | PipelineError::InvalidSource(_)
                | PipelineError::UnsupportedFormat { .. }
                | PipelineError::InvalidResolution(_)
                | PipelineError::RecordingNotSupported
                | PipelineError::RecordingResolutionRequired
        )
    }
}
