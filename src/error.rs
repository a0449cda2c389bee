use thiserror::Error;

/// Errors surfaced by the tracking session and the frame pipeline.
///
/// Per-frame tracking failures (not enough matches, implausible pose) are
/// not errors; they come back as an invalid [`crate::tracking::pose::PoseResult`].
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("reference image yielded {found} features, at least {required} are required")]
    ReferenceFeatureShortage { found: usize, required: usize },
    #[error("invalid usage: {0}")]
    InvalidUsage(Usage),
    #[error("failed to start the tracking worker: {0}")]
    Worker(std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Lifecycle violations of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Usage {
    #[error("the session has no reference yet, call initialize first")]
    NotInitialized,
    #[error("the session already holds a reference")]
    AlreadyInitialized,
}

/// Rejections at the frame boundary. The offending frame is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("buffer holds {actual} bytes but {width}x{height} needs {expected}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("frame has zero width or height")]
    EmptyFrame,
    #[error("rotation of {0} degrees is not a multiple of 90")]
    UnsupportedRotation(i32),
    #[error("the frame pipeline has been shut down")]
    PipelineClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
