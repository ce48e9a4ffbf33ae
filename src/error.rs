use thiserror::Error;

/// Failure of one external capability call. Every variant is absorbed by the
/// pipeline's per-stage fallback; none of them reaches the caller.
#[derive(Error, Debug)]
pub enum CapabilityError {
    /// Credential or configuration missing; a skip, not a failure.
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("capability timed out: {0}")]
    Timeout(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CapabilityError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Failure of a media tool invocation.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("failed to run ffmpeg for {step}: {source}")]
    Spawn {
        step: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg {step} failed: {stderr}")]
    Failed { step: &'static str, stderr: String },

    #[error("ffmpeg {0} timed out")]
    Timeout(&'static str),

    #[error("nothing to assemble: {0}")]
    NoInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced to the caller of the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("trend not found: {0}")]
    UnknownTrend(String),

    #[error("failed to prepare working directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
