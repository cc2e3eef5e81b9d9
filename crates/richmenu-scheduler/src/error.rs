use richmenu_line::LineError;
use thiserror::Error;

/// Errors that can occur while selecting or publishing scheduled jobs.
///
/// The display text of every variant ends up in `last_run_message`, so it is
/// written for an operator reading the schedule list.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A job, project or account the job depends on does not exist.
    #[error("{what} #{id} not found")]
    NotFound { what: &'static str, id: i64 },

    /// The job cannot run as configured (no menus, missing image, bad index).
    #[error("{0}")]
    PreconditionFailed(String),

    /// The job definition is inconsistent (e.g. weekly without a weekday).
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// LINE answered a call with a non-2xx status.
    #[error("{call} failed ({status}): {body}")]
    UpstreamRejected {
        call: &'static str,
        status: u16,
        body: String,
    },

    /// LINE could not be reached (network error, timeout).
    #[error("{call} failed: LINE API unavailable: {reason}")]
    UpstreamUnavailable { call: &'static str, reason: String },

    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Source image could not be decoded or re-encoded.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl SchedulerError {
    /// Attribute a LINE client error to the pipeline step that made the call.
    pub fn upstream(call: &'static str, err: LineError) -> Self {
        match err {
            LineError::Rejected { status, body } => {
                SchedulerError::UpstreamRejected { call, status, body }
            }
            LineError::Unavailable(reason) => SchedulerError::UpstreamUnavailable { call, reason },
            other @ (LineError::Parse(_) | LineError::InvalidBaseUrl(_)) => {
                SchedulerError::Unexpected(format!("{call}: {other}"))
            }
        }
    }

    /// Short error code string sent to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::NotFound { .. } => "NOT_FOUND",
            SchedulerError::PreconditionFailed(_) | SchedulerError::InvalidSchedule(_) => {
                "PRECONDITION_FAILED"
            }
            SchedulerError::UpstreamRejected { .. } => "UPSTREAM_REJECTED",
            SchedulerError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            SchedulerError::Database(_)
            | SchedulerError::Image(_)
            | SchedulerError::Unexpected(_) => "UNEXPECTED",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
