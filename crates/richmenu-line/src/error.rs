use thiserror::Error;

/// Errors returned by the LINE rich menu client.
#[derive(Debug, Error)]
pub enum LineError {
    /// LINE answered with a non-2xx status. `body` is already truncated.
    #[error("LINE API rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Network failure, timeout or connection refused.
    #[error("LINE API unavailable: {0}")]
    Unavailable(String),

    /// A configured API base is not an absolute http(s) URL.
    #[error("invalid LINE API base URL: {0}")]
    InvalidBaseUrl(String),

    /// 2xx response whose body could not be decoded.
    #[error("LINE API response parse error: {0}")]
    Parse(String),
}

impl LineError {
    /// True when an alias update failed because the alias does not exist yet.
    ///
    /// LINE answers 404 for an unknown alias on some accounts and 400 on
    /// others; both mean "create it instead".
    pub fn is_missing_alias(&self) -> bool {
        matches!(self, LineError::Rejected { status: 400 | 404, .. })
    }
}

impl From<reqwest::Error> for LineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LineError::Parse(e.to_string())
        } else {
            LineError::Unavailable(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, LineError>;
