//! Error types for time-series operations

use std::fmt;

/// Result type alias for time-series operations
pub type TimeSeriesResult<T> = Result<T, TimeSeriesError>;

/// Errors that can occur while querying or writing the time-series backend
#[derive(Debug, Clone, PartialEq)]
pub enum TimeSeriesError {
    /// Connection failure, timeout or other transport problem
    Transport(String),

    /// The backend answered with a non-success HTTP status and no error body
    Http(u16),

    /// The backend reported an error (`"status": "error"`)
    Backend(String),

    /// The response body could not be decoded
    Decode(String),

    /// The query returned a result type this client cannot turn into samples
    UnsupportedResultType(String),

    /// A range query for a single check returned more than one series
    AmbiguousResult(usize),

    /// The requested window is empty or reversed
    InvalidWindow,

    /// The caller's cancellation token fired
    Cancelled,
}

impl TimeSeriesError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TimeSeriesError::Cancelled)
    }
}

impl fmt::Display for TimeSeriesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSeriesError::Transport(msg) => write!(f, "time-series request failed: {}", msg),
            TimeSeriesError::Http(status) => {
                write!(f, "time-series backend returned HTTP {}", status)
            }
            TimeSeriesError::Backend(msg) => write!(f, "time-series backend error: {}", msg),
            TimeSeriesError::Decode(msg) => {
                write!(f, "failed to decode time-series response: {}", msg)
            }
            TimeSeriesError::UnsupportedResultType(kind) => {
                write!(f, "unsupported query result type: {}", kind)
            }
            TimeSeriesError::AmbiguousResult(count) => {
                write!(f, "expected at most one series, got {}", count)
            }
            TimeSeriesError::InvalidWindow => write!(f, "query window is empty or reversed"),
            TimeSeriesError::Cancelled => write!(f, "time-series query was cancelled"),
        }
    }
}

impl std::error::Error for TimeSeriesError {}

impl From<reqwest::Error> for TimeSeriesError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TimeSeriesError::Decode(err.to_string())
        } else {
            TimeSeriesError::Transport(err.to_string())
        }
    }
}
