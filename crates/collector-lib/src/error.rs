//! Error taxonomy for the collector
//!
//! Every failure the core can observe maps to one of these variants. None of
//! them is fatal to the process: callers log them and move on to the next
//! source, record or tick.

use thiserror::Error;

/// Errors surfaced by sources, conversion, configuration and delivery
#[derive(Debug, Error)]
pub enum CollectorError {
    /// A source collaborator failed to return data
    #[error("failed to fetch {origin}: {reason}")]
    Fetch { origin: String, reason: String },

    /// A payload could not be converted past the given line
    #[error("conversion aborted at line {line}: {reason}")]
    Conversion { line: usize, reason: String },

    /// A filter or replacement pattern could not be compiled
    #[error("invalid pattern `{pattern}`: {reason}")]
    Config { pattern: String, reason: String },

    /// The sink rejected a record
    #[error("failed to deliver metric {metric}: {reason}")]
    Delivery { metric: String, reason: String },

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectorError {
    /// Build a fetch error for the named source
    pub fn fetch(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a config error for a pattern that failed to compile
    pub fn config(pattern: impl Into<String>, err: regex::Error) -> Self {
        Self::Config {
            pattern: pattern.into(),
            reason: err.to_string(),
        }
    }

    /// Build a delivery error for the named metric
    pub fn delivery(metric: impl Into<String>, reason: impl ToString) -> Self {
        Self::Delivery {
            metric: metric.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;
