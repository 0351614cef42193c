use std::time::Duration;

use thiserror::Error;

/// Error type returned from this library's functions
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP request could not be built, sent, or read.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    /// The server answered with a non-success status code.
    #[error("API error ({status}): {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    /// No data arrived from the server within the configured timeout.
    #[error("no data received for {0:?}")]
    Timeout(Duration),
    /// A single streamed line could not be decoded as a generation record.
    #[error("malformed record {line:?}: {reason}")]
    MalformedRecord { line: String, reason: String },
    /// De/serialization error
    #[error("de/serialize error: {0}")]
    Serde(#[from] serde_json::error::Error),
    /// The configured base url can't be used to build endpoint urls.
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
}

impl Error {
    /// Whether the error only affects a single line of the stream.
    ///
    /// Record level errors can be skipped; every other error ends the stream.
    pub fn is_record_error(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. })
    }
}
