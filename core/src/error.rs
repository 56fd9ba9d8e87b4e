//! Error taxonomy and status classification for the Tracker API client.
//!
//! # Design
//! Errors are plain values returned through `Result`, never panics. The
//! status line is classified before any body byte is interpreted, so an
//! error page is never mistaken for a successful XML payload.
//! `NotFound` is the only variant produced after a structurally successful
//! response: the service answered, but the expected key path was absent.

use thiserror::Error;

use crate::decode::DecodeError;

/// Errors produced anywhere in the request/response pipeline.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The server returned 401.
    #[error("incorrect credential combination")]
    AuthenticationFailed,

    /// The server returned a non-200 status other than 401.
    #[error("error with HTTP status code: {0}")]
    HttpStatus(u16),

    /// The exchange failed below HTTP (DNS, connect, TLS, reset) or the
    /// body stream broke mid-transfer.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A successful response did not contain the expected key path.
    #[error("no {resource} were able to be found")]
    NotFound {
        resource: &'static str,
        key_path: String,
    },

    /// The response body was not well-formed XML.
    #[error("malformed response body: {0}")]
    Decode(#[from] DecodeError),

    /// An outgoing request body could not be written.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TrackerError {
    /// Wrap any transport-level failure.
    pub fn transport(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Transport(cause.into())
    }

    /// True when the service refused the request (as opposed to answering
    /// with nothing that matched).
    pub fn is_service_refusal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::HttpStatus(_))
    }
}

/// Map a response status code to its semantic error, if any.
///
/// Only 200 proceeds to decoding. The body is irrelevant here: a 401 is an
/// authentication failure even if it carries a valid XML document.
pub fn classify_status(status: u16) -> Result<(), TrackerError> {
    match status {
        200 => Ok(()),
        401 => Err(TrackerError::AuthenticationFailed),
        other => Err(TrackerError::HttpStatus(other)),
    }
}
