//! Typed failures that callers branch on.
//!
//! Everything else propagates as `anyhow::Error` with context.

use crate::session::Phase;
use thiserror::Error;

/// A generation turn that did not complete.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// The stream could not be opened: connect failure, bad status, no body.
    #[error("transport error: {0}")]
    Transport(String),

    /// The stream broke after it was opened.
    #[error("stream read error after {} bytes: {message}", .partial.len())]
    StreamRead {
        message: String,
        /// Text received before the failure, kept for diagnostics.
        partial: String,
    },
}

/// One dynamic model source failed. Contained inside the catalog build.
#[derive(Error, Debug)]
#[error("failed to fetch models for {provider}: {message}")]
pub struct ProviderFetchError {
    pub provider: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("preference storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a generation is already in progress ({0:?})")]
    Busy(Phase),

    #[error("session already started; reset it to start a new app")]
    AlreadyStarted,

    #[error("nothing to refine yet; start a session first")]
    NotStarted,

    #[error("{0} must not be empty")]
    EmptyInput(&'static str),

    #[error("model {0} does not accept image input")]
    AttachmentUnsupported(String),

    #[error(transparent)]
    Generate(#[from] GenerateError),
}
