//! The errors a request handler can return.
//!
//! [`HandlerError`] doubles as control flow: [`HandlerError::Finish`] ends
//! processing early, [`HandlerError::Http`] is rendered as an error page, and
//! everything else is logged and answered with a 500.

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;
use quill_http::protocol::StateError;
use thiserror::Error;

use crate::negotiation::NegotiationError;
use crate::request::Chunk;
use crate::status;
use crate::transcoder::TranscodeError;
use crate::value::ValueError;

/// An HTTP error with an optional custom phrase and description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatusError {
    status: StatusCode,
    phrase: Option<String>,
    description: Option<String>,
}

impl HttpStatusError {
    pub fn new(status: StatusCode) -> Self {
        Self { status, phrase: None, description: None }
    }

    #[must_use]
    pub fn with_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.phrase = Some(phrase.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn phrase(&self) -> &str {
        self.phrase.as_deref().unwrap_or_else(|| status::phrase(self.status))
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| status::description(self.status))
    }

    /// The phrase, when it differs from the standard one.
    pub(crate) fn custom_phrase(&self) -> Option<&str> {
        self.phrase.as_deref()
    }
}

impl fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} {}", self.status.as_u16(), self.phrase())
    }
}

impl StdError for HttpStatusError {}

#[derive(Error, Debug)]
pub enum HandlerError {
    /// Stop processing; the chunk, if any, is written before finishing.
    #[error("request finished early")]
    Finish(Option<Chunk>),

    #[error(transparent)]
    Http(#[from] HttpStatusError),

    #[error("{source}")]
    Unexpected { source: Box<dyn StdError + Send + Sync>, traceback: String },
}

impl HandlerError {
    pub fn status(status: StatusCode) -> Self {
        HandlerError::Http(HttpStatusError::new(status))
    }

    pub fn finish() -> Self {
        HandlerError::Finish(None)
    }

    pub fn finish_with(chunk: impl Into<Chunk>) -> Self {
        HandlerError::Finish(Some(chunk.into()))
    }

    /// Wraps any error, capturing the current stack.
    pub fn unexpected<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        HandlerError::Unexpected { source: error.into(), traceback: Backtrace::force_capture().to_string() }
    }
}

impl From<StateError> for HandlerError {
    fn from(error: StateError) -> Self {
        HandlerError::unexpected(error)
    }
}

impl From<TranscodeError> for HandlerError {
    fn from(error: TranscodeError) -> Self {
        HandlerError::unexpected(error)
    }
}

impl From<ValueError> for HandlerError {
    fn from(error: ValueError) -> Self {
        HandlerError::unexpected(error)
    }
}

/// Request bodies in a type the application can't read are the client's
/// fault.
impl From<NegotiationError> for HandlerError {
    fn from(error: NegotiationError) -> Self {
        HttpStatusError::new(StatusCode::UNSUPPORTED_MEDIA_TYPE).with_description(error.to_string()).into()
    }
}
