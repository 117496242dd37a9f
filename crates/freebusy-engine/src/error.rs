//! Error types for freebusy-engine operations.

use caldav_core::DavError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FreeBusyError {
    /// The addressed calendar collection or resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request or a component is malformed for busy-time computation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The operation is rejected by collection policy.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// iCalendar text could not be read. `line` is the 1-based physical line on
    /// which the offending content line starts.
    #[error("iCalendar parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(transparent)]
    Url(#[from] DavError),
}

pub type Result<T> = std::result::Result<T, FreeBusyError>;
