//! Error types for URL handling and REPORT body construction.

use thiserror::Error;

/// Errors raised by the URL algebra and the filter builders.
#[derive(Error, Debug)]
pub enum DavError {
    /// The input string could not be parsed as a URL.
    #[error("Invalid URL '{input}': {message}")]
    InvalidUrl { input: String, message: String },

    /// Two absolute URLs pointing at different servers cannot be joined.
    #[error("{base} can't be joined with {other}")]
    InvalidJoin { base: String, other: String },

    /// A filter element was rendered without one of its mandatory attributes.
    #[error("<{element}> requires a '{attribute}' attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// A time-range element needs at least one bound.
    #[error("<time-range> requires a start or an end")]
    EmptyTimeRange,

    /// XML writing failed.
    #[error("XML error: {0}")]
    Xml(String),
}

impl From<quick_xml::Error> for DavError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

impl From<std::io::Error> for DavError {
    fn from(e: std::io::Error) -> Self {
        Self::Xml(format!("IO error: {e}"))
    }
}

/// Convenience alias used throughout caldav-core.
pub type Result<T> = std::result::Result<T, DavError>;
