// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0

//! Rust-OpcUa specific errors.

use std::fmt;

use crate::StatusCode;

/// A [`StatusCode`] paired with a human-readable reason, used internally wherever
/// a log-worthy explanation is needed alongside the wire code handed to the caller.
#[derive(Debug, Clone)]
pub struct Error {
    /// The wire status code this error reduces to at the outermost dispatch boundary.
    pub status: StatusCode,
    /// Free-form context for logging. Never put onto the wire.
    pub message: String,
}

impl Error {
    /// Build a new error from a status code and a message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for Error {}

impl From<Error> for StatusCode {
    fn from(value: Error) -> Self {
        value.status
    }
}

/// Higher-level, `thiserror`-derived error used by application-facing APIs that want
/// a `std::error::Error` impl richer than a bare status code.
#[derive(thiserror::Error, Debug)]
pub enum OpcUaError {
    /// A request returned a bad status code.
    #[error("request returned status code {0}")]
    StatusCodeError(StatusCode),
    /// A lower-level [`Error`] bubbled up unchanged.
    #[error("{0}")]
    Error(Error),
}

impl From<StatusCode> for OpcUaError {
    fn from(value: StatusCode) -> Self {
        OpcUaError::StatusCodeError(value)
    }
}

impl From<Error> for OpcUaError {
    fn from(value: Error) -> Self {
        OpcUaError::Error(value)
    }
}
