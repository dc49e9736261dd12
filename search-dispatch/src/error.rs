use derive_more::Display;
use std::result;
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Dispatch error type. Selection-level failures never surface as errors; what remains are
/// malformed routing requests coming from the user and failures of the backend once an invoker
/// has been handed out.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// The explicit search path of a query could not be parsed.
    #[error("Invalid search path: {path}")]
    InvalidSearchPath { path: String },
    /// A backend node failed while executing a query.
    #[error("Backend node {node} error: {message}")]
    Backend { node: u32, message: String },
    /// Timed out waiting for an operation to complete.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// Invalid dispatch configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// General error
    #[error("General error: {0}")]
    General(String),
}

impl Error {
    /// Converts the error into a message which can be attached to a search result.
    pub fn to_error_message(&self) -> ErrorMessage {
        match self {
            Error::InvalidSearchPath { .. } => ErrorMessage::illegal_query(self.to_string()),
            Error::Timeout(_) => ErrorMessage::new(ErrorCode::Timeout, self.to_string()),
            Error::Backend { .. } | Error::InvalidConfig(_) | Error::General(_) => {
                ErrorMessage::new(ErrorCode::BackendCommunicationError, self.to_string())
            }
        }
    }
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::General(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Error {
        Error::General(err.to_string())
    }
}

/// Stable error codes reported to the query issuer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display)]
pub enum ErrorCode {
    #[display("illegal query")]
    IllegalQuery = 3,
    #[display("backend communication error")]
    BackendCommunicationError = 10,
    #[display("timeout")]
    Timeout = 12,
    #[display("insufficient coverage")]
    InsufficientCoverage = 16,
}

impl ErrorCode {
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// An error attached to a query result, as opposed to an error of the dispatch machinery itself.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Display)]
#[display("{code}: {message}")]
pub struct ErrorMessage {
    code: ErrorCode,
    message: String,
}

impl ErrorMessage {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ErrorMessage {
            code,
            message: message.into(),
        }
    }

    pub fn illegal_query(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IllegalQuery, message)
    }

    #[inline]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_invalid_search_path_to_illegal_query() {
        let error = Error::InvalidSearchPath {
            path: "a/b".into(),
        };
        let message = error.to_error_message();

        assert_eq!(message.code(), ErrorCode::IllegalQuery);
        assert_eq!(message.code().code(), 3);
        assert_eq!(message.message(), "Invalid search path: a/b");
    }

    #[test]
    fn should_map_backend_failure_to_communication_error() {
        let error = Error::Backend {
            node: 7,
            message: "connection reset".into(),
        };

        assert_eq!(
            error.to_error_message().code(),
            ErrorCode::BackendCommunicationError
        );
    }
}
