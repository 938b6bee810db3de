//! Result codes and the agent error type.
//!
//! `ResultCode` ordinals are wire-visible and must never be reordered. Every
//! `AgentError` variant maps onto exactly one of them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Canonical result codes shared by every module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ResultCode {
    Success = 0,
    NotImplemented = 1,
    InvalidArgs = 2,
    DownloadError = 3,
    BackendError = 4,
    AuthenticationError = 5,
    OtherError = 6,
    Async = 7,
}

impl ResultCode {
    pub const ALL: [ResultCode; 8] = [
        ResultCode::Success,
        ResultCode::NotImplemented,
        ResultCode::InvalidArgs,
        ResultCode::DownloadError,
        ResultCode::BackendError,
        ResultCode::AuthenticationError,
        ResultCode::OtherError,
        ResultCode::Async,
    ];

    /// Human readable description of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Success => "Success",
            ResultCode::NotImplemented => "Not implemented",
            ResultCode::InvalidArgs => "Invalid arguments",
            ResultCode::DownloadError => "Download error",
            ResultCode::BackendError => "Backend error",
            ResultCode::AuthenticationError => "Authentication error",
            ResultCode::OtherError => "Other error",
            ResultCode::Async => "Asynchronous operation",
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent error: a result code plus the formatted cause.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown type of property: {0}")]
    UnknownPropertyType(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("{0}")]
    Authentication(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl AgentError {
    /// Wire-visible code for this error.
    pub fn code(&self) -> ResultCode {
        match self {
            AgentError::NotImplemented(_) => ResultCode::NotImplemented,
            AgentError::InvalidArguments(_) | AgentError::UnknownPropertyType(_) => {
                ResultCode::InvalidArgs
            }
            AgentError::Download(_) => ResultCode::DownloadError,
            AgentError::Backend(_) => ResultCode::BackendError,
            AgentError::Authentication(_) => ResultCode::AuthenticationError,
            AgentError::Other(_) => ResultCode::OtherError,
        }
    }

    /// The cause text without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            AgentError::NotImplemented(m)
            | AgentError::InvalidArguments(m)
            | AgentError::UnknownPropertyType(m)
            | AgentError::Download(m)
            | AgentError::Backend(m)
            | AgentError::Authentication(m)
            | AgentError::Other(m) => m,
        }
    }

    /// Rebuild an error from a reported code, e.g. an asynchronous completion.
    ///
    /// `Success` and `Async` are not errors and yield `None`.
    pub fn from_code(code: ResultCode, message: String) -> Option<Self> {
        let error = match code {
            ResultCode::Success | ResultCode::Async => return None,
            ResultCode::NotImplemented => AgentError::NotImplemented(message),
            ResultCode::InvalidArgs => AgentError::InvalidArguments(message),
            ResultCode::DownloadError => AgentError::Download(message),
            ResultCode::BackendError => AgentError::Backend(message),
            ResultCode::AuthenticationError => AgentError::Authentication(message),
            ResultCode::OtherError => AgentError::Other(message),
        };
        Some(error)
    }

    /// Generic denial. Carries no detail about why the policy said no.
    pub fn not_authorized() -> Self {
        AgentError::Authentication("Not authorized".to_string())
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        AgentError::InvalidArguments(format!("configuration: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_stable() {
        assert_eq!(ResultCode::Success as u32, 0);
        assert_eq!(ResultCode::NotImplemented as u32, 1);
        assert_eq!(ResultCode::InvalidArgs as u32, 2);
        assert_eq!(ResultCode::DownloadError as u32, 3);
        assert_eq!(ResultCode::BackendError as u32, 4);
        assert_eq!(ResultCode::AuthenticationError as u32, 5);
        assert_eq!(ResultCode::OtherError as u32, 6);
        assert_eq!(ResultCode::Async as u32, 7);
        for code in ResultCode::ALL {
            assert_eq!(ResultCode::from_u32(code as u32), Some(code));
        }
        assert_eq!(ResultCode::from_u32(8), None);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AgentError::UnknownPropertyType("blob".into()).code(),
            ResultCode::InvalidArgs
        );
        assert_eq!(AgentError::not_authorized().code(), ResultCode::AuthenticationError);
        assert_eq!(AgentError::not_authorized().to_string(), "Not authorized");
        assert_eq!(AgentError::Backend("boom".into()).message(), "boom");
    }

    #[test]
    fn test_from_code() {
        assert_eq!(AgentError::from_code(ResultCode::Success, "ok".into()), None);
        assert_eq!(AgentError::from_code(ResultCode::Async, String::new()), None);
        let err = AgentError::from_code(ResultCode::BackendError, "exit 2".into()).unwrap();
        assert_eq!(err, AgentError::Backend("exit 2".into()));
        for code in ResultCode::ALL {
            if let Some(err) = AgentError::from_code(code, "m".into()) {
                assert_eq!(err.code(), code);
            }
        }
    }

    #[test]
    fn test_io_error_is_other() {
        let err: AgentError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.code(), ResultCode::OtherError);
    }
}
