//! Error types shared by every server layer.
//!
//! [`ServerError`] is the one error the pipeline surfaces to the HTTP
//! adapter. Its variants map one-to-one onto response classes:
//!
//! | Variant | Cause | Status |
//! |---|---|---|
//! | `MissingParameter`, `InvalidValue`, `BadSource` | malformed request | 400 |
//! | `NotFound` | source file absent | 404 |
//! | `Decode`, `Encode` | codec failure | 500 |
//! | `Unexpected` | I/O or internal invariant violation | 500 |

use crate::imaging::BackendError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    #[error("missing parameter: {0}")]
    MissingParameter(String),
    #[error("invalid value for parameter '{param}': {message}")]
    InvalidValue { param: String, message: String },
    #[error("bad source: {0}")]
    BadSource(String),
    #[error("source not found: {0}")]
    NotFound(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ServerError {
    pub fn invalid(param: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            param: param.to_string(),
            message: message.into(),
        }
    }

    /// Errors caused by the request itself rather than by the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter(_)
                | Self::InvalidValue { .. }
                | Self::BadSource(_)
                | Self::NotFound(_)
        )
    }
}

/// Failure of a typed accessor on the parameter store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("parameter '{0}' is not set")]
    Missing(String),
    #[error("parameter '{key}' is not a {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("parameter '{0}' is already set")]
    Duplicate(String),
}

impl From<ParamError> for ServerError {
    fn from(err: ParamError) -> Self {
        match err {
            ParamError::Missing(key) => ServerError::MissingParameter(key),
            ParamError::WrongType { ref key, .. } => ServerError::InvalidValue {
                param: key.clone(),
                message: err.to_string(),
            },
            ParamError::Duplicate(_) => ServerError::Unexpected(err.to_string()),
        }
    }
}

impl From<BackendError> for ServerError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Decode(msg) => ServerError::Decode(msg),
            BackendError::Encode(msg) => ServerError::Encode(msg),
        }
    }
}
