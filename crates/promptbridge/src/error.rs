//! Error types for the bridge.
//!
//! Every category carries a stable tag (see [`LoggableError::category`]) which
//! is attached to log events so diagnostics can be routed per category.

use serde_json::Value;
use thiserror::Error;

/// Result type alias using the bridge error type.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// An error that knows which log category it belongs to.
pub trait LoggableError: std::error::Error {
    fn category(&self) -> &'static str;
}

/// Malformed inbound JSON or an invalid call shape.
#[derive(Error, Debug)]
pub enum ReadingError {
    #[error("Script called with invalid parameters: {0}")]
    InvalidCallingFromScript(String),

    #[error("Error from JSON decoder: {0}")]
    UnderlyingCodec(#[from] json5::Error),
}

impl LoggableError for ReadingError {
    fn category(&self) -> &'static str {
        "JSON.Reading"
    }
}

/// A value that could not be turned into JSON text.
#[derive(Error, Debug)]
pub enum WritingError {
    #[error("Object is not a valid JSON object: {0}")]
    InvalidObject(Value),

    #[error("Failed to encode JSON data into UTF-8 text: {0}")]
    FailedToEncode(Value),

    #[error("Error from JSON encoder: {0}")]
    UnderlyingCodec(#[from] serde_json::Error),
}

impl LoggableError for WritingError {
    fn category(&self) -> &'static str {
        "JSON.Writing"
    }
}

/// Failure to turn a raw name into a routable method.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameResolvingError {
    #[error("Calling method in an invalid format: {0:?}")]
    InvalidFormat(String),

    #[error("No such namespace: {0:?}")]
    NamespaceNotFound(String),

    #[error("Method {0} not found")]
    MethodNotFound(String),
}

impl LoggableError for NameResolvingError {
    fn category(&self) -> &'static str {
        "NameResolving"
    }
}

/// Failure of a host-initiated call into the scripted environment.
#[derive(Error, Debug)]
pub enum CallingScriptError {
    #[error("Script returned a value with mismatched type: {0}")]
    ReturnTypeMismatch(Value),

    #[error("Underlying: {0}")]
    Underlying(#[from] WritingError),

    #[error("Bridge was torn down before the script responded")]
    BridgeClosed,
}

impl LoggableError for CallingScriptError {
    fn category(&self) -> &'static str {
        "CallingScript"
    }
}

/// Main error type for the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Reading(#[from] ReadingError),

    #[error(transparent)]
    Writing(#[from] WritingError),

    #[error(transparent)]
    NameResolving(#[from] NameResolvingError),

    #[error(transparent)]
    CallingScript(#[from] CallingScriptError),
}

impl LoggableError for BridgeError {
    fn category(&self) -> &'static str {
        match self {
            BridgeError::Reading(e) => e.category(),
            BridgeError::Writing(e) => e.category(),
            BridgeError::NameResolving(e) => e.category(),
            BridgeError::CallingScript(e) => e.category(),
        }
    }
}

/// Log an error at `error` level, tagged with its category.
pub(crate) fn log_error<E: LoggableError>(error: &E) {
    tracing::error!(target: "bridge", category = error.category(), "{}", error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_are_stable() {
        assert_eq!(
            ReadingError::InvalidCallingFromScript(String::new()).category(),
            "JSON.Reading"
        );
        assert_eq!(WritingError::InvalidObject(Value::Null).category(), "JSON.Writing");
        assert_eq!(
            NameResolvingError::InvalidFormat(String::new()).category(),
            "NameResolving"
        );
        assert_eq!(CallingScriptError::BridgeClosed.category(), "CallingScript");
    }

    #[test]
    fn test_bridge_error_forwards_category() {
        let err: BridgeError = NameResolvingError::MethodNotFound("a.b".into()).into();
        assert_eq!(err.category(), "NameResolving");
        assert_eq!(err.to_string(), "Method a.b not found");
    }
}
