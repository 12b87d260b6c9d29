//! # Error Definitions
//!
//! The hub's failure taxonomy, and the structured failure a caller receives
//! in place of a result.

use std::fmt;

use crate::connection::ConnectionId;

/// Failures raised by registration, dispatch, and delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A method with this name is already registered. Fatal at startup.
    DuplicateMethod(String),
    /// No method is registered under this name.
    MethodNotFound(String),
    /// The arguments did not match the method's parameter arity or shapes.
    ArgumentMismatch { method: String, details: String },
    /// The method body returned an error or panicked.
    MethodExecution { method: String, message: String },
    /// A streaming method was invoked without a correlation token to tag items with.
    StreamRequiresToken(String),
    /// The target connection disconnected before the message could be delivered.
    ConnectionGone(ConnectionId),
}

impl Error {
    /// The failure kind reported to a caller for this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::DuplicateMethod(_) | Self::StreamRequiresToken(_) => FailureKind::InvalidInvocation,
            Self::MethodNotFound(_) => FailureKind::MethodNotFound,
            Self::ArgumentMismatch { .. } => FailureKind::ArgumentMismatch,
            Self::MethodExecution { .. } | Self::ConnectionGone(_) => FailureKind::MethodExecution,
        }
    }

    /// Converts this error into the failure payload sent to the caller.
    pub fn to_failure(&self) -> Failure {
        Failure { kind: self.kind(), message: self.to_string() }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateMethod(name) => write!(f, "method '{}' is already registered", name),
            Self::MethodNotFound(name) => write!(f, "method '{}' does not exist", name),
            Self::ArgumentMismatch { method, details } => {
                write!(f, "invalid arguments for '{}': {}", method, details)
            }
            Self::MethodExecution { method, message } => {
                write!(f, "method '{}' failed: {}", method, message)
            }
            Self::StreamRequiresToken(name) => {
                write!(f, "streaming method '{}' requires an invocation id", name)
            }
            Self::ConnectionGone(id) => write!(f, "connection {} is gone", id),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons for an invocation failure (the "Err" side of a completion).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MethodNotFound,
    ArgumentMismatch,
    MethodExecution,
    InvalidInvocation,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MethodNotFound => "MethodNotFound",
            Self::ArgumentMismatch => "ArgumentMismatch",
            Self::MethodExecution => "MethodExecution",
            Self::InvalidInvocation => "InvalidInvocation",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured failure, distinct from a normal result.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
