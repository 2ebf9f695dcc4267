//! Error types for testkit operations.
//!
//! Every fallible operation in the crate returns [`TestkitError`]. The variants
//! are split the same way the orchestrator treats them: user input errors
//! (`InvalidLink`, `InvalidScenario`), programmer errors (`InvariantViolation`,
//! `UnknownNode`) and collaborator failures (`UnexpectedRemoteStatus`,
//! `Transport`, ...). Only the latter are ever retried, and only in the
//! best-effort paths (auto-miner cycles, the confirmation address retry).

/// Error codes for scripting and CLI exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TestkitErrorCode {
    /// Malformed payment link
    InvalidLink = 1000,
    /// Malformed or unsupported scenario document
    InvalidScenario = 1001,
    /// Invalid request/data
    InvalidData = 1002,
    /// Node identity not known to the registry
    UnknownNode = 2000,
    /// Operation called in a state that does not allow it
    InvariantViolation = 3000,
    /// Collaborator answered with a non-success status
    UnexpectedRemoteStatus = 4000,
    /// Transport/network layer error
    Transport = 4001,
    /// Connection failed
    ConnectionFailed = 4002,
    /// Bounded wait expired
    Timeout = 4003,
    /// Serialization error
    Serialization = 5000,
    /// Payment-specific errors
    Payment = 6000,
    /// Filesystem or process error
    Io = 7000,
}

/// Comprehensive error type for testkit operations.
#[derive(Debug, thiserror::Error)]
pub enum TestkitError {
    /// The payment link could not be classified.
    #[error("invalid payment link: {0}")]
    InvalidLink(String),

    /// The scenario document is invalid; nothing was applied.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// Invalid data provided.
    #[error("invalid {field}: {reason}")]
    InvalidData {
        /// Field or parameter name
        field: String,
        /// Reason for invalidity
        reason: String,
    },

    /// The node identity is not the primary, the secondary or a scenario node.
    #[error("unknown node {identity}")]
    UnknownNode {
        /// Network identity (pubkey) that failed to resolve
        identity: String,
    },

    /// Operation is not allowed in the current state.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A collaborator returned something other than success.
    #[error("unexpected remote status {status}, method: {method}{}", error_suffix(.error))]
    UnexpectedRemoteStatus {
        /// Remote method or endpoint that failed
        method: String,
        /// HTTP status (or JSON-RPC error code)
        status: i64,
        /// Error message reported by the remote, if any
        error: Option<String>,
    },

    /// Transport/network layer error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Connection failed.
    #[error("connection to {target} failed: {reason}")]
    ConnectionFailed {
        /// Target endpoint or service
        target: String,
        /// Underlying error message
        reason: String,
    },

    /// A bounded wait expired.
    #[error("{operation} timed out after {waited_ms}ms")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// How long the operation waited in milliseconds
        waited_ms: u64,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Payment operation failed.
    #[error("payment failed: {reason}")]
    Payment {
        /// Failure reason
        reason: String,
    },

    /// Filesystem or process error.
    #[error("io error: {0}")]
    Io(String),
}

impl TestkitError {
    /// Get the error code.
    pub fn code(&self) -> TestkitErrorCode {
        match self {
            Self::InvalidLink(_) => TestkitErrorCode::InvalidLink,
            Self::InvalidScenario(_) => TestkitErrorCode::InvalidScenario,
            Self::InvalidData { .. } => TestkitErrorCode::InvalidData,
            Self::UnknownNode { .. } => TestkitErrorCode::UnknownNode,
            Self::InvariantViolation(_) => TestkitErrorCode::InvariantViolation,
            Self::UnexpectedRemoteStatus { .. } => TestkitErrorCode::UnexpectedRemoteStatus,
            Self::Transport(_) => TestkitErrorCode::Transport,
            Self::ConnectionFailed { .. } => TestkitErrorCode::ConnectionFailed,
            Self::Timeout { .. } => TestkitErrorCode::Timeout,
            Self::Serialization(_) => TestkitErrorCode::Serialization,
            Self::Payment { .. } => TestkitErrorCode::Payment,
            Self::Io(_) => TestkitErrorCode::Io,
        }
    }

    /// Returns true if this error is potentially recoverable by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::ConnectionFailed { .. }
                | Self::Timeout { .. }
                | Self::UnexpectedRemoteStatus { .. }
        )
    }

    /// Create an invalid link error.
    pub fn invalid_link(reason: impl Into<String>) -> Self {
        Self::InvalidLink(reason.into())
    }

    /// Create an invariant violation error.
    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation(reason.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unexpected remote status error.
    pub fn remote_status(method: impl Into<String>, status: i64, error: Option<String>) -> Self {
        Self::UnexpectedRemoteStatus {
            method: method.into(),
            status,
            error,
        }
    }
}

fn error_suffix(error: &Option<String>) -> String {
    match error {
        Some(message) => format!(", error message: {}", message),
        None => String::new(),
    }
}

impl From<serde_json::Error> for TestkitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for TestkitError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
