//! Error types for vflow

use thiserror::Error;

use crate::types::Phase;

/// Result type alias using the vflow Error
pub type Result<T> = std::result::Result<T, Error>;

/// vflow error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Spec not found: {kind}{}", .tag.as_ref().map(|t| format!(" (tag '{}')", t)).unwrap_or_default())]
    SpecNotFound { kind: String, tag: Option<String> },

    #[error("Duplicate spec: {kind}{}", .tag.as_ref().map(|t| format!(" (tag '{}')", t)).unwrap_or_default())]
    DuplicateSpec { kind: String, tag: Option<String> },

    #[error("Invalid spec {kind}: {reason}")]
    InvalidSpec { kind: String, reason: String },

    #[error("Testbed resolution failed for '{key}' on provider '{provider}': {reason}")]
    TestbedResolution {
        provider: String,
        key: String,
        reason: String,
    },

    #[error("Step failed: {step} ({phase}) - {source}")]
    StepExecution {
        step: String,
        phase: Phase,
        retryable: bool,
        source: Box<Error>,
    },

    #[error("Timed out after {elapsed_ms} ms ({attempts} polls) waiting for {what}; last observed: {observed}")]
    VerificationTimeout {
        what: String,
        observed: String,
        elapsed_ms: u64,
        attempts: u32,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Domain error: {0}")]
    Domain(String),

    #[error("UI error: {0}")]
    Ui(String),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Resource already exists: {kind} with id {id}")]
    AlreadyExists { kind: String, id: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the failed operation could succeed.
    ///
    /// Only transport failures are transient. A step failure inherits the
    /// flag computed when it was wrapped.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::StepExecution { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Wrap a step's cause with the label and phase it failed in.
    pub fn step_failed(step: impl Into<String>, phase: Phase, cause: Error) -> Self {
        Error::StepExecution {
            step: step.into(),
            phase,
            retryable: cause.is_retryable(),
            source: Box::new(cause),
        }
    }

    /// The innermost cause, looking through step wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::StepExecution { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
