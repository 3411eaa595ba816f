//! Error taxonomy for the reconciliation engine.
//!
//! Every failure inside one resource kind's run ends up wrapped in a [`SectionError`], which
//! names the kind and keeps the underlying cause as its `source()`. Rendering the chain into a
//! human-readable message is left to the outermost boundary (the CLI).

use thiserror::Error;

use crate::contract::ResourceKind;

/// Boxed cause, in the same shape the adapter traits have always used for opaque failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Network or authentication failure reported by a [`crate::contract::ResourceAdapter`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Connection refused on host '{host}'")]
    ConnectionRefused { host: String },

    #[error("Received {status} {reason} from {url}")]
    Status {
        status: u16,
        reason: String,
        url: String,
        /// Server-provided error messages, if the body carried any.
        message: Option<String>,
    },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Unexpected response body from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Malformed user input, rejected before any remote call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown resource kind '{value}'. Allowed values are: {allowed}")]
    UnknownKind { value: String, allowed: String },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("--only and --except cannot be used together")]
    ConflictingKindFilters,
}

/// The folder hierarchy cannot converge.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructuralError {
    #[error(
        "folder hierarchy cannot converge: {pending} folder(s) reference unresolved parents {parents:?} (cycle or dangling parent)"
    )]
    UnresolvedParents { pending: usize, parents: Vec<String> },
}

/// Failure while reconciling or snapshotting a single resource kind.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("malformed snapshot: {0}")]
    Format(String),
}

impl From<serde_json::Error> for ReconcileError {
    fn from(e: serde_json::Error) -> Self {
        ReconcileError::Format(e.to_string())
    }
}

/// Which top-level operation a section belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Snapshot,
    Apply,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Snapshot => f.write_str("Snapshot"),
            Stage::Apply => f.write_str("Apply"),
        }
    }
}

/// A failure attributed to exactly one resource kind.
#[derive(Debug, Error)]
#[error("[{kind}] {stage} operation failed")]
pub struct SectionError {
    pub kind: ResourceKind,
    pub stage: Stage,
    #[source]
    pub source: BoxError,
}

impl SectionError {
    pub fn new(kind: ResourceKind, stage: Stage, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            stage,
            source: source.into(),
        }
    }
}
