//! Error types for Trueno-ISC
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Every failure is local and synchronous. Nothing here is transient, so no
//! variant is ever retried by the crate itself.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-ISC error types
#[derive(Error, Debug)]
pub enum Error {
    /// Distribution kind not in the closed set of micro-models
    #[error("Unknown component distribution: {0}\nExpected one of: gaussian, poisson, poisson_oneside")]
    UnknownDistribution(String),

    /// Feature column list is empty or repeats a column
    #[error("Invalid feature columns: {0}")]
    InvalidFeatures(String),

    /// Component feature columns do not fit the distribution kind
    #[error("Invalid feature range for component {component}: {reason}")]
    InvalidFeatureRange {
        /// Mixture component index
        component: usize,
        /// What is wrong with the range
        reason: String,
    },

    /// Component reads a column outside the row schema
    #[error("Component {component} reads column {column} but rows only have {width} columns")]
    FeatureOutOfBounds {
        /// Mixture component index
        component: usize,
        /// Offending column
        column: usize,
        /// Row width from the schema
        width: usize,
    },

    /// Detector configuration rejected at construction or `set_params`
    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),

    /// Caller supplied a buffer or row of the wrong length
    #[error("Length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Which buffer or row
        what: &'static str,
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Column type outside the recognized set
    #[error("Unhandled column type: {0}")]
    UnhandledColumnType(String),

    /// Column name not present in the schema
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// Persisted document lacks an expected key or child
    #[error("Missing key in model document: {path}")]
    MissingKey {
        /// Slash-separated path of the missing entry
        path: String,
    },

    /// Persisted entry has the wrong shape
    #[error("Type mismatch in model document at {path}: expected {expected}")]
    TypeMismatch {
        /// Slash-separated path of the entry
        path: String,
        /// Expected value shape
        expected: &'static str,
    },

    /// Persisted array holds a different number of values than the model
    #[error("Array length mismatch in model document at {path}: expected {expected}, got {actual}")]
    ArrayLengthMismatch {
        /// Slash-separated path of the entry
        path: String,
        /// Length the model requires
        expected: usize,
        /// Length found in the document
        actual: usize,
    },

    /// Exporter asked to write the same key twice into one node
    #[error("Duplicate key in model document: {path}")]
    DuplicateKey {
        /// Slash-separated path of the entry
        path: String,
    },

    /// Document describes a different detector than the one importing it
    #[error("Model document does not match detector: {0}")]
    ModelMismatch(String),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors raised while building a detector from its specs
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownDistribution(_)
                | Self::InvalidFeatures(_)
                | Self::InvalidFeatureRange { .. }
                | Self::FeatureOutOfBounds { .. }
                | Self::InvalidConfig(_)
        )
    }

    /// True for errors raised while reading a persisted model document
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::MissingKey { .. }
                | Self::TypeMismatch { .. }
                | Self::ArrayLengthMismatch { .. }
                | Self::DuplicateKey { .. }
                | Self::ModelMismatch(_)
                | Self::Json(_)
        )
    }
}
