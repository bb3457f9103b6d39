//! Error types for LeafScan

use serde::Serialize;
use std::fmt;

/// Result type alias using LeafScan's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for LeafScan operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Model artifact could not be fetched (transport failure or non-2xx)
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Downloaded artifact did not match its pinned digest
    #[error("integrity error: expected sha256 {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Artifact bytes are not a loadable model
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Predicted class has no entry in the label table
    #[error("class index {index} out of range for label table of {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    /// Input image could not be decoded
    #[error("image error: {0}")]
    Image(String),

    /// Label table missing or malformed
    #[error("label table error: {0}")]
    Labels(String),

    /// Classifier execution errors
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new retrieval error
    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    /// Create a new deserialization error
    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    /// Create a new image error
    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }

    /// Create a new label table error
    pub fn labels(msg: impl Into<String>) -> Self {
        Self::Labels(msg.into())
    }

    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Stable discriminant for presentation layers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Retrieval(_) => ErrorKind::Retrieval,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Deserialization(_) => ErrorKind::Deserialization,
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::Image(_) => ErrorKind::Image,
            Self::Labels(_) => ErrorKind::Labels,
            Self::Classifier(_) => ErrorKind::Classifier,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether the failure is caused by the caller's input rather than the
    /// model or its configuration.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Image(_))
    }
}

/// Failure class of an [`Error`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Retrieval,
    Integrity,
    Deserialization,
    IndexOutOfRange,
    Image,
    Labels,
    Classifier,
    Config,
    Io,
    Serialization,
}

impl ErrorKind {
    /// Snake-case name, as used in metrics labels and JSON bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retrieval => "retrieval",
            Self::Integrity => "integrity",
            Self::Deserialization => "deserialization",
            Self::IndexOutOfRange => "index_out_of_range",
            Self::Image => "image",
            Self::Labels => "labels",
            Self::Classifier => "classifier",
            Self::Config => "config",
            Self::Io => "io",
            Self::Serialization => "serialization",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
