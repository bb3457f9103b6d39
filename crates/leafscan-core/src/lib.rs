//! LeafScan Core
//!
//! Core types and error handling shared across LeafScan components.
//!
//! This crate provides:
//! - The error taxonomy surfaced to callers (`Error`, `ErrorKind`)
//! - Label records resolved from the disease table
//! - The fixed-shape input tensor handed to classifiers
//! - Score vectors and their argmax

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{InputTensor, LabelRecord, ProbabilityVector};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::types::{InputTensor, LabelRecord, ProbabilityVector};
}
