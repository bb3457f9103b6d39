//! Classifier trait

use async_trait::async_trait;
use leafscan_core::{InputTensor, ProbabilityVector, Result};

/// A loaded model that maps a fixed-shape input tensor to per-class scores
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Score a single batch-of-one tensor.
    ///
    /// The tensor shape must match what the model was loaded for; a mismatch
    /// is reported as a classifier error by the implementation.
    async fn classify(&self, input: &InputTensor) -> Result<ProbabilityVector>;

    /// Get the classifier name
    fn name(&self) -> &str;

    /// Number of output classes, when the model declares it up front
    fn num_classes(&self) -> Option<usize> {
        None
    }
}
