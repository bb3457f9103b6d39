//! Core types for LeafScan

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Disease information associated with one model output class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    /// Display name of the class (plant and disease)
    pub name: String,

    /// What causes the disease
    pub cause: String,

    /// Treatment suggestions
    pub cure: String,
}

impl LabelRecord {
    /// Create a new label record
    pub fn new(
        name: impl Into<String>,
        cause: impl Into<String>,
        cure: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cause: cause.into(),
            cure: cure.into(),
        }
    }
}

/// Batch-of-one image tensor in NHWC layout.
///
/// The buffer is row-major over `(batch, height, width, channel)`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl InputTensor {
    /// Build a tensor from a shape and a row-major buffer
    pub fn from_shape_vec(shape: [usize; 4], data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::classifier(format!(
                "tensor buffer of {} values does not match shape {:?}",
                data.len(),
                shape
            )));
        }
        Ok(Self { shape, data })
    }

    /// Shape as `[batch, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    pub fn channels(&self) -> usize {
        self.shape[3]
    }

    /// Raw row-major values
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consume the tensor, returning its buffer
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Channel values of the pixel at `(y, x)` in the first batch entry
    pub fn pixel(&self, y: usize, x: usize) -> &[f32] {
        let c = self.channels();
        let start = (y * self.width() + x) * c;
        &self.data[start..start + c]
    }

    /// Mean value of every channel across the whole image
    pub fn channel_means(&self) -> Vec<f32> {
        let c = self.channels();
        let mut sums = vec![0f64; c];
        for px in self.data.chunks_exact(c) {
            for (sum, v) in sums.iter_mut().zip(px) {
                *sum += *v as f64;
            }
        }
        let pixels = (self.data.len() / c.max(1)).max(1) as f64;
        sums.into_iter().map(|s| (s / pixels) as f32).collect()
    }
}

/// Per-class scores produced by a classifier
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    /// Wrap a score vector
    pub fn new(scores: Vec<f32>) -> Self {
        Self(scores)
    }

    /// Index of the highest score.
    ///
    /// Equal maxima resolve to the lowest index. NaN scores never win, unlike
    /// numpy's `argmax`, which returns the first NaN it sees.
    /// Returns `None` for an empty or all-NaN vector.
    pub fn argmax(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &score) in self.0.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((i, score)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Score at `index`, if present
    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for ProbabilityVector {
    fn from(scores: Vec<f32>) -> Self {
        Self(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_argmax_picks_highest() {
        let scores = ProbabilityVector::new(vec![0.1, 0.7, 0.2]);
        assert_eq!(scores.argmax(), Some(1));
    }

    #[test]
    fn test_argmax_tie_resolves_to_lowest_index() {
        let scores = ProbabilityVector::new(vec![0.1, 0.4, 0.1, 0.4]);
        assert_eq!(scores.argmax(), Some(1));
    }

    #[test]
    fn test_argmax_ignores_nan() {
        let scores = ProbabilityVector::new(vec![f32::NAN, 0.3, f32::NAN, 0.2]);
        assert_eq!(scores.argmax(), Some(1));
    }

    #[test]
    fn test_argmax_all_nan_is_none() {
        let scores = ProbabilityVector::new(vec![f32::NAN, f32::NAN]);
        assert_eq!(scores.argmax(), None);
    }

    #[test]
    fn test_argmax_empty_and_all_nan() {
        assert_eq!(ProbabilityVector::default().argmax(), None);
        assert_eq!(ProbabilityVector::new(vec![f32::NAN; 3]).argmax(), None);
    }

    #[test]
    fn test_argmax_negative_scores() {
        // Logits, not probabilities
        let scores = ProbabilityVector::new(vec![-3.0, -0.5, -1.0]);
        assert_eq!(scores.argmax(), Some(1));
    }

    #[test]
    fn test_tensor_shape_checked() {
        assert!(InputTensor::from_shape_vec([1, 2, 2, 3], vec![0.0; 12]).is_ok());
        let err = InputTensor::from_shape_vec([1, 2, 2, 3], vec![0.0; 11]).unwrap_err();
        assert!(matches!(err, Error::Classifier(_)));
    }

    #[test]
    fn test_tensor_pixel_and_means() {
        // 1x1x2x3: two pixels, red then blue
        let tensor =
            InputTensor::from_shape_vec([1, 1, 2, 3], vec![255.0, 0.0, 0.0, 0.0, 0.0, 255.0])
                .unwrap();
        assert_eq!(tensor.pixel(0, 1), &[0.0, 0.0, 255.0]);
        assert_eq!(tensor.channel_means(), vec![127.5, 0.0, 127.5]);
    }

    proptest! {
        #[test]
        fn prop_argmax_is_first_maximum(scores in prop::collection::vec(-1000.0f32..1000.0, 1..64)) {
            let idx = ProbabilityVector::new(scores.clone()).argmax().unwrap();
            let max = scores.iter().cloned().fold(f32::MIN, f32::max);
            prop_assert_eq!(scores[idx], max);
            prop_assert!(scores[..idx].iter().all(|&s| s < max));
        }
    }
}
