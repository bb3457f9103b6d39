//! Model sources and ONNX model loading

use crate::classifier::Classifier;
use leafscan_core::Result;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "onnx")]
use crate::blocking::run_blocking;
#[cfg(feature = "onnx")]
use async_trait::async_trait;
#[cfg(feature = "onnx")]
use leafscan_core::{InputTensor, ProbabilityVector};
#[cfg(feature = "onnx")]
use std::time::Instant;
#[cfg(feature = "onnx")]
use tract_onnx::prelude::*;

/// Where the model artifact comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelSource {
    /// Download over HTTP(S)
    Url {
        url: String,
        /// Expected SHA-256 of the artifact, hex encoded
        #[serde(default)]
        sha256: Option<String>,
    },

    /// Read an already downloaded artifact from disk
    Local {
        path: PathBuf,
        #[serde(default)]
        sha256: Option<String>,
    },
}

impl ModelSource {
    /// Create a URL source without a pinned digest
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url {
            url: url.into(),
            sha256: None,
        }
    }

    /// Create a local file source without a pinned digest
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local {
            path: path.into(),
            sha256: None,
        }
    }

    /// Pin the expected SHA-256 digest
    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        match &mut self {
            Self::Url { sha256, .. } | Self::Local { sha256, .. } => {
                *sha256 = Some(digest.into());
            }
        }
        self
    }

    /// Expected digest, if pinned
    pub fn sha256(&self) -> Option<&str> {
        match self {
            Self::Url { sha256, .. } | Self::Local { sha256, .. } => sha256.as_deref(),
        }
    }

    /// Human-readable location for logs
    pub fn location(&self) -> String {
        match self {
            Self::Url { url, .. } => url.clone(),
            Self::Local { path, .. } => path.display().to_string(),
        }
    }
}

/// Zip container signature, as used by Keras `.keras` archives
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// HDF5 signature, as used by legacy Keras `.h5` models
const HDF5_MAGIC: &[u8] = b"\x89HDF\r\n\x1a\n";

/// Fail early with a clear message when the artifact is a Keras export
/// rather than ONNX.
fn reject_foreign_format(path: &Path) -> Result<()> {
    let mut header = [0u8; 8];
    let read = std::fs::File::open(path)
        .and_then(|mut file| file.read(&mut header))
        .map_err(|e| {
            leafscan_core::Error::deserialization(format!(
                "Failed to read model artifact {}: {}",
                path.display(),
                e
            ))
        })?;
    let header = &header[..read];

    let format = if header.starts_with(ZIP_MAGIC) {
        "a zip archive (Keras .keras format)"
    } else if header.starts_with(HDF5_MAGIC) {
        "an HDF5 file (Keras .h5 format)"
    } else {
        return Ok(());
    };

    Err(leafscan_core::Error::deserialization(format!(
        "Model artifact {} is {}, not ONNX; convert it with tf2onnx first",
        path.display(),
        format
    )))
}

/// Turns an artifact on disk into a ready classifier
pub trait ModelLoader: Send + Sync {
    /// Deserialize the artifact at `path`.
    ///
    /// Bytes that are not a loadable model must fail with
    /// `Error::Deserialization`.
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>>;
}

/// Loads ONNX exports of the leaf classifier with tract
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    /// Input shape as `[batch, height, width, channels]`
    input_shape: [usize; 4],
}

impl OnnxModelLoader {
    /// Create a loader for a square NHWC RGB input of `target_size` pixels
    pub fn new(target_size: u32) -> Self {
        Self {
            input_shape: [1, target_size as usize, target_size as usize, 3],
        }
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }
}

impl Default for OnnxModelLoader {
    fn default() -> Self {
        Self::new(crate::preprocess::DEFAULT_TARGET_SIZE)
    }
}

impl ModelLoader for OnnxModelLoader {
    #[cfg(feature = "onnx")]
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>> {
        reject_foreign_format(path)?;

        let start = Instant::now();
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact(self.input_shape).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                leafscan_core::Error::deserialization(format!(
                    "Failed to load ONNX model from {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let num_classes = plan
            .model()
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().map(|dims| dims.iter().product()));

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx-model")
            .to_string();

        tracing::info!(
            model = %name,
            classes = ?num_classes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded ONNX model"
        );

        Ok(Arc::new(OnnxClassifier {
            name,
            plan: Arc::new(plan),
            input_shape: self.input_shape,
            num_classes,
        }))
    }

    #[cfg(not(feature = "onnx"))]
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>> {
        reject_foreign_format(path)?;
        Err(leafscan_core::Error::deserialization(format!(
            "Loading {} requires the 'onnx' feature",
            path.display()
        )))
    }
}

/// Runnable tract plan wrapped as a [`Classifier`]
#[cfg(feature = "onnx")]
pub struct OnnxClassifier {
    name: String,
    plan: Arc<TypedRunnableModel<TypedModel>>,
    input_shape: [usize; 4],
    num_classes: Option<usize>,
}

#[cfg(feature = "onnx")]
#[async_trait]
impl Classifier for OnnxClassifier {
    async fn classify(&self, input: &InputTensor) -> Result<ProbabilityVector> {
        if input.shape() != self.input_shape {
            return Err(leafscan_core::Error::classifier(format!(
                "Input shape {:?} does not match model input {:?}",
                input.shape(),
                self.input_shape
            )));
        }

        let tensor = Tensor::from_shape(&self.input_shape, input.as_slice())
            .map_err(|e| leafscan_core::Error::classifier(format!("Failed to build input tensor: {}", e)))?;

        let plan = Arc::clone(&self.plan);
        let scores = run_blocking(move || {
            let outputs = plan
                .run(tvec!(tensor.into_tvalue()))
                .map_err(|e| leafscan_core::Error::classifier(format!("Inference failed: {}", e)))?;

            let output = outputs
                .first()
                .ok_or_else(|| leafscan_core::Error::classifier("Model produced no outputs"))?
                .to_array_view::<f32>()
                .map_err(|e| leafscan_core::Error::classifier(format!("Unexpected output type: {}", e)))?;

            Ok(output.iter().copied().collect::<Vec<f32>>())
        })
        .await?;

        Ok(ProbabilityVector::new(scores))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }
}
