//! Model provider: fetch once, load once, classify many times

use crate::blocking::run_blocking;
use crate::classifier::Classifier;
use crate::config::ModelSettings;
use crate::fetcher::{fetcher_for_source, ArtifactFetcher};
use crate::model_loader::{ModelLoader, OnnxModelLoader};
use leafscan_core::{Error, InputTensor, ProbabilityVector, Result};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tokio::sync::OnceCell;

/// Classifier together with the scratch file it was loaded from
struct LoadedModel {
    classifier: Arc<dyn Classifier>,
    /// Removed from disk when the provider is dropped
    artifact: TempPath,
}

/// Lazily fetches, verifies and loads the model on first use.
///
/// The loaded classifier is memoized for the provider's lifetime. Concurrent
/// first callers wait on the same initialization, so the artifact is fetched
/// at most once. A failed attempt leaves nothing cached and the next call
/// starts over.
pub struct ModelProvider {
    fetcher: Arc<dyn ArtifactFetcher>,
    loader: Arc<dyn ModelLoader>,
    sha256: Option<String>,
    scratch_dir: Option<PathBuf>,
    model: OnceCell<LoadedModel>,
}

impl ModelProvider {
    /// Create a provider from an explicit fetcher and loader
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            fetcher,
            loader,
            sha256: None,
            scratch_dir: None,
            model: OnceCell::new(),
        }
    }

    /// Build the provider described by the model settings.
    ///
    /// Fails with `Error::Config` when no model source is configured.
    pub fn from_settings(settings: &ModelSettings, target_size: u32) -> Result<Self> {
        let source = settings.source.as_ref().ok_or_else(|| {
            Error::config(
                "model.source is not set; point it at an ONNX export of the leaf classifier \
                 (--model-path or --model-url)",
            )
        })?;

        let timeout = settings.timeout_secs.map(Duration::from_secs);
        let fetcher = fetcher_for_source(source, timeout)?;
        let loader = Arc::new(OnnxModelLoader::new(target_size));

        let mut provider = Self::new(fetcher, loader);
        if let Some(digest) = source.sha256() {
            provider = provider.with_sha256(digest);
        }
        if let Some(dir) = &settings.scratch_dir {
            provider = provider.with_scratch_dir(dir.clone());
        }
        Ok(provider)
    }

    /// Require the artifact to match this hex-encoded SHA-256 digest
    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into().trim().to_ascii_lowercase());
        self
    }

    /// Write the downloaded artifact under `dir` instead of the system temp dir
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Get the classifier, fetching and loading it on the first call
    pub async fn acquire(&self) -> Result<Arc<dyn Classifier>> {
        let loaded = self
            .model
            .get_or_try_init(|| async {
                let result = self.load().await;
                if let Err(e) = &result {
                    tracing::warn!("Model acquisition from {} failed: {}", self.fetcher.location(), e);
                    metrics::counter!("leafscan_model_load_failures_total", "kind" => e.kind().as_str())
                        .increment(1);
                }
                result
            })
            .await?;

        Ok(Arc::clone(&loaded.classifier))
    }

    /// Classify a tensor with the memoized classifier
    pub async fn classify(&self, input: &InputTensor) -> Result<ProbabilityVector> {
        let classifier = self.acquire().await?;
        classifier.classify(input).await
    }

    /// Whether a classifier is already cached
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Scratch file the cached model was loaded from
    pub fn artifact_path(&self) -> Option<&Path> {
        self.model.get().map(|m| &*m.artifact)
    }

    async fn load(&self) -> Result<LoadedModel> {
        let start = Instant::now();

        metrics::counter!("leafscan_model_fetches_total").increment(1);
        let bytes = self.fetcher.fetch().await?;
        let size = bytes.len();

        let expected = self.sha256.clone();
        let scratch_dir = self.scratch_dir.clone();
        let loader = Arc::clone(&self.loader);

        let (classifier, artifact) = run_blocking(move || {
            if let Some(expected) = &expected {
                verify_digest(&bytes, expected)?;
                tracing::debug!("Model artifact digest verified");
            }

            let artifact = write_scratch_file(scratch_dir.as_deref(), &bytes)?;
            let classifier = loader.load(&artifact)?;
            Ok((classifier, artifact))
        })
        .await?;

        tracing::info!(
            source = %self.fetcher.location(),
            classifier = classifier.name(),
            bytes = size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model ready"
        );

        Ok(LoadedModel { classifier, artifact })
    }
}

/// Write the artifact to a scratch file that is deleted when the returned
/// path is dropped
fn write_scratch_file(dir: Option<&Path>, bytes: &[u8]) -> Result<TempPath> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("leafscan-model-").suffix(".onnx");

    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(bytes)?;
    file.flush()?;

    let path = file.into_temp_path();
    tracing::debug!("Model artifact written to {}", path.display());
    Ok(path)
}

/// Compare the SHA-256 of `bytes` against a lowercase hex digest
fn verify_digest(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = format!("{:x}", Sha256::digest(bytes));
    if actual != expected {
        return Err(Error::Integrity {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
