//! LeafScan Classifiers
//!
//! Turns a photo of a plant leaf into a disease label.
//!
//! The crate is split along the two halves of an inference request:
//! - Model provider: fetches the model artifact once, verifies and loads it,
//!   and hands out a shared [`Classifier`]
//! - Inference pipeline: decodes and preprocesses the image into a
//!   `(1, 160, 160, 3)` tensor, classifies it, and resolves the winning class
//!   index against the [`LabelTable`]
//!
//! Everything is wired explicitly: the pipeline owns its provider and label
//! table, and the provider owns its fetcher and loader.

mod blocking;
pub mod classifier;
pub mod config;
pub mod fetcher;
pub mod labels;
pub mod model_loader;
pub mod pipeline;
pub mod preprocess;
pub mod provider;

pub use classifier::Classifier;
pub use config::{load_config, LabelSettings, LeafScanConfig, ModelSettings};
pub use fetcher::{ArtifactFetcher, FileFetcher, HttpFetcher};
pub use labels::LabelTable;
pub use model_loader::{ModelLoader, ModelSource, OnnxModelLoader};
pub use pipeline::{InferencePipeline, Prediction};
pub use preprocess::{decode_image, preprocess, PreprocessConfig, ResizeFilter};
pub use provider::ModelProvider;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::Classifier;
    pub use crate::labels::LabelTable;
    pub use crate::pipeline::{InferencePipeline, Prediction};
    pub use crate::provider::ModelProvider;
    pub use leafscan_core::prelude::*;
}
