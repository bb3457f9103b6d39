//! Image decoding and tensor preprocessing
//!
//! Every input image, whatever its size or color mode, becomes a
//! `(1, target_size, target_size, 3)` tensor of raw `0..=255` channel values.
//! Grayscale sources are duplicated into all three channels, alpha is
//! dropped and palette images are expanded on decode. Resizing uses a fixed
//! filter, so the same bytes always produce the same tensor.

use image::imageops::{self, FilterType};
use image::DynamicImage;
use leafscan_core::{Error, InputTensor, Result};
use serde::{Deserialize, Serialize};

/// Spatial resolution the leaf classifier was trained on
pub const DEFAULT_TARGET_SIZE: u32 = 160;

/// Resampling filter used when resizing to the model resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    /// Linear interpolation in both axes (the training pipeline's resize)
    #[default]
    Bilinear,
    Bicubic,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Bilinear => FilterType::Triangle,
            ResizeFilter::Bicubic => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Preprocessing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Output width and height in pixels
    #[serde(default = "default_target_size")]
    pub target_size: u32,

    /// Resampling filter
    #[serde(default)]
    pub filter: ResizeFilter,
}

fn default_target_size() -> u32 {
    DEFAULT_TARGET_SIZE
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            filter: ResizeFilter::default(),
        }
    }
}

impl PreprocessConfig {
    /// Shape of the tensors this configuration produces
    pub fn tensor_shape(&self) -> [usize; 4] {
        let size = self.target_size as usize;
        [1, size, size, 3]
    }
}

/// Decode raw image bytes, guessing the format from its magic number
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| Error::image(format!("Failed to decode image: {}", e)))
}

/// Convert an image into the model's input tensor
pub fn preprocess(image: &DynamicImage, config: &PreprocessConfig) -> Result<InputTensor> {
    if config.target_size == 0 {
        return Err(Error::config("target_size must be greater than zero"));
    }

    let rgb = image.to_rgb8();
    let resized = imageops::resize(
        &rgb,
        config.target_size,
        config.target_size,
        config.filter.into(),
    );

    tracing::debug!(
        source_width = image.width(),
        source_height = image.height(),
        target = config.target_size,
        "Preprocessed image"
    );

    let data = resized.into_raw().into_iter().map(f32::from).collect();
    InputTensor::from_shape_vec(config.tensor_shape(), data)
}
