//! Image preprocessing stages applied before feature extraction.
//!
//! Each stage is a fixed-parameter image-to-image transform; the pipeline
//! applies them in configured order and performs no validation or recovery of
//! its own.

use image::{Rgb, RgbImage, imageops};

/// Per-channel ImageNet statistics used by [`Normalize`].
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Closed set of preprocessing stages.
#[derive(Debug, Clone)]
pub enum Preprocessor {
    Resize(Resize),
    BackgroundRemoval(BackgroundRemoval),
    Normalize(Normalize),
}

impl Preprocessor {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resize(_) => "resize",
            Self::BackgroundRemoval(_) => "background_removal",
            Self::Normalize(_) => "normalize",
        }
    }

    #[must_use]
    pub fn process(&self, image: &RgbImage) -> RgbImage {
        match self {
            Self::Resize(stage) => stage.process(image),
            Self::BackgroundRemoval(stage) => stage.process(image),
            Self::Normalize(stage) => stage.process(image),
        }
    }
}

/// Scales to a fixed target size with Lanczos resampling; deterministic for a
/// given input and target.
#[derive(Debug, Clone)]
pub struct Resize {
    width: u32,
    height: u32,
}

impl Resize {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn process(&self, image: &RgbImage) -> RgbImage {
        imageops::resize(image, self.width, self.height, imageops::FilterType::Lanczos3)
    }
}

/// Threshold-based background masking.
///
/// This is a placeholder heuristic, not object-aware segmentation: the image
/// is reduced to grayscale intensity and pixels strictly brighter than the
/// threshold are zeroed (inverted-binary rule, darker pixels survive as
/// foreground). Works tolerably for product shots on light backdrops.
#[derive(Debug, Clone)]
pub struct BackgroundRemoval {
    threshold: u8,
}

impl BackgroundRemoval {
    #[must_use]
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    fn process(&self, image: &RgbImage) -> RgbImage {
        let mut result = image.clone();
        for pixel in result.pixels_mut() {
            let Rgb([r, g, b]) = *pixel;
            let gray = f32::from(r).mul_add(0.299, f32::from(g).mul_add(0.587, f32::from(b) * 0.114));
            if gray > f32::from(self.threshold) {
                *pixel = Rgb([0, 0, 0]);
            }
        }
        result
    }
}

/// Rescales intensities to [0,1], applies per-channel mean/std, then
/// re-quantizes to the 8-bit range (clamped) so downstream stages keep
/// receiving an image rather than a float tensor.
#[derive(Debug, Clone)]
pub struct Normalize {
    mean: [f32; 3],
    std: [f32; 3],
}

impl Normalize {
    #[must_use]
    pub fn new(mean: [f32; 3], std: [f32; 3]) -> Self {
        Self { mean, std }
    }

    fn process(&self, image: &RgbImage) -> RgbImage {
        let mut result = image.clone();
        for pixel in result.pixels_mut() {
            let Rgb(channels) = *pixel;
            let mut normalized = [0_u8; 3];
            for (i, value) in channels.iter().enumerate() {
                let scaled = f32::from(*value) / 255.0;
                let standardized = (scaled - self.mean[i]) / self.std[i];
                normalized[i] = (standardized * 255.0).clamp(0.0, 255.0) as u8;
            }
            *pixel = Rgb(normalized);
        }
        result
    }
}

impl Default for Normalize {
    fn default() -> Self {
        Self::new(IMAGENET_MEAN, IMAGENET_STD)
    }
}

/// Ordered composition of preprocessing stages; the output of stage `i` is
/// the input of stage `i + 1`.
#[derive(Debug, Clone)]
pub struct PreprocessingPipeline {
    preprocessors: Vec<Preprocessor>,
}

impl PreprocessingPipeline {
    #[must_use]
    pub fn new(preprocessors: Vec<Preprocessor>) -> Self {
        Self { preprocessors }
    }

    #[must_use]
    pub fn process(&self, image: &RgbImage) -> RgbImage {
        let mut result = image.clone();
        for preprocessor in &self.preprocessors {
            result = preprocessor.process(&result);
        }
        result
    }

    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.preprocessors.iter().map(Preprocessor::name).collect()
    }
}
