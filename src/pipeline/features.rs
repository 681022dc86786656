//! Feature extraction: image-to-vector transforms whose outputs are
//! concatenated into the final feature vector.

use anyhow::Context;
use image::{RgbImage, imageops};
use ndarray::Array1;
use tract_onnx::prelude::*;

use crate::pipeline::error::PipelineError;
use crate::pipeline::preprocess::{IMAGENET_MEAN, IMAGENET_STD};
use crate::util::pca::Pca;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Closed set of feature extractors.
pub enum FeatureExtractor {
    ColorHistogram(ColorHistogramExtractor),
    Embedding(OnnxEmbeddingExtractor),
    Pca(PcaFeatureExtractor),
}

impl FeatureExtractor {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ColorHistogram(_) => "color_histogram",
            Self::Embedding(_) => "embedding",
            Self::Pca(_) => "pca",
        }
    }

    /// Whether this extractor needs a one-time `fit` over a representative
    /// image set before `extract` becomes callable.
    #[must_use]
    pub fn requires_fit(&self) -> bool {
        matches!(self, Self::Pca(_))
    }

    /// Fits the extractor on preprocessed training images. A no-op for
    /// extractors that require no fitting.
    ///
    /// # Errors
    /// Propagates base-extractor failures and degenerate fitting inputs.
    pub fn fit(&mut self, images: &[RgbImage]) -> Result<(), PipelineError> {
        match self {
            Self::ColorHistogram(_) | Self::Embedding(_) => Ok(()),
            Self::Pca(extractor) => extractor.fit(images),
        }
    }

    /// # Errors
    /// Fails with `NotFitted` when a fitted extractor has not been fitted yet
    /// and with `Stage` when the underlying transform fails.
    pub fn extract(&self, image: &RgbImage) -> Result<Array1<f32>, PipelineError> {
        match self {
            Self::ColorHistogram(extractor) => Ok(extractor.extract(image)),
            Self::Embedding(extractor) => extractor.extract(image),
            Self::Pca(extractor) => extractor.extract(image),
        }
    }
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("variant", &self.name())
            .finish()
    }
}

/// Per-channel intensity histogram, each channel L2-normalised. Deterministic
/// and fitting-free; the fallback extractor when no embedding model is
/// configured.
#[derive(Debug, Clone)]
pub struct ColorHistogramExtractor {
    bins: usize,
}

impl ColorHistogramExtractor {
    #[must_use]
    pub fn new(bins: usize) -> Self {
        Self { bins: bins.max(1) }
    }

    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.bins * 3
    }

    #[must_use]
    pub fn extract(&self, image: &RgbImage) -> Array1<f32> {
        let mut histograms = vec![0.0_f32; self.bins * 3];

        for pixel in image.pixels() {
            for (channel, value) in pixel.0.iter().enumerate() {
                let bin = usize::from(*value) * self.bins / 256;
                histograms[channel * self.bins + bin] += 1.0;
            }
        }

        for channel in 0..3 {
            let slice = &mut histograms[channel * self.bins..(channel + 1) * self.bins];
            let norm = slice.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for value in slice {
                    *value /= norm;
                }
            }
        }

        Array1::from_vec(histograms)
    }
}

/// Pretrained-embedding extractor backed by an ONNX model run through tract.
///
/// Deterministic for a fixed model file: identical input bytes always yield
/// the same embedding. The model is expected to take a `[1, 3, size, size]`
/// float input (ImageNet-normalised) and produce a flat float embedding.
pub struct OnnxEmbeddingExtractor {
    model: TractModel,
    input_size: u32,
}

impl OnnxEmbeddingExtractor {
    /// Loads and optimizes the model at `path`.
    ///
    /// # Errors
    /// An unloadable or malformed model is a `Configuration` error.
    pub fn new(path: &str, input_size: u32) -> Result<Self, PipelineError> {
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to read ONNX model at {path}"))
            .and_then(|model| {
                model
                    .with_input_fact(
                        0,
                        f32::fact([1, 3, input_size as usize, input_size as usize]).into(),
                    )
                    .context("failed to set model input shape")
            })
            .and_then(|model| model.into_optimized().context("failed to optimize model"))
            .and_then(|model| model.into_runnable().context("failed to plan model"))
            .map_err(|error| PipelineError::Configuration(format!("{error:#}")))?;

        Ok(Self { model, input_size })
    }

    /// # Errors
    /// Model execution failures surface as `Stage` errors naming the
    /// embedding stage.
    pub fn extract(&self, image: &RgbImage) -> Result<Array1<f32>, PipelineError> {
        let input = self.image_to_tensor(image);
        let outputs = self
            .model
            .run(tvec!(input.into_tvalue()))
            .map_err(|source| PipelineError::Stage {
                stage: "embedding",
                source,
            })?;

        let view = outputs[0]
            .to_array_view::<f32>()
            .map_err(|source| PipelineError::Stage {
                stage: "embedding",
                source,
            })?;

        Ok(Array1::from_iter(view.iter().copied()))
    }

    fn image_to_tensor(&self, image: &RgbImage) -> Tensor {
        let size = self.input_size;
        let resized = if image.dimensions() == (size, size) {
            image.clone()
        } else {
            imageops::resize(image, size, size, imageops::FilterType::Lanczos3)
        };

        tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| {
                let value = f32::from(resized.get_pixel(x as u32, y as u32).0[channel]) / 255.0;
                (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
            },
        )
        .into()
    }
}

impl std::fmt::Debug for OnnxEmbeddingExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingExtractor")
            .field("model", &"<TractModel>")
            .field("input_size", &self.input_size)
            .finish()
    }
}

/// Wraps a base extractor with a fitted dimensionality-reduction step.
/// `extract` before `fit` fails with `NotFitted`.
#[derive(Debug)]
pub struct PcaFeatureExtractor {
    base: Box<FeatureExtractor>,
    n_components: usize,
    pca: Option<Pca>,
}

impl PcaFeatureExtractor {
    #[must_use]
    pub fn new(base: Box<FeatureExtractor>, n_components: usize) -> Self {
        Self {
            base,
            n_components,
            pca: None,
        }
    }

    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.pca.is_some()
    }

    /// Fits the reduction once over the given images; fitting again replaces
    /// the previous projection.
    ///
    /// # Errors
    /// Propagates base-extractor failures; an empty image set is a
    /// `Configuration` error.
    pub fn fit(&mut self, images: &[RgbImage]) -> Result<(), PipelineError> {
        let features = images
            .iter()
            .map(|image| self.base.extract(image))
            .collect::<Result<Vec<_>, _>>()?;

        let pca = Pca::fit(&features, self.n_components)
            .map_err(|error| PipelineError::Configuration(format!("{error:#}")))?;
        self.pca = Some(pca);
        Ok(())
    }

    /// # Errors
    /// `NotFitted` before the one-time `fit`.
    pub fn extract(&self, image: &RgbImage) -> Result<Array1<f32>, PipelineError> {
        let pca = self.pca.as_ref().ok_or(PipelineError::NotFitted {
            component: "PCA feature extractor",
        })?;

        let features = self.base.extract(image)?;
        Ok(pca.transform(features.view()))
    }
}

/// Runs every configured extractor and concatenates their outputs, in
/// configured order, into one feature vector.
#[derive(Debug)]
pub struct FeatureExtractionPipeline {
    extractors: Vec<FeatureExtractor>,
}

impl FeatureExtractionPipeline {
    #[must_use]
    pub fn new(extractors: Vec<FeatureExtractor>) -> Self {
        Self { extractors }
    }

    /// Fits every extractor that requires fitting, once, on the preprocessed
    /// training images.
    ///
    /// # Errors
    /// Propagates the first extractor failure.
    pub fn fit(&mut self, images: &[RgbImage]) -> Result<(), PipelineError> {
        for extractor in &mut self.extractors {
            if extractor.requires_fit() {
                extractor.fit(images)?;
            }
        }
        Ok(())
    }

    /// # Errors
    /// Propagates the first extractor failure.
    pub fn extract(&self, image: &RgbImage) -> Result<Array1<f32>, PipelineError> {
        let mut combined = Vec::new();
        for extractor in &self.extractors {
            let features = extractor.extract(image)?;
            combined.extend(features.iter().copied());
        }
        Ok(Array1::from_vec(combined))
    }

    #[must_use]
    pub fn extractor_names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(FeatureExtractor::name).collect()
    }
}
