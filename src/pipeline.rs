//! Classification pipeline: preprocessing -> feature extraction ->
//! classification, with fit / predict / update orchestration.

pub mod error;
pub mod features;
pub mod preprocess;

use image::RgbImage;
use ndarray::Array1;
use serde::Serialize;
use tracing::{debug, info, warn};

pub use error::PipelineError;

use crate::classifier::{
    ClusteringClassifier, EnsembleClassifier, NearestNeighborClassifier, Prediction,
    SeasonClassifier,
};
use crate::config::{ClassifierKind, Config};
use features::{
    ColorHistogramExtractor, FeatureExtractionPipeline, FeatureExtractor, OnnxEmbeddingExtractor,
    PcaFeatureExtractor,
};
use preprocess::{BackgroundRemoval, Normalize, Preprocessor, PreprocessingPipeline, Resize};

/// Introspection snapshot of the pipeline configuration.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub is_fitted: bool,
    pub preprocessors: Vec<&'static str>,
    pub feature_extractors: Vec<&'static str>,
    pub classifier: &'static str,
    pub training_samples: Option<usize>,
}

/// Owns the preprocessing pipeline, the feature extractors, and the
/// classifier exclusively; mutated in place by `fit`/`update`, read by
/// `predict`. Write exclusion across concurrent callers is the owner's job
/// (the HTTP layer holds this behind a read/write lock).
#[derive(Debug)]
pub struct ClassificationPipeline {
    preprocessing: PreprocessingPipeline,
    extraction: FeatureExtractionPipeline,
    classifier: SeasonClassifier,
    feature_dim: Option<usize>,
    is_fitted: bool,
}

impl ClassificationPipeline {
    #[must_use]
    pub fn new(
        preprocessing: PreprocessingPipeline,
        extraction: FeatureExtractionPipeline,
        classifier: SeasonClassifier,
    ) -> Self {
        Self {
            preprocessing,
            extraction,
            classifier,
            feature_dim: None,
            is_fitted: false,
        }
    }

    /// Builds the configured default pipeline: resize, background removal and
    /// normalisation, then either the ONNX embedding (PCA-wrapped when
    /// components are configured) or the color-histogram fallback, feeding
    /// the configured classifier variant.
    ///
    /// # Errors
    /// An unloadable embedding model or invalid ensemble weighting is a
    /// `Configuration` error.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let (width, height) = config.resize_target();
        let preprocessing = PreprocessingPipeline::new(vec![
            Preprocessor::Resize(Resize::new(width, height)),
            Preprocessor::BackgroundRemoval(BackgroundRemoval::new(config.background_threshold())),
            Preprocessor::Normalize(Normalize::default()),
        ]);

        let extractor = match config.embedding_model_path() {
            Some(path) => {
                let embedding =
                    OnnxEmbeddingExtractor::new(path, config.embedding_input_size())?;
                if config.pca_components() > 0 {
                    FeatureExtractor::Pca(PcaFeatureExtractor::new(
                        Box::new(FeatureExtractor::Embedding(embedding)),
                        config.pca_components(),
                    ))
                } else {
                    FeatureExtractor::Embedding(embedding)
                }
            }
            None => FeatureExtractor::ColorHistogram(ColorHistogramExtractor::new(
                config.histogram_bins(),
            )),
        };
        let extraction = FeatureExtractionPipeline::new(vec![extractor]);

        let classifier = match config.classifier_kind() {
            ClassifierKind::NearestNeighbor => SeasonClassifier::NearestNeighbor(
                NearestNeighborClassifier::new(config.knn_neighbors(), config.knn_metric()),
            ),
            ClassifierKind::Clustering => SeasonClassifier::Clustering(ClusteringClassifier::new(
                config.cluster_count(),
                config.kmeans_max_iter(),
                config.cluster_seed(),
            )),
            ClassifierKind::Ensemble => {
                let members = vec![
                    SeasonClassifier::NearestNeighbor(NearestNeighborClassifier::new(
                        config.knn_neighbors(),
                        config.knn_metric(),
                    )),
                    SeasonClassifier::Clustering(ClusteringClassifier::new(
                        config.cluster_count(),
                        config.kmeans_max_iter(),
                        config.cluster_seed(),
                    )),
                ];
                SeasonClassifier::Ensemble(EnsembleClassifier::new(
                    members,
                    Some(config.ensemble_weights().to_vec()),
                )?)
            }
        };

        Ok(Self::new(preprocessing, extraction, classifier))
    }

    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Whether the next `update` will refit the whole pipeline instead of
    /// growing the stored training set in place. Only a fitted
    /// nearest-neighbor classifier can grow.
    #[must_use]
    pub fn update_refits(&self) -> bool {
        !(self.is_fitted && matches!(self.classifier, SeasonClassifier::NearestNeighbor(_)))
    }

    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        let training_samples = match &self.classifier {
            SeasonClassifier::NearestNeighbor(classifier) => Some(classifier.training_len()),
            SeasonClassifier::Ensemble(ensemble) => {
                ensemble.members().iter().find_map(|member| match member {
                    SeasonClassifier::NearestNeighbor(classifier) => {
                        Some(classifier.training_len())
                    }
                    _ => None,
                })
            }
            SeasonClassifier::Clustering(_) => None,
        };

        PipelineStatus {
            is_fitted: self.is_fitted,
            preprocessors: self.preprocessing.stage_names(),
            feature_extractors: self.extraction.extractor_names(),
            classifier: self.classifier.name(),
            training_samples,
        }
    }

    /// Fits the pipeline: preprocesses every image, fits any extractor that
    /// requires fitting on the preprocessed set, extracts and concatenates
    /// the feature matrix, and fits the classifier on it.
    ///
    /// # Errors
    /// Mismatched `images`/`labels` lengths and inconsistent feature
    /// dimensionality are `Configuration` errors; extractor failures
    /// propagate untouched. Already-fitted state survives a failed call.
    pub fn fit(&mut self, images: &[RgbImage], labels: &[String]) -> Result<(), PipelineError> {
        if images.len() != labels.len() {
            return Err(PipelineError::Configuration(format!(
                "images ({}) and labels ({}) must match",
                images.len(),
                labels.len()
            )));
        }
        if images.is_empty() {
            return Err(PipelineError::Configuration(
                "training set is empty".to_string(),
            ));
        }

        let processed: Vec<RgbImage> = images
            .iter()
            .map(|image| self.preprocessing.process(image))
            .collect();
        debug!(count = processed.len(), "preprocessed training images");

        self.extraction.fit(&processed)?;
        let (features, dim) = self.extract_matrix(&processed)?;

        self.classifier.fit(&features, labels)?;
        self.feature_dim = Some(dim);
        self.is_fitted = true;

        info!(
            samples = images.len(),
            feature_dim = dim,
            classifier = self.classifier.name(),
            "pipeline fitted"
        );
        Ok(())
    }

    /// Classifies a single image.
    ///
    /// # Errors
    /// `NotFitted` before the first successful `fit`; a feature vector whose
    /// length differs from the fitted dimensionality is a `Configuration`
    /// error.
    pub fn predict(&self, image: &RgbImage) -> Result<Prediction, PipelineError> {
        if !self.is_fitted {
            return Err(PipelineError::NotFitted {
                component: "classification pipeline",
            });
        }

        let processed = self.preprocessing.process(image);
        let features = self.extract_checked(&processed)?;
        self.classifier.predict(features.view())
    }

    /// Absorbs new labeled data.
    ///
    /// Unfitted pipelines fit from scratch. A nearest-neighbor classifier
    /// grows in place (the only incremental-learning path). Every other
    /// variant is refit from the new batch alone, discarding prior training
    /// data; that asymmetry is inherited from the original design and logged
    /// because it is almost certainly not what a production caller wants.
    ///
    /// # Errors
    /// Same contract as [`Self::fit`].
    pub fn update(
        &mut self,
        new_images: &[RgbImage],
        new_labels: &[String],
    ) -> Result<(), PipelineError> {
        if !self.is_fitted {
            return self.fit(new_images, new_labels);
        }
        if new_images.len() != new_labels.len() {
            return Err(PipelineError::Configuration(format!(
                "images ({}) and labels ({}) must match",
                new_images.len(),
                new_labels.len()
            )));
        }

        if matches!(self.classifier, SeasonClassifier::NearestNeighbor(_)) {
            let processed: Vec<RgbImage> = new_images
                .iter()
                .map(|image| self.preprocessing.process(image))
                .collect();
            let mut features = Vec::with_capacity(processed.len());
            for image in &processed {
                features.push(self.extract_checked(image)?);
            }

            let Some(classifier) = self.classifier.as_nearest_neighbor_mut() else {
                return Err(PipelineError::Configuration(
                    "nearest-neighbor growth path lost its classifier".to_string(),
                ));
            };
            classifier.append(&features, new_labels)?;
            info!(
                added = new_images.len(),
                total = classifier.training_len(),
                "nearest-neighbor training set grown in place"
            );
            Ok(())
        } else {
            warn!(
                classifier = self.classifier.name(),
                "update refits from the new batch alone; prior training data is discarded"
            );
            self.fit(new_images, new_labels)
        }
    }

    fn extract_matrix(
        &self,
        processed: &[RgbImage],
    ) -> Result<(Vec<Array1<f32>>, usize), PipelineError> {
        let mut features = Vec::with_capacity(processed.len());
        for image in processed {
            features.push(self.extraction.extract(image)?);
        }

        let dim = features[0].len();
        for row in &features {
            if row.len() != dim {
                return Err(PipelineError::Configuration(format!(
                    "inconsistent feature dimensionality: expected {dim}, got {}",
                    row.len()
                )));
            }
        }
        Ok((features, dim))
    }

    fn extract_checked(&self, processed: &RgbImage) -> Result<Array1<f32>, PipelineError> {
        let features = self.extraction.extract(processed)?;
        if let Some(expected) = self.feature_dim {
            if features.len() != expected {
                return Err(PipelineError::Configuration(format!(
                    "feature dimensionality changed: expected {expected}, got {}",
                    features.len()
                )));
            }
        }
        Ok(features)
    }
}
