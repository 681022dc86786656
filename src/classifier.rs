//! Vector-to-label classifiers and their shared prediction contract.

pub mod clustering;
pub mod encoder;
pub mod ensemble;
pub mod knn;

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1};
use serde::Serialize;

pub use clustering::ClusteringClassifier;
pub use ensemble::EnsembleClassifier;
pub use knn::NearestNeighborClassifier;

use crate::pipeline::error::PipelineError;

/// Result of a single classification.
///
/// `probabilities` sums to 1.0 (within floating-point tolerance) whenever any
/// probability mass exists; a degenerate zero-mass case leaves it
/// empty/unnormalized.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub season: String,
    pub confidence: f32,
    pub probabilities: BTreeMap<String, f32>,
    pub diagnostics: Diagnostics,
}

/// Classifier-specific auxiliary output, kept for inspection and API
/// responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Diagnostics {
    NearestNeighbors {
        distances: Vec<f32>,
        indices: Vec<usize>,
    },
    Cluster {
        id: usize,
        undetermined: bool,
    },
    Ensemble {
        members: Vec<Prediction>,
    },
}

/// Closed set of classifier variants sharing the `fit`/`predict` contract.
/// New variants register here.
#[derive(Debug)]
pub enum SeasonClassifier {
    NearestNeighbor(NearestNeighborClassifier),
    Clustering(ClusteringClassifier),
    Ensemble(EnsembleClassifier),
}

impl SeasonClassifier {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::NearestNeighbor(_) => "nearest_neighbor",
            Self::Clustering(_) => "clustering",
            Self::Ensemble(_) => "ensemble",
        }
    }

    #[must_use]
    pub fn is_fitted(&self) -> bool {
        match self {
            Self::NearestNeighbor(classifier) => classifier.is_fitted(),
            Self::Clustering(classifier) => classifier.is_fitted(),
            Self::Ensemble(classifier) => classifier.is_fitted(),
        }
    }

    /// # Errors
    /// Mismatched or empty training data is a `Configuration` error.
    pub fn fit(&mut self, features: &[Array1<f32>], labels: &[String]) -> Result<(), PipelineError> {
        match self {
            Self::NearestNeighbor(classifier) => classifier.fit(features, labels),
            Self::Clustering(classifier) => classifier.fit(features, labels),
            Self::Ensemble(classifier) => classifier.fit(features, labels),
        }
    }

    /// # Errors
    /// `NotFitted` before `fit`.
    pub fn predict(&self, features: ArrayView1<'_, f32>) -> Result<Prediction, PipelineError> {
        match self {
            Self::NearestNeighbor(classifier) => classifier.predict(features),
            Self::Clustering(classifier) => classifier.predict(features),
            Self::Ensemble(classifier) => classifier.predict(features),
        }
    }

    /// The only variant with an incremental-growth path.
    #[must_use]
    pub fn as_nearest_neighbor_mut(&mut self) -> Option<&mut NearestNeighborClassifier> {
        match self {
            Self::NearestNeighbor(classifier) => Some(classifier),
            Self::Clustering(_) | Self::Ensemble(_) => None,
        }
    }
}
