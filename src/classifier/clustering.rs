//! Cluster-majority classifier: k-means partitions the training features and
//! each cluster takes the majority label of the points it contains.

use std::collections::{BTreeMap, HashMap};

use ndarray::{Array1, ArrayView1};

use crate::classifier::{Diagnostics, Prediction};
use crate::pipeline::error::PipelineError;
use crate::util::distance::euclidean;
use crate::util::kmeans::KMeans;

/// Label reported for clusters that ended up with no training points.
pub const UNLABELED: &str = "Unknown";

#[derive(Debug)]
pub struct ClusteringClassifier {
    n_clusters: usize,
    max_iterations: usize,
    seed: u64,
    centroids: Vec<Array1<f32>>,
    cluster_labels: HashMap<usize, String>,
    is_fitted: bool,
}

impl ClusteringClassifier {
    #[must_use]
    pub fn new(n_clusters: usize, max_iterations: usize, seed: u64) -> Self {
        Self {
            n_clusters,
            max_iterations,
            seed,
            centroids: Vec::new(),
            cluster_labels: HashMap::new(),
            is_fitted: false,
        }
    }

    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Partitions the feature matrix and assigns each non-empty cluster the
    /// majority label among its members (ties go to the lexicographically
    /// first label). Empty clusters stay unlabeled.
    ///
    /// # Errors
    /// Mismatched or empty inputs are `Configuration` errors; existing fitted
    /// state is left untouched on failure.
    pub fn fit(&mut self, features: &[Array1<f32>], labels: &[String]) -> Result<(), PipelineError> {
        if features.len() != labels.len() {
            return Err(PipelineError::Configuration(format!(
                "feature rows ({}) and labels ({}) must match",
                features.len(),
                labels.len()
            )));
        }
        if features.is_empty() {
            return Err(PipelineError::Configuration(
                "training set is empty".to_string(),
            ));
        }

        let model = KMeans::fit(features, self.n_clusters, self.max_iterations, self.seed);

        let mut cluster_labels = HashMap::new();
        for cluster in 0..model.centroids.len() {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for (index, &assignment) in model.assignments.iter().enumerate() {
                if assignment == cluster {
                    *counts.entry(labels[index].as_str()).or_insert(0) += 1;
                }
            }

            let mut majority: Option<(&str, usize)> = None;
            for (label, count) in counts {
                match majority {
                    Some((_, best)) if count <= best => {}
                    _ => majority = Some((label, count)),
                }
            }
            if let Some((label, _)) = majority {
                cluster_labels.insert(cluster, label.to_string());
            }
        }

        self.centroids = model.centroids;
        self.cluster_labels = cluster_labels;
        self.is_fitted = true;
        Ok(())
    }

    /// Assigns the vector to its nearest cluster center and reports that
    /// cluster's majority label.
    ///
    /// Confidence is `1 - (distance to the assigned center / max distance
    /// among all centers)`. When the max distance is zero the ratio is
    /// undefined; that degenerate case is caught and reported as an
    /// undetermined result (confidence 0.0, unnormalized distribution)
    /// instead of dividing by zero.
    ///
    /// # Errors
    /// `NotFitted` before `fit`.
    pub fn predict(&self, features: ArrayView1<'_, f32>) -> Result<Prediction, PipelineError> {
        if !self.is_fitted {
            return Err(PipelineError::NotFitted {
                component: "clustering classifier",
            });
        }

        let distances: Vec<f32> = self
            .centroids
            .iter()
            .map(|center| euclidean(features, center.view()))
            .collect();

        let mut assigned = 0;
        for (cluster, &distance) in distances.iter().enumerate() {
            if distance < distances[assigned] {
                assigned = cluster;
            }
        }

        let season = self.label_for(assigned).to_string();

        match self.scaled_confidences(&distances) {
            Ok(confidences) => {
                let mut probabilities: BTreeMap<String, f32> = BTreeMap::new();
                for (cluster, &confidence) in confidences.iter().enumerate() {
                    *probabilities
                        .entry(self.label_for(cluster).to_string())
                        .or_insert(0.0) += confidence;
                }

                let total: f32 = probabilities.values().sum();
                if total > 0.0 {
                    for value in probabilities.values_mut() {
                        *value /= total;
                    }
                }

                Ok(Prediction {
                    season,
                    confidence: confidences[assigned],
                    probabilities,
                    diagnostics: Diagnostics::Cluster {
                        id: assigned,
                        undetermined: false,
                    },
                })
            }
            Err(PipelineError::DegenerateInput(_)) => Ok(Prediction {
                season,
                confidence: 0.0,
                probabilities: BTreeMap::new(),
                diagnostics: Diagnostics::Cluster {
                    id: assigned,
                    undetermined: true,
                },
            }),
            Err(error) => Err(error),
        }
    }

    fn label_for(&self, cluster: usize) -> &str {
        self.cluster_labels
            .get(&cluster)
            .map_or(UNLABELED, String::as_str)
    }

    /// `1 - d/d_max` per cluster center.
    fn scaled_confidences(&self, distances: &[f32]) -> Result<Vec<f32>, PipelineError> {
        let max_distance = distances.iter().copied().fold(0.0_f32, f32::max);
        if max_distance <= 0.0 {
            return Err(PipelineError::DegenerateInput(
                "all cluster centers are at distance zero".to_string(),
            ));
        }

        Ok(distances
            .iter()
            .map(|distance| 1.0 - distance / max_distance)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|label| (*label).to_string()).collect()
    }

    fn blobs() -> (Vec<Array1<f32>>, Vec<String>) {
        (
            vec![
                array![0.0_f32, 0.0],
                array![0.2_f32, 0.1],
                array![10.0_f32, 10.0],
                array![10.2_f32, 9.9],
            ],
            labels(&["A", "A", "B", "B"]),
        )
    }

    #[test]
    fn predict_before_fit_is_not_fitted() {
        let classifier = ClusteringClassifier::new(2, 100, 42);
        let error = classifier
            .predict(array![0.0_f32, 0.0].view())
            .expect_err("unfitted");
        assert!(matches!(error, PipelineError::NotFitted { .. }));
    }

    #[test]
    fn assigns_majority_label_of_the_nearest_cluster() {
        let (features, training_labels) = blobs();
        let mut classifier = ClusteringClassifier::new(2, 100, 42);
        classifier
            .fit(&features, &training_labels)
            .expect("fit succeeds");

        let prediction = classifier
            .predict(array![0.1_f32, 0.1].view())
            .expect("predicts");
        assert_eq!(prediction.season, "A");
        assert!(prediction.confidence > 0.0);
        assert!(prediction.confidence <= 1.0);

        let total: f32 = prediction.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn single_cluster_reports_global_majority_with_zero_confidence() {
        let (features, training_labels) = blobs();
        let mut classifier = ClusteringClassifier::new(1, 100, 42);
        classifier
            .fit(&features, &training_labels)
            .expect("fit succeeds");

        // With one center the assigned distance always equals the max
        // distance, so confidence is exactly zero.
        for query in [array![0.0_f32, 0.0], array![42.0_f32, -7.0]] {
            let prediction = classifier.predict(query.view()).expect("predicts");
            assert_eq!(prediction.season, "A");
            assert_eq!(prediction.confidence, 0.0);
        }
    }

    #[test]
    fn query_at_the_single_center_is_undetermined_not_a_crash() {
        let features = vec![array![2.0_f32, 2.0], array![2.0_f32, 2.0]];
        let mut classifier = ClusteringClassifier::new(1, 100, 42);
        classifier
            .fit(&features, &labels(&["A", "A"]))
            .expect("fit succeeds");

        let prediction = classifier
            .predict(array![2.0_f32, 2.0].view())
            .expect("predicts");
        assert_eq!(prediction.season, "A");
        assert_eq!(prediction.confidence, 0.0);
        assert!(prediction.probabilities.is_empty());
        assert!(matches!(
            prediction.diagnostics,
            Diagnostics::Cluster {
                undetermined: true,
                ..
            }
        ));
    }

    #[test]
    fn mismatched_lengths_are_a_configuration_error() {
        let mut classifier = ClusteringClassifier::new(2, 100, 42);
        let error = classifier
            .fit(&[array![0.0_f32, 0.0]], &labels(&["A", "B"]))
            .expect_err("mismatch must fail");
        assert!(matches!(error, PipelineError::Configuration(_)));
        assert!(!classifier.is_fitted());
    }
}
