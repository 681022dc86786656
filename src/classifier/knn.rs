//! Nearest-neighbor vote classifier.
//!
//! The fitted model *is* the training set: the full feature matrix and the
//! encoded labels are retained, which is what makes the in-place `append`
//! growth path possible.

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1};

use crate::classifier::encoder::LabelEncoder;
use crate::classifier::{Diagnostics, Prediction};
use crate::pipeline::error::PipelineError;
use crate::util::distance::DistanceMetric;

#[derive(Debug)]
pub struct NearestNeighborClassifier {
    n_neighbors: usize,
    metric: DistanceMetric,
    features: Vec<Array1<f32>>,
    labels: Vec<usize>,
    encoder: LabelEncoder,
    is_fitted: bool,
}

impl NearestNeighborClassifier {
    #[must_use]
    pub fn new(n_neighbors: usize, metric: DistanceMetric) -> Self {
        Self {
            n_neighbors,
            metric,
            features: Vec::new(),
            labels: Vec::new(),
            encoder: LabelEncoder::default(),
            is_fitted: false,
        }
    }

    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    #[must_use]
    pub fn training_len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Stores the feature matrix and encoded labels.
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

        let encoder = LabelEncoder::fit(labels);
        let encoded = labels
            .iter()
            .map(|label| {
                encoder
                    .encode(label)
                    .ok_or_else(|| PipelineError::Configuration(format!("unencodable label: {label}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.encoder = encoder;
        self.labels = encoded;
        self.features = features.to_vec();
        self.is_fitted = true;
        Ok(())
    }

    /// Appends new rows and labels to the stored training set, re-deriving
    /// the label encoding so unseen seasons become encodable. Equivalent to a
    /// single `fit` over the concatenation of old and new data.
    ///
    /// # Errors
    /// Same contract as [`Self::fit`].
    pub fn append(
        &mut self,
        features: &[Array1<f32>],
        labels: &[String],
    ) -> Result<(), PipelineError> {
        if !self.is_fitted {
            return self.fit(features, labels);
        }
        if features.len() != labels.len() {
            return Err(PipelineError::Configuration(format!(
                "feature rows ({}) and labels ({}) must match",
                features.len(),
                labels.len()
            )));
        }

        let mut all_labels: Vec<String> = self
            .labels
            .iter()
            .filter_map(|&index| self.encoder.decode(index).map(str::to_string))
            .collect();
        all_labels.extend_from_slice(labels);

        let mut all_features = std::mem::take(&mut self.features);
        all_features.extend_from_slice(features);

        self.fit(&all_features, &all_labels)
    }

    /// Majority vote among the `k` nearest stored vectors.
    ///
    /// Ties go to the lowest encoded index. Confidence is the majority count
    /// over the effective neighbor count (`min(k, stored rows)`), and the
    /// distribution covers every known label, absent ones at zero.
    ///
    /// # Errors
    /// `NotFitted` before `fit`.
    pub fn predict(&self, features: ArrayView1<'_, f32>) -> Result<Prediction, PipelineError> {
        if !self.is_fitted {
            return Err(PipelineError::NotFitted {
                component: "nearest-neighbor classifier",
            });
        }

        let mut order: Vec<usize> = (0..self.features.len()).collect();
        let distances: Vec<f32> = self
            .features
            .iter()
            .map(|stored| self.metric.distance(features, stored.view()))
            .collect();
        order.sort_by(|&a, &b| {
            distances[a]
                .partial_cmp(&distances[b])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let effective_k = self.n_neighbors.min(order.len());
        let neighbors = &order[..effective_k];

        let mut counts = vec![0_usize; self.encoder.len()];
        for &index in neighbors {
            counts[self.labels[index]] += 1;
        }

        // Strictly-greater comparison keeps the lowest encoded index on ties.
        let mut majority = 0;
        for (encoded, &count) in counts.iter().enumerate() {
            if count > counts[majority] {
                majority = encoded;
            }
        }

        let season = self
            .encoder
            .decode(majority)
            .ok_or_else(|| {
                PipelineError::Configuration(format!("undecodable label index: {majority}"))
            })?
            .to_string();

        let probabilities: BTreeMap<String, f32> = self
            .encoder
            .classes()
            .iter()
            .enumerate()
            .map(|(encoded, label)| (label.clone(), counts[encoded] as f32 / effective_k as f32))
            .collect();

        Ok(Prediction {
            season,
            confidence: counts[majority] as f32 / effective_k as f32,
            probabilities,
            diagnostics: Diagnostics::NearestNeighbors {
                distances: neighbors.iter().map(|&index| distances[index]).collect(),
                indices: neighbors.to_vec(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rstest::rstest;

    use super::*;

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|label| (*label).to_string()).collect()
    }

    fn fitted() -> NearestNeighborClassifier {
        let mut classifier = NearestNeighborClassifier::new(3, DistanceMetric::Euclidean);
        classifier
            .fit(
                &[
                    array![0.0_f32, 0.0],
                    array![0.1_f32, 0.0],
                    array![5.0_f32, 5.0],
                ],
                &labels(&["A", "A", "B"]),
            )
            .expect("fit succeeds");
        classifier
    }

    #[test]
    fn predict_before_fit_is_not_fitted() {
        let classifier = NearestNeighborClassifier::new(3, DistanceMetric::Euclidean);
        let error = classifier
            .predict(array![0.0_f32, 0.0].view())
            .expect_err("unfitted");
        assert!(matches!(error, PipelineError::NotFitted { .. }));
    }

    #[test]
    fn majority_vote_wins_with_proportional_confidence() {
        let classifier = fitted();
        let prediction = classifier
            .predict(array![0.0_f32, 0.0].view())
            .expect("predicts");

        assert_eq!(prediction.season, "A");
        assert!(prediction.confidence >= 2.0 / 3.0);
        assert!((prediction.probabilities["A"] - 2.0 / 3.0).abs() < 1e-6);
        assert!((prediction.probabilities["B"] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[rstest]
    #[case(DistanceMetric::Euclidean)]
    #[case(DistanceMetric::Manhattan)]
    #[case(DistanceMetric::Cosine)]
    fn distribution_sums_to_one(#[case] metric: DistanceMetric) {
        let mut classifier = NearestNeighborClassifier::new(5, metric);
        classifier
            .fit(
                &[
                    array![1.0_f32, 0.0],
                    array![0.0_f32, 1.0],
                    array![1.0_f32, 1.0],
                ],
                &labels(&["A", "B", "C"]),
            )
            .expect("fit succeeds");

        let prediction = classifier
            .predict(array![0.9_f32, 0.1].view())
            .expect("predicts");
        let total: f32 = prediction.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn absent_labels_appear_with_zero_probability() {
        let mut classifier = NearestNeighborClassifier::new(1, DistanceMetric::Euclidean);
        classifier
            .fit(
                &[array![0.0_f32, 0.0], array![10.0_f32, 10.0]],
                &labels(&["near", "far"]),
            )
            .expect("fit succeeds");

        let prediction = classifier
            .predict(array![0.1_f32, 0.0].view())
            .expect("predicts");
        assert_eq!(prediction.probabilities["far"], 0.0);
        assert_eq!(prediction.probabilities.len(), 2);
    }

    #[test]
    fn tie_breaks_to_the_lowest_encoded_index() {
        let mut classifier = NearestNeighborClassifier::new(2, DistanceMetric::Euclidean);
        classifier
            .fit(
                &[array![-1.0_f32, 0.0], array![1.0_f32, 0.0]],
                &labels(&["zeta", "alpha"]),
            )
            .expect("fit succeeds");

        // Both neighbors vote once; "alpha" sorts first in the encoding.
        let prediction = classifier
            .predict(array![0.0_f32, 0.0].view())
            .expect("predicts");
        assert_eq!(prediction.season, "alpha");
    }

    #[test]
    fn append_equals_fit_on_concatenation() {
        let base = [array![0.0_f32, 0.0], array![1.0_f32, 1.0]];
        let extra = [array![5.0_f32, 5.0], array![6.0_f32, 6.0]];

        let mut grown = NearestNeighborClassifier::new(3, DistanceMetric::Euclidean);
        grown.fit(&base, &labels(&["A", "A"])).expect("fit succeeds");
        grown
            .append(&extra, &labels(&["B", "B"]))
            .expect("append succeeds");

        let mut refit = NearestNeighborClassifier::new(3, DistanceMetric::Euclidean);
        let mut all = base.to_vec();
        all.extend_from_slice(&extra);
        refit
            .fit(&all, &labels(&["A", "A", "B", "B"]))
            .expect("fit succeeds");

        let query = array![5.5_f32, 5.5];
        let a = grown.predict(query.view()).expect("predicts");
        let b = refit.predict(query.view()).expect("predicts");
        assert_eq!(a.season, b.season);
        assert_eq!(a.probabilities, b.probabilities);
        assert_eq!(grown.training_len(), 4);
    }

    #[test]
    fn append_learns_previously_unseen_labels() {
        let mut classifier = fitted();
        classifier
            .append(&[array![-5.0_f32, -5.0]], &labels(&["C"]))
            .expect("append succeeds");

        let prediction = classifier
            .predict(array![-5.0_f32, -5.0].view())
            .expect("predicts");
        assert!(prediction.probabilities.contains_key("C"));
    }

    #[test]
    fn mismatched_lengths_leave_state_untouched() {
        let mut classifier = fitted();
        let error = classifier
            .fit(&[array![0.0_f32, 0.0]], &labels(&["A", "B"]))
            .expect_err("mismatch must fail");
        assert!(matches!(error, PipelineError::Configuration(_)));
        assert_eq!(classifier.training_len(), 3);
        assert!(classifier.is_fitted());
    }
}
