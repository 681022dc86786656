//! Weighted ensemble over other classifiers.

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1};

use crate::classifier::clustering::UNLABELED;
use crate::classifier::{Diagnostics, Prediction, SeasonClassifier};
use crate::pipeline::error::PipelineError;

#[derive(Debug)]
pub struct EnsembleClassifier {
    members: Vec<SeasonClassifier>,
    weights: Vec<f32>,
    is_fitted: bool,
}

impl EnsembleClassifier {
    /// Builds an ensemble over `members` with a parallel weight list.
    /// Omitted weights default to 1.0 for every member.
    ///
    /// # Errors
    /// Empty member lists, weight/member length mismatches, and negative
    /// weights are `Configuration` errors.
    pub fn new(
        members: Vec<SeasonClassifier>,
        weights: Option<Vec<f32>>,
    ) -> Result<Self, PipelineError> {
        if members.is_empty() {
            return Err(PipelineError::Configuration(
                "ensemble requires at least one member".to_string(),
            ));
        }

        let weights = weights.unwrap_or_else(|| vec![1.0; members.len()]);
        if weights.len() != members.len() {
            return Err(PipelineError::Configuration(format!(
                "ensemble members ({}) and weights ({}) must match",
                members.len(),
                weights.len()
            )));
        }
        if let Some(weight) = weights.iter().find(|weight| **weight < 0.0) {
            return Err(PipelineError::Configuration(format!(
                "ensemble weights must be non-negative, got {weight}"
            )));
        }

        Ok(Self {
            members,
            weights,
            is_fitted: false,
        })
    }

    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    #[must_use]
    pub fn members(&self) -> &[SeasonClassifier] {
        &self.members
    }

    /// Fits every member on the same data.
    ///
    /// # Errors
    /// Propagates the first member failure.
    pub fn fit(&mut self, features: &[Array1<f32>], labels: &[String]) -> Result<(), PipelineError> {
        for member in &mut self.members {
            member.fit(features, labels)?;
        }
        self.is_fitted = true;
        Ok(())
    }

    /// Combines member predictions by a weighted sum of their per-label
    /// distributions, normalized to sum to 1.
    ///
    /// The reported label is the argmax of the combined distribution; ties
    /// resolve to the first label in the fixed (lexicographic) ordering. Each
    /// member's own prediction is kept in the diagnostics.
    ///
    /// # Errors
    /// `NotFitted` before `fit`; member prediction failures propagate.
    pub fn predict(&self, features: ArrayView1<'_, f32>) -> Result<Prediction, PipelineError> {
        if !self.is_fitted {
            return Err(PipelineError::NotFitted {
                component: "ensemble classifier",
            });
        }

        let member_predictions = self
            .members
            .iter()
            .map(|member| member.predict(features))
            .collect::<Result<Vec<_>, _>>()?;

        let mut combined: BTreeMap<String, f32> = BTreeMap::new();
        for (prediction, &weight) in member_predictions.iter().zip(&self.weights) {
            for (label, probability) in &prediction.probabilities {
                *combined.entry(label.clone()).or_insert(0.0) += probability * weight;
            }
        }

        let total: f32 = combined.values().sum();
        if total > 0.0 {
            for value in combined.values_mut() {
                *value /= total;
            }
        }

        // BTreeMap iteration is the fixed label ordering; strictly-greater
        // comparison keeps the first label on ties.
        let mut best: Option<(&str, f32)> = None;
        for (label, &probability) in &combined {
            match best {
                Some((_, top)) if probability <= top => {}
                _ => best = Some((label, probability)),
            }
        }

        let (season, confidence) =
            best.map_or((UNLABELED.to_string(), 0.0), |(label, probability)| {
                (label.to_string(), probability)
            });

        Ok(Prediction {
            season,
            confidence,
            probabilities: combined,
            diagnostics: Diagnostics::Ensemble {
                members: member_predictions,
            },
        })
    }
}
