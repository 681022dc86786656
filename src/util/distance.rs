use std::str::FromStr;

use ndarray::ArrayView1;

/// Distance metric for nearest-neighbor lookups. Smaller is closer for every
/// variant; cosine is expressed as `1 - similarity` to fit that convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
    Cosine,
}

impl DistanceMetric {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Manhattan => "manhattan",
            Self::Cosine => "cosine",
        }
    }

    #[must_use]
    pub fn distance(self, a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
        match self {
            Self::Euclidean => euclidean(a, b),
            Self::Manhattan => manhattan(a, b),
            Self::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "euclidean" => Ok(Self::Euclidean),
            "manhattan" => Ok(Self::Manhattan),
            "cosine" => Ok(Self::Cosine),
            other => Err(anyhow::anyhow!("unsupported distance metric: {other}")),
        }
    }
}

#[must_use]
pub fn euclidean(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

#[must_use]
pub fn manhattan(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// Compute cosine similarity between two vectors.
#[must_use]
pub fn cosine_similarity(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    let dot_product = a.dot(&b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("euclidean", DistanceMetric::Euclidean)]
    #[case("manhattan", DistanceMetric::Manhattan)]
    #[case("cosine", DistanceMetric::Cosine)]
    fn parses_metric_names(#[case] raw: &str, #[case] expected: DistanceMetric) {
        assert_eq!(raw.parse::<DistanceMetric>().expect("parses"), expected);
    }

    #[test]
    fn unknown_metric_is_rejected() {
        assert!("chebyshev".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn euclidean_matches_hand_computation() {
        let a = array![0.0_f32, 3.0];
        let b = array![4.0_f32, 0.0];
        let d = euclidean(a.view(), b.view());
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let a = array![1.0_f32, 2.0, 3.0];
        let sim = cosine_similarity(a.view(), a.view());
        assert!((sim - 1.0).abs() < 1e-6);
        assert!(DistanceMetric::Cosine.distance(a.view(), a.view()).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        let a = array![0.0_f32, 0.0];
        let b = array![1.0_f32, 1.0];
        assert_eq!(cosine_similarity(a.view(), b.view()), 0.0);
    }
}
