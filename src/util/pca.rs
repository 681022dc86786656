use anyhow::{Result, ensure};
use ndarray::{Array1, ArrayView1};

const MAX_POWER_ITERATIONS: usize = 200;
const CONVERGENCE_TOLERANCE: f32 = 1e-5;

/// Principal component analysis fitted by power iteration with deflation.
///
/// Components are extracted one at a time: repeated multiplication by the
/// implicit covariance matrix converges on the dominant direction, which is
/// then removed from the centered data before the next component is sought.
/// Initialisation is deterministic (largest-norm centered row), so identical
/// inputs give identical components.
#[derive(Debug, Clone)]
pub struct Pca {
    mean: Array1<f32>,
    components: Vec<Array1<f32>>,
}

impl Pca {
    /// Fits the requested number of components on the given rows.
    ///
    /// The effective component count is clamped to `min(n_components, rows,
    /// dimensionality)`.
    ///
    /// # Errors
    /// Fails when no rows are supplied, `n_components` is zero, or rows have
    /// inconsistent dimensionality.
    pub fn fit(data: &[Array1<f32>], n_components: usize) -> Result<Self> {
        ensure!(!data.is_empty(), "PCA requires at least one sample");
        ensure!(n_components > 0, "PCA requires at least one component");

        let dim = data[0].len();
        for row in data {
            ensure!(
                row.len() == dim,
                "inconsistent feature dimensionality: expected {dim}, got {}",
                row.len()
            );
        }

        let n_components = n_components.min(dim).min(data.len());

        let mut mean = Array1::<f32>::zeros(dim);
        for row in data {
            mean += row;
        }
        mean /= data.len() as f32;

        let mut centered: Vec<Array1<f32>> = data.iter().map(|row| row - &mean).collect();
        let mut components = Vec::with_capacity(n_components);

        for c in 0..n_components {
            match dominant_direction(&centered) {
                Some(component) => {
                    for row in &mut centered {
                        let projection = row.dot(&component);
                        row.scaled_add(-projection, &component);
                    }
                    components.push(component);
                }
                None => {
                    // No variance left; pad with unit basis vectors so the
                    // output dimensionality stays as requested.
                    let mut basis = Array1::<f32>::zeros(dim);
                    basis[c % dim] = 1.0;
                    components.push(basis);
                }
            }
        }

        Ok(Self { mean, components })
    }

    #[must_use]
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    /// Projects a vector onto the fitted components.
    #[must_use]
    pub fn transform(&self, vector: ArrayView1<'_, f32>) -> Array1<f32> {
        let centered = &vector - &self.mean;
        Array1::from_iter(
            self.components
                .iter()
                .map(|component| centered.dot(component)),
        )
    }
}

/// Power iteration over the implicit covariance of already-centered rows.
/// Returns `None` when the remaining variance is numerically zero.
fn dominant_direction(centered: &[Array1<f32>]) -> Option<Array1<f32>> {
    let dim = centered[0].len();

    let seed = centered
        .iter()
        .max_by(|a, b| {
            a.dot(*a)
                .partial_cmp(&b.dot(*b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .filter(|row| row.dot(*row) > f32::EPSILON)?;
    let mut direction = seed / seed.dot(seed).sqrt();

    for _ in 0..MAX_POWER_ITERATIONS {
        let mut next = Array1::<f32>::zeros(dim);
        for row in centered {
            next.scaled_add(row.dot(&direction), row);
        }

        let norm = next.dot(&next).sqrt();
        if norm <= f32::EPSILON {
            return None;
        }
        next /= norm;

        let delta = (&next - &direction).mapv(f32::abs).sum();
        direction = next;
        if delta < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    Some(direction)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn first_component_follows_dominant_axis() {
        // Points spread along y = x; the leading component must align with it.
        let data = vec![
            array![1.0_f32, 1.1],
            array![2.0_f32, 1.9],
            array![3.0_f32, 3.05],
            array![4.0_f32, 3.95],
        ];
        let pca = Pca::fit(&data, 1).expect("fit succeeds");
        assert_eq!(pca.n_components(), 1);

        let projected_near = pca.transform(array![1.0_f32, 1.0].view());
        let projected_far = pca.transform(array![4.0_f32, 4.0].view());
        assert!((projected_far[0] - projected_near[0]).abs() > 3.0);
    }

    #[test]
    fn component_count_is_clamped() {
        let data = vec![array![1.0_f32, 2.0], array![3.0_f32, 4.0]];
        let pca = Pca::fit(&data, 10).expect("fit succeeds");
        assert_eq!(pca.n_components(), 2);
        assert_eq!(pca.transform(data[0].view()).len(), 2);
    }

    #[test]
    fn zero_variance_data_still_yields_requested_dim() {
        let data = vec![array![5.0_f32, 5.0], array![5.0_f32, 5.0]];
        let pca = Pca::fit(&data, 2).expect("fit succeeds");
        assert_eq!(pca.n_components(), 2);
        let projected = pca.transform(data[0].view());
        assert!(projected.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(Pca::fit(&[], 2).is_err());
    }

    #[test]
    fn transform_is_deterministic() {
        let data = vec![
            array![1.0_f32, 0.0, 2.0],
            array![0.0_f32, 1.0, 1.0],
            array![2.0_f32, 1.0, 0.0],
        ];
        let a = Pca::fit(&data, 2).expect("fit succeeds");
        let b = Pca::fit(&data, 2).expect("fit succeeds");
        assert_eq!(a.transform(data[1].view()), b.transform(data[1].view()));
    }
}
