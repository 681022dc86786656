use ndarray::{Array1, ArrayView1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

/// Simple seeded K-Means clustering over feature vectors.
pub struct KMeans {
    pub centroids: Vec<Array1<f32>>,
    pub assignments: Vec<usize>,
}

impl KMeans {
    /// Runs K-Means clustering.
    ///
    /// # Arguments
    /// * `data` - List of data points (vectors).
    /// * `k` - Number of clusters (clamped to the number of points).
    /// * `max_iterations` - Maximum number of iterations.
    /// * `seed` - RNG seed; identical inputs and seed give identical clusters.
    #[must_use]
    pub fn fit(data: &[Array1<f32>], k: usize, max_iterations: usize, seed: u64) -> Self {
        if data.is_empty() || k == 0 {
            return Self {
                centroids: vec![],
                assignments: vec![],
            };
        }

        let k = k.min(data.len());
        let dim = data[0].len();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut centroids: Vec<Array1<f32>> =
            data.choose_multiple(&mut rng, k).cloned().collect();

        let mut assignments = vec![0; data.len()];
        let mut changes = true;
        let mut iterations = 0;

        while changes && iterations < max_iterations {
            changes = false;
            iterations += 1;

            // E-step: assign points to the nearest centroid; ties keep the
            // lowest centroid index.
            let mut new_assignments = vec![0; data.len()];
            for (i, point) in data.iter().enumerate() {
                let mut min_dist_sq = f32::MAX;
                let mut best_cluster = 0;

                for (j, centroid) in centroids.iter().enumerate() {
                    let dist_sq = distance_sq(point.view(), centroid.view());
                    if dist_sq < min_dist_sq {
                        min_dist_sq = dist_sq;
                        best_cluster = j;
                    }
                }
                new_assignments[i] = best_cluster;
            }

            if new_assignments != assignments {
                assignments = new_assignments;
                changes = true;
            }

            // M-step: update centroids.
            let mut sums = vec![Array1::<f32>::zeros(dim); k];
            let mut counts = vec![0_usize; k];

            for (i, &cluster) in assignments.iter().enumerate() {
                sums[cluster] += &data[i];
                counts[cluster] += 1;
            }

            for j in 0..k {
                if counts[j] > 0 {
                    centroids[j] = &sums[j] / (counts[j] as f32);
                } else if let Some(random_point) = data.choose(&mut rng) {
                    // Re-initialize empty cluster with a random point.
                    centroids[j].clone_from(random_point);
                }
            }
        }

        Self {
            centroids,
            assignments,
        }
    }
}

fn distance_sq(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
