use std::{env, net::SocketAddr, num::NonZeroUsize, str::FromStr};

use thiserror::Error;

use crate::util::distance::DistanceMetric;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// Which classifier variant the pipeline is built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    NearestNeighbor,
    Clustering,
    Ensemble,
}

impl FromStr for ClassifierKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "nearest_neighbor" => Ok(Self::NearestNeighbor),
            "clustering" => Ok(Self::Clustering),
            "ensemble" => Ok(Self::Ensemble),
            other => Err(anyhow::anyhow!("unsupported classifier kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    resize_width: u32,
    resize_height: u32,
    background_threshold: u8,
    histogram_bins: usize,
    embedding_model_path: Option<String>,
    embedding_input_size: u32,
    pca_components: usize,
    knn_neighbors: NonZeroUsize,
    knn_metric: DistanceMetric,
    cluster_count: NonZeroUsize,
    cluster_seed: u64,
    kmeans_max_iter: usize,
    classifier_kind: ClassifierKind,
    ensemble_weights: Vec<f32>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Loads and validates the worker configuration from environment variables.
    ///
    /// Every knob has a default mirroring the reference deployment: 224x224
    /// resize, background threshold 127, k=5 euclidean neighbors, 10 clusters
    /// seeded with 42, and an ensemble weighted 0.7 (neighbors) / 0.3
    /// (clustering).
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a variable fails to parse or violates a
    /// range constraint.
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("SEASON_WORKER_HTTP_BIND", "0.0.0.0:9105")?;
        let resize_width = parse_u32("RESIZE_WIDTH", 224)?;
        let resize_height = parse_u32("RESIZE_HEIGHT", 224)?;
        let background_threshold = parse_u8("BACKGROUND_THRESHOLD", 127)?;
        let histogram_bins = parse_non_zero_usize("HISTOGRAM_BINS", 32)?.get();
        let embedding_model_path = env::var("EMBEDDING_MODEL_PATH").ok().filter(|p| !p.is_empty());
        let embedding_input_size = parse_u32("EMBEDDING_INPUT_SIZE", 224)?;
        let pca_components = parse_usize("PCA_COMPONENTS", 100)?;
        let knn_neighbors = parse_non_zero_usize("KNN_NEIGHBORS", 5)?;
        let knn_metric = parse_metric("KNN_METRIC", DistanceMetric::Euclidean)?;
        let cluster_count = parse_non_zero_usize("CLUSTER_COUNT", 10)?;
        let cluster_seed = parse_u64("CLUSTER_SEED", 42)?;
        let kmeans_max_iter = parse_non_zero_usize("KMEANS_MAX_ITER", 300)?.get();
        let classifier_kind = parse_classifier_kind("CLASSIFIER_KIND", ClassifierKind::Ensemble)?;
        let ensemble_weights = parse_weights("ENSEMBLE_WEIGHTS", &[0.7, 0.3])?;

        Ok(Self {
            http_bind,
            resize_width,
            resize_height,
            background_threshold,
            histogram_bins,
            embedding_model_path,
            embedding_input_size,
            pca_components,
            knn_neighbors,
            knn_metric,
            cluster_count,
            cluster_seed,
            kmeans_max_iter,
            classifier_kind,
            ensemble_weights,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn resize_target(&self) -> (u32, u32) {
        (self.resize_width, self.resize_height)
    }

    #[must_use]
    pub fn background_threshold(&self) -> u8 {
        self.background_threshold
    }

    #[must_use]
    pub fn histogram_bins(&self) -> usize {
        self.histogram_bins
    }

    #[must_use]
    pub fn embedding_model_path(&self) -> Option<&str> {
        self.embedding_model_path.as_deref()
    }

    #[must_use]
    pub fn embedding_input_size(&self) -> u32 {
        self.embedding_input_size
    }

    /// Requested PCA output dimensionality. Zero disables the PCA wrapper.
    #[must_use]
    pub fn pca_components(&self) -> usize {
        self.pca_components
    }

    #[must_use]
    pub fn knn_neighbors(&self) -> usize {
        self.knn_neighbors.get()
    }

    #[must_use]
    pub fn knn_metric(&self) -> DistanceMetric {
        self.knn_metric
    }

    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.cluster_count.get()
    }

    #[must_use]
    pub fn cluster_seed(&self) -> u64 {
        self.cluster_seed
    }

    #[must_use]
    pub fn kmeans_max_iter(&self) -> usize {
        self.kmeans_max_iter
    }

    #[must_use]
    pub fn classifier_kind(&self) -> ClassifierKind {
        self.classifier_kind
    }

    #[must_use]
    pub fn ensemble_weights(&self) -> &[f32] {
        &self.ensemble_weights
    }
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(NonZeroUsize::new(default).expect("default must be non-zero"));
    };

    raw.parse::<usize>()
        .map_err(anyhow::Error::new)
        .and_then(|value| {
            NonZeroUsize::new(value).ok_or_else(|| anyhow::anyhow!("value must be non-zero"))
        })
        .map_err(|source| ConfigError::Invalid { name, source })
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u8(name: &'static str, default: u8) -> Result<u8, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_metric(
    name: &'static str,
    default: DistanceMetric,
) -> Result<DistanceMetric, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };

    raw.parse()
        .map_err(|source| ConfigError::Invalid { name, source })
}

fn parse_classifier_kind(
    name: &'static str,
    default: ClassifierKind,
) -> Result<ClassifierKind, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };

    raw.parse()
        .map_err(|source| ConfigError::Invalid { name, source })
}

fn parse_weights(name: &'static str, default: &[f32]) -> Result<Vec<f32>, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(default.to_vec());
    };

    let weights = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(anyhow::Error::new)
                .and_then(|weight| {
                    if weight >= 0.0 {
                        Ok(weight)
                    } else {
                        Err(anyhow::anyhow!("weights must be non-negative: {weight}"))
                    }
                })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ConfigError::Invalid { name, source })?;

    if weights.len() == 2 {
        Ok(weights)
    } else {
        Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!(
                "expected two weights (neighbors, clustering), got {}",
                weights.len()
            ),
        })
    }
}
