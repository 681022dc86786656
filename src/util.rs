pub mod distance;
pub mod kmeans;
pub mod pca;
