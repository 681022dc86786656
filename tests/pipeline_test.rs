//! End-to-end pipeline behavior: fit / predict / update orchestration over
//! the histogram extractor, which needs no model file and is fully
//! deterministic.

use image::{Rgb, RgbImage};
use rstest::rstest;

use season_worker::classifier::{
    ClusteringClassifier, EnsembleClassifier, NearestNeighborClassifier, SeasonClassifier,
};
use season_worker::pipeline::features::{ColorHistogramExtractor, FeatureExtractionPipeline, FeatureExtractor};
use season_worker::pipeline::preprocess::{Preprocessor, PreprocessingPipeline, Resize};
use season_worker::pipeline::{ClassificationPipeline, PipelineError};
use season_worker::util::distance::DistanceMetric;

fn solid(r: u8, g: u8, b: u8) -> RgbImage {
    RgbImage::from_pixel(16, 16, Rgb([r, g, b]))
}

fn labels(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|label| (*label).to_string()).collect()
}

fn knn(k: usize) -> SeasonClassifier {
    SeasonClassifier::NearestNeighbor(NearestNeighborClassifier::new(
        k,
        DistanceMetric::Euclidean,
    ))
}

fn clustering(n_clusters: usize) -> SeasonClassifier {
    SeasonClassifier::Clustering(ClusteringClassifier::new(n_clusters, 100, 42))
}

/// Resize-only preprocessing keeps test colors out of the background mask.
fn pipeline_with(classifier: SeasonClassifier) -> ClassificationPipeline {
    ClassificationPipeline::new(
        PreprocessingPipeline::new(vec![Preprocessor::Resize(Resize::new(8, 8))]),
        FeatureExtractionPipeline::new(vec![FeatureExtractor::ColorHistogram(
            ColorHistogramExtractor::new(8),
        )]),
        classifier,
    )
}

#[test]
fn predict_on_unfitted_pipeline_is_not_fitted_and_mutates_nothing() {
    let pipeline = pipeline_with(knn(3));
    let error = pipeline.predict(&solid(10, 20, 30)).expect_err("unfitted");
    assert!(matches!(error, PipelineError::NotFitted { .. }));
    assert!(!pipeline.status().is_fitted);
}

#[test]
fn fit_flips_status_to_fitted() {
    let mut pipeline = pipeline_with(knn(1));
    pipeline
        .fit(&[solid(10, 20, 30)], &labels(&["Spring Summer 2000"]))
        .expect("fit succeeds");

    let status = pipeline.status();
    assert!(status.is_fitted);
    assert_eq!(status.classifier, "nearest_neighbor");
    assert_eq!(status.preprocessors, vec!["resize"]);
    assert_eq!(status.feature_extractors, vec!["color_histogram"]);
    assert_eq!(status.training_samples, Some(1));
}

#[test]
fn three_sample_majority_scenario_returns_a_with_high_confidence() {
    let mut pipeline = pipeline_with(knn(3));
    let images = [solid(200, 10, 10), solid(180, 20, 20), solid(10, 10, 200)];
    pipeline
        .fit(&images, &labels(&["A", "A", "B"]))
        .expect("fit succeeds");

    let prediction = pipeline.predict(&images[0]).expect("predicts");
    assert_eq!(prediction.season, "A");
    assert!(prediction.confidence >= 2.0 / 3.0);

    let total: f32 = prediction.probabilities.values().sum();
    assert!((total - 1.0).abs() < 1e-6);
}

#[rstest]
#[case(2, 3)]
#[case(0, 1)]
fn mismatched_fit_lengths_are_a_configuration_error(
    #[case] image_count: usize,
    #[case] label_count: usize,
) {
    let mut pipeline = pipeline_with(knn(1));
    let images: Vec<RgbImage> = (0..image_count).map(|i| solid(i as u8 * 40, 0, 0)).collect();
    let bad_labels: Vec<String> = (0..label_count).map(|i| format!("label-{i}")).collect();

    let error = pipeline
        .fit(&images, &bad_labels)
        .expect_err("mismatch must fail");
    assert!(matches!(error, PipelineError::Configuration(_)));
    assert!(!pipeline.status().is_fitted);
}

#[test]
fn failed_refit_leaves_fitted_state_usable() {
    let mut pipeline = pipeline_with(knn(1));
    pipeline
        .fit(&[solid(200, 10, 10)], &labels(&["A"]))
        .expect("fit succeeds");

    let error = pipeline
        .fit(&[solid(0, 0, 0)], &labels(&["A", "B"]))
        .expect_err("mismatch must fail");
    assert!(matches!(error, PipelineError::Configuration(_)));

    assert!(pipeline.status().is_fitted);
    let prediction = pipeline.predict(&solid(200, 10, 10)).expect("predicts");
    assert_eq!(prediction.season, "A");
}

#[test]
fn update_on_unfitted_pipeline_behaves_as_fit() {
    let mut pipeline = pipeline_with(knn(1));
    pipeline
        .update(&[solid(10, 200, 10)], &labels(&["Spring Summer 1999"]))
        .expect("update succeeds");

    assert!(pipeline.status().is_fitted);
    let prediction = pipeline.predict(&solid(10, 200, 10)).expect("predicts");
    assert_eq!(prediction.season, "Spring Summer 1999");
}

#[test]
fn nearest_neighbor_update_grows_in_place_like_a_concatenated_fit() {
    let old_images = [solid(200, 10, 10), solid(180, 20, 20)];
    let new_images = [solid(10, 10, 200), solid(20, 20, 180)];

    let mut grown = pipeline_with(knn(3));
    grown.fit(&old_images, &labels(&["A", "A"])).expect("fit succeeds");
    grown
        .update(&new_images, &labels(&["B", "B"]))
        .expect("update succeeds");
    assert_eq!(grown.status().training_samples, Some(4));

    let mut refit = pipeline_with(knn(3));
    let mut all_images = old_images.to_vec();
    all_images.extend_from_slice(&new_images);
    refit
        .fit(&all_images, &labels(&["A", "A", "B", "B"]))
        .expect("fit succeeds");

    for query in [solid(200, 10, 10), solid(10, 10, 200)] {
        let a = grown.predict(&query).expect("predicts");
        let b = refit.predict(&query).expect("predicts");
        assert_eq!(a.season, b.season);
        assert_eq!(a.probabilities, b.probabilities);
    }
}

#[test]
fn update_strategy_depends_on_classifier_and_fitted_state() {
    let mut pipeline = pipeline_with(knn(1));
    assert!(pipeline.update_refits());
    pipeline
        .fit(&[solid(10, 20, 30)], &labels(&["A"]))
        .expect("fit succeeds");
    assert!(!pipeline.update_refits());

    let mut clustered = pipeline_with(clustering(1));
    clustered
        .fit(&[solid(10, 20, 30)], &labels(&["A"]))
        .expect("fit succeeds");
    assert!(clustered.update_refits());
}

#[test]
fn non_nearest_neighbor_update_refits_from_the_new_batch_alone() {
    let mut pipeline = pipeline_with(clustering(1));
    pipeline
        .fit(
            &[solid(200, 10, 10), solid(180, 20, 20)],
            &labels(&["A", "A"]),
        )
        .expect("fit succeeds");

    pipeline
        .update(&[solid(10, 10, 200)], &labels(&["B"]))
        .expect("update succeeds");

    // Prior "A" data is discarded: the single cluster now only knows "B".
    let prediction = pipeline.predict(&solid(200, 10, 10)).expect("predicts");
    assert_eq!(prediction.season, "B");
}

#[test]
fn single_cluster_always_reports_global_majority_with_zero_confidence() {
    let mut pipeline = pipeline_with(clustering(1));
    pipeline
        .fit(
            &[solid(200, 10, 10), solid(180, 20, 20), solid(10, 10, 200)],
            &labels(&["A", "A", "B"]),
        )
        .expect("fit succeeds");

    for query in [solid(200, 10, 10), solid(90, 90, 90)] {
        let prediction = pipeline.predict(&query).expect("predicts");
        assert_eq!(prediction.season, "A");
        assert_eq!(prediction.confidence, 0.0);
    }
}

#[test]
fn ensemble_pipeline_combines_members_and_normalises() {
    let members = vec![knn(3), clustering(2)];
    let ensemble = SeasonClassifier::Ensemble(
        EnsembleClassifier::new(members, Some(vec![0.7, 0.3])).expect("builds"),
    );

    let mut pipeline = pipeline_with(ensemble);
    pipeline
        .fit(
            &[solid(200, 10, 10), solid(180, 20, 20), solid(10, 10, 200)],
            &labels(&["A", "A", "B"]),
        )
        .expect("fit succeeds");

    let prediction = pipeline.predict(&solid(190, 15, 15)).expect("predicts");
    assert_eq!(prediction.season, "A");

    let total: f32 = prediction.probabilities.values().sum();
    assert!((total - 1.0).abs() < 1e-5);

    let status = pipeline.status();
    assert_eq!(status.classifier, "ensemble");
    assert_eq!(status.training_samples, Some(3));
}
