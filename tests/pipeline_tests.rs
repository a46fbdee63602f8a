// tests/pipeline_tests.rs
//
// End-to-end behavior of the scoring pipeline on a synthetic survey dataset:
// training guards, feedback validation, persistence round-trips and the
// directional sanity of the scorer.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use uuid::Uuid;

use amicooked_lib::models::FeatureValue;
use amicooked_lib::{
    dataset::TrainingSnapshot, raw_features_from_json, ModelStore, PipelineConfig,
    RawFeatureSet, ScoringError, ScoringPipeline,
};

fn test_config() -> PipelineConfig {
    // Fewer boosting rounds keep the tests quick; everything else stays at
    // the production defaults.
    PipelineConfig {
        n_estimators: 30,
        ..PipelineConfig::default()
    }
}

fn pick<'a>(rng: &mut StdRng, options: &[&'a str]) -> &'a str {
    options[rng.gen_range(0..options.len())]
}

/// Synthetic survey rows whose final grade tracks the grades, study time,
/// failures and absences, the way the real dataset does.
fn synthetic_snapshot(n: usize, seed: u64) -> TrainingSnapshot {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(n);
    let mut targets = Vec::with_capacity(n);

    for _ in 0..n {
        let g1 = rng.gen_range(0..=20) as f64;
        let g2 = (g1 + rng.gen_range(-3.0..=3.0)).clamp(0.0, 20.0).round();
        let studytime = rng.gen_range(1..=4) as f64;
        let failures = rng.gen_range(0..=4) as f64;
        let absences = rng.gen_range(0..=40) as f64;

        let mut row = RawFeatureSet::new();
        row.insert("sex".into(), FeatureValue::Text(pick(&mut rng, &["F", "M"]).into()));
        row.insert("age".into(), FeatureValue::Num(rng.gen_range(15..=22) as f64));
        row.insert("address".into(), FeatureValue::Text(pick(&mut rng, &["U", "R"]).into()));
        row.insert("famsize".into(), FeatureValue::Text(pick(&mut rng, &["LE3", "GT3"]).into()));
        row.insert("Pstatus".into(), FeatureValue::Text(pick(&mut rng, &["T", "A"]).into()));
        row.insert("Medu".into(), FeatureValue::Num(rng.gen_range(0..=4) as f64));
        row.insert("Fedu".into(), FeatureValue::Num(rng.gen_range(0..=4) as f64));
        let jobs = ["teacher", "health", "services", "at_home", "other"];
        row.insert("Mjob".into(), FeatureValue::Text(pick(&mut rng, &jobs).into()));
        row.insert("Fjob".into(), FeatureValue::Text(pick(&mut rng, &jobs).into()));
        row.insert("traveltime".into(), FeatureValue::Num(rng.gen_range(1..=4) as f64));
        row.insert("studytime".into(), FeatureValue::Num(studytime));
        row.insert("failures".into(), FeatureValue::Num(failures));
        for attr in ["schoolsup", "famsup", "paid", "activities", "nursery", "higher", "internet", "romantic"] {
            row.insert(attr.into(), FeatureValue::Text(pick(&mut rng, &["yes", "no"]).into()));
        }
        for attr in ["famrel", "freetime", "goout", "Dalc", "Walc", "health"] {
            row.insert(attr.into(), FeatureValue::Num(rng.gen_range(1..=5) as f64));
        }
        row.insert("absences".into(), FeatureValue::Num(absences));
        row.insert("G1".into(), FeatureValue::Num(g1));
        row.insert("G2".into(), FeatureValue::Num(g2));

        let noise = rng.gen_range(-1.0..=1.0);
        let target = (0.45 * g1 + 0.45 * g2 + 0.5 * studytime - 0.7 * failures
            - 0.03 * absences
            + noise)
            .clamp(0.0, 20.0);

        rows.push(row);
        targets.push(target);
    }

    TrainingSnapshot { rows, targets }
}

fn trained_pipeline() -> ScoringPipeline {
    let mut pipeline = ScoringPipeline::new(test_config());
    pipeline
        .train(synthetic_snapshot(300, 11))
        .expect("training on the synthetic snapshot should succeed");
    pipeline
}

fn cooked_profile() -> RawFeatureSet {
    raw_features_from_json(&json!({
        "studytime": 1, "failures": 2, "G1": 8, "G2": 9,
        "absences": 30, "Dalc": 4, "Walc": 5
    }))
}

fn chilling_profile() -> RawFeatureSet {
    raw_features_from_json(&json!({
        "studytime": 4, "failures": 0, "G1": 18, "G2": 18,
        "absences": 2, "Dalc": 1, "Walc": 1
    }))
}

#[test]
fn pre_training_guard_rejects_scoring_and_feedback() {
    let mut pipeline = ScoringPipeline::new(test_config());

    match pipeline.score(&cooked_profile()) {
        Err(ScoringError::NotTrained) => {}
        other => panic!("expected NotTrained, got {other:?}"),
    }
    match pipeline.record_feedback(&cooked_profile(), 5, "true") {
        Err(ScoringError::NotTrained) => {}
        other => panic!("expected NotTrained, got {other:?}"),
    }
}

#[test]
fn training_reports_valid_holdout_metric() {
    let mut pipeline = ScoringPipeline::new(test_config());
    let report = pipeline.train(synthetic_snapshot(300, 5)).unwrap();

    assert!((-1.0..=1.0).contains(&report.holdout_r2), "holdout R2 {}", report.holdout_r2);
    assert!(report.train_r2 > 0.5, "train R2 unexpectedly weak: {}", report.train_r2);
    assert_eq!(report.rows_trained + report.rows_held_out, 300);
    assert!(pipeline.is_trained());
}

#[test]
fn training_on_empty_snapshot_fails_without_installing_a_model() {
    let mut pipeline = ScoringPipeline::new(test_config());
    let empty = TrainingSnapshot { rows: vec![], targets: vec![] };
    assert!(matches!(pipeline.train(empty), Err(ScoringError::Training(_))));
    assert!(!pipeline.is_trained());
}

#[test]
fn failed_retrain_keeps_previous_model_active() {
    let mut pipeline = trained_pipeline();
    let before = pipeline.score_with_adjustment(&cooked_profile(), false).unwrap();

    let bad = TrainingSnapshot { rows: synthetic_snapshot(3, 1).rows, targets: vec![1.0] };
    assert!(pipeline.train(bad).is_err());

    let after = pipeline.score_with_adjustment(&cooked_profile(), false).unwrap();
    assert_eq!(before.base_score, after.base_score);
}

#[test]
fn scores_stay_within_bounds_for_sparse_inputs() {
    let pipeline = trained_pipeline();
    pipeline.reseed(9);
    let mut rng = StdRng::seed_from_u64(21);

    for _ in 0..50 {
        let mut features = RawFeatureSet::new();
        if rng.gen_bool(0.7) {
            features.insert("G1".into(), FeatureValue::Num(rng.gen_range(0..=20) as f64));
        }
        if rng.gen_bool(0.5) {
            features.insert("studytime".into(), FeatureValue::Num(rng.gen_range(0..=12) as f64));
        }
        if rng.gen_bool(0.3) {
            features.insert("higher".into(), FeatureValue::Text("maybe?".into()));
        }

        let result = pipeline.score(&features).unwrap();
        assert!((1..=10).contains(&result.score));
        assert!((1..=10).contains(&result.base_score));
        assert!(!result.label.is_empty());
    }
}

#[test]
fn directional_sanity_cooked_scores_higher_than_chilling() {
    let pipeline = trained_pipeline();

    // Compare the unadjusted path: the Q-table is empty here, so adjustments
    // would only add tie-break noise.
    let cooked = pipeline.score_with_adjustment(&cooked_profile(), false).unwrap();
    let chilling = pipeline.score_with_adjustment(&chilling_profile(), false).unwrap();

    assert!(
        cooked.score > chilling.score,
        "cooked profile scored {} vs chilling {}",
        cooked.score,
        chilling.score
    );
}

#[test]
fn invalid_feedback_is_rejected_without_state_mutation() {
    let mut pipeline = trained_pipeline();
    pipeline.record_feedback(&cooked_profile(), 8, "true").unwrap();
    let before = pipeline.stats();

    match pipeline.record_feedback(&cooked_profile(), 8, "maybe") {
        Err(ScoringError::InvalidFeedbackKind(label)) => assert_eq!(label, "maybe"),
        other => panic!("expected InvalidFeedbackKind, got {other:?}"),
    }

    let after = pipeline.stats();
    assert_eq!(before.q_table_size, after.q_table_size);
    assert_eq!(before.total_feedback, after.total_feedback);
    assert_eq!(before.correct_predictions, after.correct_predictions);
    assert_eq!(before.feedback_log_len, after.feedback_log_len);
    assert_eq!(before.rl_episodes, after.rl_episodes);
}

#[test]
fn feedback_updates_counters_and_q_table() {
    let mut pipeline = trained_pipeline();

    let stats = pipeline.record_feedback(&cooked_profile(), 8, "true").unwrap();
    assert_eq!(stats.total_feedback, 1);
    assert_eq!(stats.correct_predictions, 1);
    assert_eq!(stats.accuracy, 1.0);
    assert_eq!(stats.q_table_size, 1);

    let stats = pipeline.record_feedback(&cooked_profile(), 8, "higher").unwrap();
    assert_eq!(stats.total_feedback, 2);
    assert_eq!(stats.correct_predictions, 1);
    assert_eq!(stats.accuracy, 0.5);
    assert_eq!(stats.rl_episodes, 2);
    assert!(stats.avg_rl_reward > 0.0);
}

#[test]
fn repeated_feedback_reinforces_not_deduplicates() {
    let mut pipeline = trained_pipeline();
    for _ in 0..5 {
        pipeline.record_feedback(&cooked_profile(), 8, "true").unwrap();
    }
    let stats = pipeline.stats();
    assert_eq!(stats.total_feedback, 5);
    assert_eq!(stats.rl_episodes, 5);
    // All five updates hit the same state.
    assert_eq!(stats.q_table_size, 1);
    // Identical attribute maps re-use the cached encoded vector.
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.cache_hits, 4);
}

#[test]
fn retraining_preserves_rl_state() {
    let mut pipeline = trained_pipeline();
    pipeline.record_feedback(&cooked_profile(), 8, "true").unwrap();
    pipeline.record_feedback(&chilling_profile(), 3, "lower").unwrap();
    let before = pipeline.stats();

    pipeline.train(synthetic_snapshot(300, 77)).unwrap();

    let after = pipeline.stats();
    assert_eq!(before.q_table_size, after.q_table_size);
    assert_eq!(before.total_feedback, after.total_feedback);
    assert_eq!(before.feedback_log_len, after.feedback_log_len);
}

#[test]
fn snapshot_round_trip_reproduces_scoring_behavior() {
    let mut pipeline = trained_pipeline();
    pipeline.record_feedback(&cooked_profile(), 8, "higher").unwrap();
    pipeline.record_feedback(&chilling_profile(), 3, "true").unwrap();

    let store = ModelStore::new(
        std::env::temp_dir().join(format!("amicooked_rt_{}.json", Uuid::new_v4())),
    );
    store.save(&pipeline).unwrap();
    let restored = store.load(test_config());
    assert!(restored.is_trained());

    // Identical seeds make exploration and tie-breaking reproducible.
    pipeline.reseed(424242);
    restored.reseed(424242);

    let mut rng = StdRng::seed_from_u64(8);
    for _ in 0..100 {
        let mut features = RawFeatureSet::new();
        features.insert("G1".into(), FeatureValue::Num(rng.gen_range(0..=20) as f64));
        features.insert("G2".into(), FeatureValue::Num(rng.gen_range(0..=20) as f64));
        if rng.gen_bool(0.5) {
            features.insert("studytime".into(), FeatureValue::Num(rng.gen_range(1..=4) as f64));
        }
        if rng.gen_bool(0.5) {
            features.insert("failures".into(), FeatureValue::Num(rng.gen_range(0..=4) as f64));
        }

        let a = pipeline.score(&features).unwrap();
        let b = restored.score(&features).unwrap();
        assert_eq!(a.score, b.score);
        assert_eq!(a.base_score, b.base_score);
    }

    let stats = restored.stats();
    assert_eq!(stats.total_feedback, 2);
    assert_eq!(stats.q_table_size, 2);

    std::fs::remove_file(store.path()).ok();
}

#[test]
fn reset_returns_pipeline_to_untrained_state_in_place() {
    let mut pipeline = trained_pipeline();
    pipeline.record_feedback(&cooked_profile(), 8, "true").unwrap();

    pipeline.reset();

    assert!(!pipeline.is_trained());
    let stats = pipeline.stats();
    assert_eq!(stats.total_feedback, 0);
    assert_eq!(stats.q_table_size, 0);
    assert!(matches!(pipeline.score(&cooked_profile()), Err(ScoringError::NotTrained)));
}

#[test]
fn dataset_summary_scores_rows_on_their_native_scales() {
    // Rows identical except studytime, which is already on the 1-4 survey
    // scale. Buckets 3 and 4 must stay distinguishable through the summary
    // path; re-bucketing them as raw weekly hours would collapse both
    // groups onto a single score.
    fn row(studytime: f64) -> RawFeatureSet {
        let mut row = RawFeatureSet::new();
        row.insert("sex".into(), FeatureValue::Text("F".into()));
        row.insert("G1".into(), FeatureValue::Num(10.0));
        row.insert("G2".into(), FeatureValue::Num(10.0));
        row.insert("failures".into(), FeatureValue::Num(0.0));
        row.insert("studytime".into(), FeatureValue::Num(studytime));
        row
    }

    let mut rows = Vec::new();
    let mut targets = Vec::new();
    for _ in 0..150 {
        rows.push(row(3.0));
        targets.push(5.0);
        rows.push(row(4.0));
        targets.push(15.0);
    }
    let mut pipeline = ScoringPipeline::new(test_config());
    pipeline.train(TrainingSnapshot { rows, targets }).unwrap();

    let summary = pipeline.dataset_summary().unwrap();
    let nonzero: Vec<(i32, usize)> = summary
        .score_distribution
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(score, count)| (*score, *count))
        .collect();
    assert_eq!(
        nonzero.len(),
        2,
        "expected two distinct score buckets, got {:?}",
        summary.score_distribution
    );
    assert_eq!(nonzero[0].1, 150);
    assert_eq!(nonzero[1].1, 150);

    // The summary's better bucket matches the serving path scoring the same
    // profile expressed in raw weekly hours (12h normalizes to bucket 4).
    let serving = pipeline.score_with_adjustment(&row(12.0), false).unwrap();
    assert_eq!(serving.base_score, nonzero[0].0);
}

#[test]
fn dataset_summary_reports_distribution_over_snapshot() {
    let pipeline = trained_pipeline();
    let summary = pipeline.dataset_summary().unwrap();

    assert_eq!(summary.sample_size, 300);
    let total: usize = summary.score_distribution.values().sum();
    assert_eq!(total, 300);
    let avg = summary.average_cooked_score.unwrap();
    assert!((1.0..=10.0).contains(&avg));
    assert!(summary.average_params.contains_key("G1"));
    assert!(summary.average_params.contains_key("higher_yes_percentage"));
}
