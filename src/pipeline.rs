// src/pipeline.rs

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use crate::config::PipelineConfig;
use crate::dataset::TrainingSnapshot;
use crate::encoding::FeatureEncoder;
use crate::error::ScoringError;
use crate::feature_cache::{self, EncodedFeatureCache};
use crate::models::{
    confidence_tier, score_label, DatasetSummary, FeedbackEvent, FeedbackKind, ModelStats,
    RawFeatureSet, ScoringResult, TrainingReport,
};
use crate::rl::QAdjustmentLayer;
use crate::schema;
use crate::scorer::{quantize_grade, split_indices, GradientBoostedScorer};

/// The scoring core: deterministic feature encoding, an offline-trained
/// gradient-boosted regressor, and an online Q-learning adjustment layer.
///
/// One instance is created at startup and shared (behind a lock) by all
/// request handlers. Scoring is read-only apart from the randomness and the
/// encoded-vector cache, both behind short-lived internal mutexes; training
/// and feedback require exclusive access.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScoringPipeline {
    config: PipelineConfig,
    encoder: FeatureEncoder,
    scorer: Option<GradientBoostedScorer>,
    rl_layer: QAdjustmentLayer,
    feedback_log: VecDeque<FeedbackEvent>,
    training_snapshot: Option<TrainingSnapshot>,
    initial_r2: Option<f64>,
    current_r2: Option<f64>,
    total_feedback: u64,
    correct_predictions: u64,
    #[serde(skip, default = "default_rng")]
    rng: Mutex<StdRng>,
    #[serde(skip, default)]
    encoded_cache: Mutex<EncodedFeatureCache>,
}

fn default_rng() -> Mutex<StdRng> {
    Mutex::new(StdRng::from_entropy())
}

impl ScoringPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let rl_layer = QAdjustmentLayer::new(
            config.learning_rate,
            config.discount_factor,
            config.epsilon,
        );
        Self {
            config,
            encoder: FeatureEncoder::default(),
            scorer: None,
            rl_layer,
            feedback_log: VecDeque::new(),
            training_snapshot: None,
            initial_r2: None,
            current_r2: None,
            total_feedback: 0,
            correct_predictions: 0,
            rng: default_rng(),
            encoded_cache: Mutex::default(),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.scorer.is_some()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rl_layer(&self) -> &QAdjustmentLayer {
        &self.rl_layer
    }

    /// Reseeds the scoring-time RNG. Exploration and tie-breaking become
    /// reproducible for a fixed call sequence.
    pub fn reseed(&self, seed: u64) {
        *lock(&self.rng) = StdRng::seed_from_u64(seed);
    }

    /// Trains the regressor and freezes a new encoder from the snapshot.
    ///
    /// A full replace: the new model, category codes and imputation means are
    /// installed together only after the fit succeeds, so a failed run leaves
    /// the previously trained state active. The Q-table, feedback log and
    /// counters survive retraining.
    pub fn train(&mut self, snapshot: TrainingSnapshot) -> Result<TrainingReport, ScoringError> {
        if snapshot.is_empty() {
            return Err(ScoringError::Training("empty training snapshot".into()));
        }
        if snapshot.rows.len() != snapshot.targets.len() {
            return Err(ScoringError::Training(format!(
                "snapshot has {} rows but {} targets",
                snapshot.rows.len(),
                snapshot.targets.len()
            )));
        }

        info!("Training base scorer on {} rows", snapshot.len());
        let encoder = FeatureEncoder::fit(&snapshot, self.config.non_controllable_weight);
        let encoded: Vec<Vec<f64>> = snapshot.rows.iter().map(|row| encoder.encode(row)).collect();

        let (train_idx, holdout_idx) = split_indices(
            snapshot.len(),
            self.config.holdout_fraction,
            self.config.training_seed,
        );
        let train_rows: Vec<Vec<f64>> = train_idx.iter().map(|&i| encoded[i].clone()).collect();
        let train_targets: Vec<f64> = train_idx.iter().map(|&i| snapshot.targets[i]).collect();
        let holdout_rows: Vec<Vec<f64>> = holdout_idx.iter().map(|&i| encoded[i].clone()).collect();
        let holdout_targets: Vec<f64> = holdout_idx.iter().map(|&i| snapshot.targets[i]).collect();

        let scorer = GradientBoostedScorer::fit(&train_rows, &train_targets, &self.config)?;
        let train_r2 = scorer.r2(&train_rows, &train_targets)?;
        let holdout_r2 = if holdout_rows.is_empty() {
            train_r2
        } else {
            scorer.r2(&holdout_rows, &holdout_targets)?
        };

        // Commit point: replace the trained state wholesale.
        self.encoder = encoder;
        self.scorer = Some(scorer);
        self.training_snapshot = Some(snapshot);
        if self.initial_r2.is_none() {
            self.initial_r2 = Some(holdout_r2);
        }
        self.current_r2 = Some(holdout_r2);
        lock(&self.encoded_cache).clear();

        info!(
            "Training complete: train R2 {:.4}, holdout R2 {:.4}",
            train_r2, holdout_r2
        );
        Ok(TrainingReport {
            train_r2,
            holdout_r2,
            rows_trained: train_rows.len(),
            rows_held_out: holdout_rows.len(),
        })
    }

    /// Scores a partial attribute set: encode, predict the continuous grade,
    /// quantize, then apply the Q-layer adjustment.
    ///
    /// Serving keeps exploring (epsilon-greedy) by default so the policy
    /// continues to learn in production; set `explore_on_score` false in the
    /// config for greedy-with-tie-break only.
    pub fn score(&self, features: &RawFeatureSet) -> Result<ScoringResult, ScoringError> {
        self.score_with_adjustment(features, true)
    }

    /// Scoring with the RL adjustment optionally bypassed. The unadjusted
    /// path is deterministic and is what dataset summaries use.
    pub fn score_with_adjustment(
        &self,
        features: &RawFeatureSet,
        use_adjustment: bool,
    ) -> Result<ScoringResult, ScoringError> {
        let normalized = schema::normalize(features, &self.config);
        let base_score = self.base_score(&normalized)?;

        let final_score = if use_adjustment {
            let state = QAdjustmentLayer::state_key(base_score, Some(&normalized));
            let adjustment = {
                let mut rng = lock(&self.rng);
                self.rl_layer
                    .select_action(&state, self.config.explore_on_score, &mut rng)
            };
            debug!(
                "Scored base {} with adjustment {} in state '{}'",
                base_score, adjustment, state
            );
            (base_score + adjustment).clamp(1, 10)
        } else {
            base_score
        };

        Ok(ScoringResult {
            score: final_score,
            base_score,
            label: score_label(final_score).to_string(),
            confidence: confidence_tier(final_score).to_string(),
        })
    }

    // Shared encode + predict + quantize path. Callers pass attributes on
    // the model's scales: scoring and feedback normalize first, snapshot
    // rows are used as-is.
    fn base_score(&self, features: &RawFeatureSet) -> Result<i32, ScoringError> {
        let scorer = self.scorer.as_ref().ok_or(ScoringError::NotTrained)?;
        let encoded = self.encoded(features);
        let grade = scorer.predict_one(&encoded)?;
        Ok(quantize_grade(grade, self.config.grade_divisor))
    }

    fn encoded(&self, features: &RawFeatureSet) -> Vec<f64> {
        let key = feature_cache::signature(features);
        let mut cache = lock(&self.encoded_cache);
        if let Some(encoded) = cache.get(&key) {
            return encoded;
        }
        let encoded = self.encoder.encode(features);
        cache.put(key, encoded.clone());
        encoded
    }

    /// Records a feedback event and updates the Q-layer online.
    ///
    /// Deliberately not idempotent: replaying the same feedback reinforces
    /// the signal again. Invalid labels are rejected before any state
    /// mutation.
    pub fn record_feedback(
        &mut self,
        features: &RawFeatureSet,
        predicted_score: i32,
        label: &str,
    ) -> Result<ModelStats, ScoringError> {
        if !self.is_trained() {
            return Err(ScoringError::NotTrained);
        }
        let kind: FeedbackKind = label.parse()?;

        let normalized = schema::normalize(features, &self.config);
        let base_score = self.base_score(&normalized)?;

        self.feedback_log.push_back(FeedbackEvent::new(
            features.clone(),
            predicted_score,
            kind,
        ));
        while self.feedback_log.len() > self.config.feedback_log_cap {
            self.feedback_log.pop_front();
        }

        self.rl_layer
            .apply_feedback(base_score, kind, Some(&normalized));

        self.total_feedback += 1;
        if kind == FeedbackKind::True {
            self.correct_predictions += 1;
        }

        debug!(
            "Recorded '{}' feedback for predicted score {} (base {})",
            kind.as_str(),
            predicted_score,
            base_score
        );
        Ok(self.stats())
    }

    pub fn stats(&self) -> ModelStats {
        let accuracy = if self.total_feedback > 0 {
            self.correct_predictions as f64 / self.total_feedback as f64
        } else {
            0.0
        };
        let (cache_hits, cache_misses) = lock(&self.encoded_cache).stats();

        ModelStats {
            is_trained: self.is_trained(),
            base_model_r2: self.current_r2,
            total_feedback: self.total_feedback,
            correct_predictions: self.correct_predictions,
            accuracy,
            avg_rl_reward: self.rl_layer.average_reward(),
            rl_episodes: self.rl_layer.episodes(),
            q_table_size: self.rl_layer.table_size(),
            feedback_log_len: self.feedback_log.len(),
            cache_hits,
            cache_misses,
        }
    }

    pub fn feedback_log_len(&self) -> usize {
        self.feedback_log.len()
    }

    /// Diagnostics over the retained training snapshot: attribute averages,
    /// modes, and the distribution of unadjusted scores across the dataset.
    pub fn dataset_summary(&self) -> Result<DatasetSummary, ScoringError> {
        if !self.is_trained() {
            return Err(ScoringError::NotTrained);
        }
        let snapshot = self
            .training_snapshot
            .as_ref()
            .ok_or(ScoringError::NotTrained)?;

        let mut average_params: HashMap<String, JsonValue> = HashMap::new();
        for attr in schema::SCHEMA {
            if schema::is_categorical(attr) {
                let mut counts: HashMap<String, usize> = HashMap::new();
                let mut yes = 0usize;
                for row in &snapshot.rows {
                    if let Some(value) = row.get(attr) {
                        let text = value.as_text();
                        if text == "yes" {
                            yes += 1;
                        }
                        *counts.entry(text).or_insert(0) += 1;
                    }
                }
                if let Some((mode, _)) = counts.iter().max_by_key(|(_, count)| **count) {
                    average_params.insert(attr.to_string(), json!(mode));
                }
                if counts.contains_key("yes") || counts.contains_key("no") {
                    let pct = yes as f64 / snapshot.len() as f64 * 100.0;
                    average_params.insert(format!("{}_yes_percentage", attr), json!(pct));
                }
            } else if let Some(mean) = self.encoder.numeric_mean(attr) {
                average_params.insert(attr.to_string(), json!(mean));
            }
        }

        // Snapshot rows are already on the model's scales; they skip input
        // normalization and go straight to the encoder.
        let mut scores: Vec<i32> = Vec::with_capacity(snapshot.len());
        for row in &snapshot.rows {
            scores.push(self.base_score(row)?);
        }
        scores.sort_unstable();

        let mut score_distribution = BTreeMap::new();
        for bucket in 1..=10 {
            score_distribution.insert(bucket, scores.iter().filter(|s| **s == bucket).count());
        }

        let average = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64)
        };
        let median = if scores.is_empty() {
            None
        } else {
            Some(scores[scores.len() / 2] as f64)
        };

        Ok(DatasetSummary {
            average_cooked_score: average,
            median_cooked_score: median,
            score_distribution,
            average_params,
            sample_size: snapshot.len(),
        })
    }

    /// Returns the pipeline to a pristine untrained state, mutating this
    /// instance in place so outstanding shared references remain valid.
    pub fn reset(&mut self) {
        info!("Resetting pipeline to untrained state");
        self.encoder = FeatureEncoder::default();
        self.scorer = None;
        self.rl_layer = QAdjustmentLayer::new(
            self.config.learning_rate,
            self.config.discount_factor,
            self.config.epsilon,
        );
        self.feedback_log.clear();
        self.training_snapshot = None;
        self.initial_r2 = None;
        self.current_r2 = None;
        self.total_feedback = 0;
        self.correct_predictions = 0;
        lock(&self.encoded_cache).clear();
    }
}

// A poisoned guard still holds structurally sound data here (all updates are
// single assignments), so recover it instead of propagating the panic.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
