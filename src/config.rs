// src/config.rs

use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Tunable constants for the scoring pipeline.
///
/// The grade divisor and the clamp bounds on `failures`/`absences` are
/// properties of the deployment's dataset, not universal domain truths, so
/// they live here rather than as hard-coded literals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    // Grade (0-20) to cooked-score (1-10) quantization divisor.
    pub grade_divisor: f64,
    // Uniform down-weighting applied to non-controllable attributes.
    pub non_controllable_weight: f64,

    // Q-learning constants.
    pub epsilon: f64,
    pub learning_rate: f64,
    pub discount_factor: f64,
    /// Whether the serving path keeps exploring (epsilon-greedy) or runs
    /// pure greedy with random tie-break only.
    pub explore_on_score: bool,

    // Gradient boosting parameters.
    pub n_estimators: usize,
    pub gbm_learning_rate: f64,
    pub tree_max_depth: u16,
    pub subsample: f64,
    pub holdout_fraction: f64,

    // Seed for the train/holdout partition and row subsampling. Scoring-time
    // randomness is seeded separately via `ScoringPipeline::reseed`.
    pub training_seed: u64,

    // Attribute clamp bounds applied during input normalization.
    pub max_failures: i64,
    pub max_absences: i64,
    pub max_grade: i64,

    // Retained feedback events; counters are tracked independently so
    // aggregate statistics stay exact past this bound.
    pub feedback_log_cap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grade_divisor: 2.2,
            non_controllable_weight: 0.7,
            epsilon: 0.05,
            learning_rate: 0.1,
            discount_factor: 0.9,
            explore_on_score: true,
            n_estimators: 100,
            gbm_learning_rate: 0.1,
            tree_max_depth: 5,
            subsample: 0.8,
            holdout_fraction: 0.1,
            training_seed: 42,
            max_failures: 4,
            max_absences: 93,
            max_grade: 20,
            feedback_log_cap: 10_000,
        }
    }
}

impl PipelineConfig {
    /// Builds a config from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<f64>("AMICOOKED_GRADE_DIVISOR") {
            config.grade_divisor = v;
        }
        if let Some(v) = env_parse::<f64>("AMICOOKED_EPSILON") {
            // gen_bool panics outside [0, 1], so a bad env var must not
            // reach the serving path unclamped.
            if !(0.0..=1.0).contains(&v) {
                warn!("AMICOOKED_EPSILON={} is not a probability; clamping", v);
            }
            config.epsilon = v.clamp(0.0, 1.0);
        }
        if let Some(v) = env_parse::<bool>("AMICOOKED_EXPLORE_ON_SCORE") {
            config.explore_on_score = v;
        }
        if let Some(v) = env_parse::<usize>("AMICOOKED_N_ESTIMATORS") {
            config.n_estimators = v;
        }
        if let Some(v) = env_parse::<u64>("AMICOOKED_TRAINING_SEED") {
            config.training_seed = v;
        }
        if let Some(v) = env_parse::<usize>("AMICOOKED_FEEDBACK_LOG_CAP") {
            config.feedback_log_cap = v;
        }

        info!(
            "Pipeline config: divisor={}, epsilon={}, explore_on_score={}, n_estimators={}, seed={}",
            config.grade_divisor,
            config.epsilon,
            config.explore_on_score,
            config.n_estimators,
            config.training_seed
        );
        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}
