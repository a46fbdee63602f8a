// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ScoringError;

/// A single survey attribute value: either numeric or a raw category string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Num(f64),
    Text(String),
}

impl FeatureValue {
    pub fn as_num(&self) -> Option<f64> {
        match self {
            FeatureValue::Num(v) => Some(*v),
            FeatureValue::Text(s) => s.parse::<f64>().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            FeatureValue::Num(v) => format!("{}", v),
            FeatureValue::Text(s) => s.clone(),
        }
    }
}

/// Partial attribute map supplied by a caller. Keys are a subset of the
/// survey schema; unspecified attributes are imputed during encoding.
pub type RawFeatureSet = HashMap<String, FeatureValue>;

/// Builds a `RawFeatureSet` from a JSON object, skipping nulls and any
/// values that are neither numbers nor strings.
pub fn raw_features_from_json(value: &JsonValue) -> RawFeatureSet {
    let mut features = RawFeatureSet::new();
    if let Some(map) = value.as_object() {
        for (key, v) in map {
            match v {
                JsonValue::Number(n) => {
                    if let Some(f) = n.as_f64() {
                        features.insert(key.clone(), FeatureValue::Num(f));
                    }
                }
                JsonValue::String(s) => {
                    features.insert(key.clone(), FeatureValue::Text(s.clone()));
                }
                JsonValue::Bool(b) => {
                    features.insert(key.clone(), FeatureValue::Num(if *b { 1.0 } else { 0.0 }));
                }
                _ => {}
            }
        }
    }
    features
}

/// User feedback on a served prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    /// The prediction was correct.
    True,
    /// The score should have been higher (more cooked).
    Higher,
    /// The score should have been lower (less cooked).
    Lower,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::True => "true",
            FeedbackKind::Higher => "higher",
            FeedbackKind::Lower => "lower",
        }
    }

    /// The adjustment the policy should have applied.
    pub fn optimal_action(&self) -> i32 {
        match self {
            FeedbackKind::True => 0,
            FeedbackKind::Higher => 1,
            FeedbackKind::Lower => -1,
        }
    }

    /// Reward signal: full reward for a confirmed prediction, a smaller
    /// positive reward to encourage the corrective adjustment otherwise.
    pub fn reward(&self) -> f64 {
        match self {
            FeedbackKind::True => 1.0,
            FeedbackKind::Higher | FeedbackKind::Lower => 0.5,
        }
    }
}

impl FromStr for FeedbackKind {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "true" => Ok(FeedbackKind::True),
            "higher" => Ok(FeedbackKind::Higher),
            "lower" => Ok(FeedbackKind::Lower),
            other => Err(ScoringError::InvalidFeedbackKind(other.to_string())),
        }
    }
}

/// One recorded feedback interaction. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub id: Uuid,
    pub features: RawFeatureSet,
    pub predicted_score: i32,
    pub kind: FeedbackKind,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEvent {
    pub fn new(features: RawFeatureSet, predicted_score: i32, kind: FeedbackKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            features,
            predicted_score,
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Result of a scoring call. Derived, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResult {
    /// Final cooked score after RL adjustment, always in [1, 10].
    pub score: i32,
    /// Quantized regressor output before adjustment, always in [1, 10].
    pub base_score: i32,
    pub label: String,
    pub confidence: String,
}

/// Human-readable label for a cooked score (1 = best, 10 = worst).
pub fn score_label(score: i32) -> &'static str {
    match score {
        1 => "Chilling - You're crushing it!",
        2 => "Excellent - Doing great!",
        3 => "Very Good - On a strong path",
        4 => "Good - Keeping up well",
        5 => "Pretty Good - On track",
        6 => "Okay - Room for improvement",
        7 => "Concerning - Need to step up",
        8 => "Struggling - Seek help soon",
        9 => "Very Cooked - Urgent action needed",
        10 => "Completely Cooked - Critical situation",
        _ => "Unknown",
    }
}

/// Confidence tier for a score. Mid-range scores sit near the quantization
/// boundaries, so the model is less certain there.
pub fn confidence_tier(score: i32) -> &'static str {
    if score <= 4 || score >= 9 {
        "High"
    } else {
        "Medium"
    }
}

/// Aggregate pipeline statistics returned alongside feedback application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStats {
    pub is_trained: bool,
    pub base_model_r2: Option<f64>,
    pub total_feedback: u64,
    pub correct_predictions: u64,
    pub accuracy: f64,
    pub avg_rl_reward: f64,
    pub rl_episodes: u64,
    pub q_table_size: usize,
    pub feedback_log_len: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Metrics reported by a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub train_r2: f64,
    pub holdout_r2: f64,
    pub rows_trained: usize,
    pub rows_held_out: usize,
}

/// Diagnostics over the retained training snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub average_cooked_score: Option<f64>,
    pub median_cooked_score: Option<f64>,
    /// Count of predicted base scores per bucket 1-10.
    pub score_distribution: std::collections::BTreeMap<i32, usize>,
    pub average_params: HashMap<String, JsonValue>,
    pub sample_size: usize,
}
