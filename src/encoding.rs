// src/encoding.rs

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::dataset::TrainingSnapshot;
use crate::models::{FeatureValue, RawFeatureSet};
use crate::schema;

/// Fallback code for categorical values never seen during training, and for
/// absent categorical attributes.
const FALLBACK_CODE: f64 = 0.0;

/// Maps a partial attribute set to the fixed-length numeric vector the
/// regressor consumes.
///
/// Category codes and imputation means are frozen at fit time; retraining
/// replaces the whole encoder rather than mutating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEncoder {
    // Per categorical attribute: observed string value -> integer code.
    code_maps: HashMap<String, HashMap<String, usize>>,
    // Per numeric attribute: training-set mean used for imputation.
    numeric_means: HashMap<String, f64>,
    non_controllable_weight: f64,
}

impl Default for FeatureEncoder {
    fn default() -> Self {
        Self {
            code_maps: HashMap::new(),
            numeric_means: HashMap::new(),
            non_controllable_weight: 0.7,
        }
    }
}

impl FeatureEncoder {
    /// Freezes category codes and imputation statistics from a training
    /// snapshot. Codes are assigned in sorted order of the observed values
    /// so the mapping is reproducible across runs.
    pub fn fit(snapshot: &TrainingSnapshot, non_controllable_weight: f64) -> Self {
        let mut code_maps = HashMap::new();
        let mut numeric_means = HashMap::new();

        for attr in schema::SCHEMA {
            if schema::is_categorical(attr) {
                let values: BTreeSet<String> = snapshot
                    .rows
                    .iter()
                    .filter_map(|row| row.get(attr))
                    .map(FeatureValue::as_text)
                    .collect();
                let map: HashMap<String, usize> = values
                    .into_iter()
                    .enumerate()
                    .map(|(code, value)| (value, code))
                    .collect();
                code_maps.insert(attr.to_string(), map);
            } else {
                let nums: Vec<f64> = snapshot
                    .rows
                    .iter()
                    .filter_map(|row| row.get(attr))
                    .filter_map(FeatureValue::as_num)
                    .collect();
                if !nums.is_empty() {
                    let mean = nums.iter().sum::<f64>() / nums.len() as f64;
                    numeric_means.insert(attr.to_string(), mean);
                }
            }
        }

        debug!(
            "Fitted feature encoder: {} category maps, {} numeric means",
            code_maps.len(),
            numeric_means.len()
        );

        Self {
            code_maps,
            numeric_means,
            non_controllable_weight,
        }
    }

    /// Encodes a partial attribute set into the fixed-length vector.
    ///
    /// Soft fallbacks, never errors: unseen categorical values map to code 0,
    /// absent numeric attributes impute the training mean (0.0 when no
    /// snapshot has been fitted). The output is always fully populated.
    pub fn encode(&self, features: &RawFeatureSet) -> Vec<f64> {
        let mut encoded = Vec::with_capacity(schema::ENCODED_LEN);

        for attr in schema::SCHEMA {
            let mut value = match features.get(attr) {
                Some(raw) if schema::is_categorical(attr) => self
                    .code_maps
                    .get(attr)
                    .and_then(|map| map.get(&raw.as_text()))
                    .map(|code| *code as f64)
                    .unwrap_or(FALLBACK_CODE),
                Some(raw) => raw
                    .as_num()
                    .unwrap_or_else(|| self.imputed_numeric(attr)),
                None if schema::is_categorical(attr) => FALLBACK_CODE,
                None => self.imputed_numeric(attr),
            };

            if schema::is_non_controllable(attr) {
                value *= self.non_controllable_weight;
            }
            encoded.push(value);
        }

        encoded
    }

    fn imputed_numeric(&self, attr: &str) -> f64 {
        self.numeric_means.get(attr).copied().unwrap_or(0.0)
    }

    /// Training-set mean for a numeric attribute, if one was fitted.
    pub fn numeric_mean(&self, attr: &str) -> Option<f64> {
        self.numeric_means.get(attr).copied()
    }
}
