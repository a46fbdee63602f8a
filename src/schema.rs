// src/schema.rs

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::config::PipelineConfig;
use crate::models::{FeatureValue, RawFeatureSet};

/// Survey attribute names in the order the regressor consumes them.
/// Position is load-bearing: the encoded vector is indexed by slot, not name.
pub const SCHEMA: [&str; 29] = [
    "sex",
    "age",
    "address",
    "famsize",
    "Pstatus",
    "Medu",
    "Fedu",
    "Mjob",
    "Fjob",
    "traveltime",
    "studytime",
    "failures",
    "schoolsup",
    "famsup",
    "paid",
    "activities",
    "nursery",
    "higher",
    "internet",
    "romantic",
    "famrel",
    "freetime",
    "goout",
    "Dalc",
    "Walc",
    "health",
    "absences",
    "G1",
    "G2",
];

/// Length of every encoded vector.
pub const ENCODED_LEN: usize = SCHEMA.len();

/// Name of the training target column (final grade, 0-20).
pub const TARGET_COLUMN: &str = "G3";

pub const CATEGORICAL: [&str; 14] = [
    "sex",
    "address",
    "famsize",
    "Pstatus",
    "Mjob",
    "Fjob",
    "schoolsup",
    "famsup",
    "paid",
    "activities",
    "nursery",
    "higher",
    "internet",
    "romantic",
];

/// Attributes the student cannot change; down-weighted during encoding.
pub const NON_CONTROLLABLE: [&str; 10] = [
    "sex",
    "age",
    "address",
    "famsize",
    "Pstatus",
    "Medu",
    "Fedu",
    "Mjob",
    "Fjob",
    "nursery",
];

static CATEGORICAL_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| CATEGORICAL.iter().copied().collect());

static NON_CONTROLLABLE_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| NON_CONTROLLABLE.iter().copied().collect());

pub fn is_categorical(name: &str) -> bool {
    CATEGORICAL_SET.contains(name)
}

pub fn is_non_controllable(name: &str) -> bool {
    NON_CONTROLLABLE_SET.contains(name)
}

/// Normalizes caller-supplied attributes to the scales the model was trained
/// on: study time arrives as raw weekly hours, travel time as raw minutes,
/// and several attributes need clamping to the dataset's observed ranges.
pub fn normalize(features: &RawFeatureSet, config: &PipelineConfig) -> RawFeatureSet {
    let mut normalized = features.clone();

    if let Some(hours) = num(&normalized, "studytime") {
        let bucket = if hours < 2.0 {
            1.0
        } else if hours <= 5.0 {
            2.0
        } else if hours <= 10.0 {
            3.0
        } else {
            4.0
        };
        normalized.insert("studytime".to_string(), FeatureValue::Num(bucket));
    }

    if let Some(minutes) = num(&normalized, "traveltime") {
        let bucket = if minutes < 15.0 {
            1.0
        } else if minutes <= 30.0 {
            2.0
        } else if minutes <= 60.0 {
            3.0
        } else {
            4.0
        };
        normalized.insert("traveltime".to_string(), FeatureValue::Num(bucket));
    }

    clamp_attr(&mut normalized, "failures", 0.0, config.max_failures as f64);
    clamp_attr(&mut normalized, "absences", 0.0, config.max_absences as f64);
    clamp_attr(&mut normalized, "G1", 0.0, config.max_grade as f64);
    clamp_attr(&mut normalized, "G2", 0.0, config.max_grade as f64);
    clamp_attr(&mut normalized, "age", 15.0, 22.0);

    for attr in ["Medu", "Fedu"] {
        clamp_attr(&mut normalized, attr, 0.0, 4.0);
    }
    for attr in ["famrel", "freetime", "goout", "Dalc", "Walc", "health"] {
        clamp_attr(&mut normalized, attr, 1.0, 5.0);
    }

    normalized
}

fn num(features: &RawFeatureSet, name: &str) -> Option<f64> {
    features.get(name).and_then(FeatureValue::as_num)
}

fn clamp_attr(features: &mut RawFeatureSet, name: &str, lo: f64, hi: f64) {
    if let Some(v) = num(features, name) {
        features.insert(name.to_string(), FeatureValue::Num(v.clamp(lo, hi)));
    }
}
