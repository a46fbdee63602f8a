// src/dataset.rs

use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{FeatureValue, RawFeatureSet};
use crate::schema;

/// The tabular dataset used for the last successful training run. Retained
/// for imputation statistics and summary diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSnapshot {
    pub rows: Vec<RawFeatureSet>,
    pub targets: Vec<f64>,
}

impl TrainingSnapshot {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads a delimited survey dataset into a `TrainingSnapshot`.
///
/// Handles both `,` and `;` separators (the source dataset ships with `;`)
/// and strips surrounding quotes from values. Every schema attribute plus
/// the target column must be present in the header.
pub fn load_snapshot(path: &Path) -> Result<TrainingSnapshot> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset file {}", path.display()))?;

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header_line = lines.next().context("Dataset file is empty")?;
    let delimiter = if header_line.contains(';') { ';' } else { ',' };

    let header: Vec<String> = header_line
        .split(delimiter)
        .map(|field| field.trim().trim_matches('"').to_string())
        .collect();

    for attr in schema::SCHEMA {
        if !header.iter().any(|h| h == attr) {
            bail!("Dataset is missing required column '{}'", attr);
        }
    }
    let target_idx = header
        .iter()
        .position(|h| h == schema::TARGET_COLUMN)
        .with_context(|| format!("Dataset is missing target column '{}'", schema::TARGET_COLUMN))?;

    let mut rows = Vec::new();
    let mut targets = Vec::new();

    for (line_no, line) in lines.enumerate() {
        let fields: Vec<&str> = line
            .split(delimiter)
            .map(|field| field.trim().trim_matches('"'))
            .collect();
        if fields.len() != header.len() {
            bail!(
                "Dataset row {} has {} fields, expected {}",
                line_no + 2,
                fields.len(),
                header.len()
            );
        }

        let mut row = RawFeatureSet::new();
        for (column, raw) in header.iter().zip(&fields) {
            if column == schema::TARGET_COLUMN {
                continue;
            }
            let value = match raw.parse::<f64>() {
                Ok(n) => FeatureValue::Num(n),
                Err(_) => FeatureValue::Text((*raw).to_string()),
            };
            row.insert(column.clone(), value);
        }

        let target: f64 = fields[target_idx]
            .parse()
            .with_context(|| format!("Dataset row {}: unparsable target value", line_no + 2))?;

        rows.push(row);
        targets.push(target);
    }

    if rows.is_empty() {
        bail!("Dataset {} contains no data rows", path.display());
    }

    info!("Loaded dataset {}: {} rows", path.display(), rows.len());
    Ok(TrainingSnapshot { rows, targets })
}
