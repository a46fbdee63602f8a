// src/scorer.rs

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

use crate::config::PipelineConfig;
use crate::error::ScoringError;

type RegressionTree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Gradient-boosted regression over decision-tree base learners.
///
/// Trained offline as a full replace: starts from the target mean, then fits
/// each tree against the residuals of the running ensemble, with shrinkage
/// and row subsampling. Inference sums the shrunken tree outputs.
#[derive(Serialize, Deserialize)]
pub struct GradientBoostedScorer {
    base_prediction: f64,
    trees: Vec<RegressionTree>,
    shrinkage: f64,
}

impl std::fmt::Debug for GradientBoostedScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradientBoostedScorer")
            .field("trees", &self.trees.len())
            .field("base_prediction", &self.base_prediction)
            .field("shrinkage", &self.shrinkage)
            .finish()
    }
}

impl GradientBoostedScorer {
    /// Fits the ensemble. `rows` are encoded feature vectors; `targets` the
    /// continuous grades on the 0-20 scale.
    pub fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        config: &PipelineConfig,
    ) -> Result<Self, ScoringError> {
        if rows.is_empty() || rows.len() != targets.len() {
            return Err(ScoringError::Training(format!(
                "inconsistent training shape: {} rows, {} targets",
                rows.len(),
                targets.len()
            )));
        }

        let base_prediction = targets.iter().sum::<f64>() / targets.len() as f64;
        let full_x = DenseMatrix::from_2d_vec(&rows.to_vec());

        // Running ensemble prediction per training row.
        let mut ensemble: Vec<f64> = vec![base_prediction; targets.len()];
        let mut trees: Vec<RegressionTree> = Vec::with_capacity(config.n_estimators);

        let mut rng = StdRng::seed_from_u64(config.training_seed);
        let sample_size =
            ((rows.len() as f64 * config.subsample).round() as usize).clamp(1, rows.len());
        let mut indices: Vec<usize> = (0..rows.len()).collect();

        for round in 0..config.n_estimators {
            indices.shuffle(&mut rng);
            let sampled = &indices[..sample_size];

            let sub_rows: Vec<Vec<f64>> = sampled.iter().map(|&i| rows[i].clone()).collect();
            let sub_residuals: Vec<f64> =
                sampled.iter().map(|&i| targets[i] - ensemble[i]).collect();

            let sub_x = DenseMatrix::from_2d_vec(&sub_rows);
            let params =
                DecisionTreeRegressorParameters::default().with_max_depth(config.tree_max_depth);
            let tree = DecisionTreeRegressor::fit(&sub_x, &sub_residuals, params)
                .map_err(|e| ScoringError::Training(format!("boosting round {round}: {e}")))?;

            let corrections = tree
                .predict(&full_x)
                .map_err(|e| ScoringError::Training(format!("boosting round {round}: {e}")))?;
            for (current, correction) in ensemble.iter_mut().zip(&corrections) {
                *current += config.gbm_learning_rate * correction;
            }
            trees.push(tree);
        }

        debug!(
            "Fitted gradient-boosted scorer: {} trees, base prediction {:.3}",
            trees.len(),
            base_prediction
        );

        Ok(Self {
            base_prediction,
            trees,
            shrinkage: config.gbm_learning_rate,
        })
    }

    /// Continuous grade estimate for one encoded vector.
    pub fn predict_one(&self, encoded: &[f64]) -> Result<f64, ScoringError> {
        let x = DenseMatrix::from_2d_vec(&vec![encoded.to_vec()]);
        let mut prediction = self.base_prediction;
        for tree in &self.trees {
            let out = tree
                .predict(&x)
                .map_err(|e| ScoringError::Prediction(e.to_string()))?;
            prediction += self.shrinkage * out[0];
        }
        Ok(prediction)
    }

    /// Coefficient of determination of the ensemble on a labeled set.
    pub fn r2(&self, rows: &[Vec<f64>], targets: &[f64]) -> Result<f64, ScoringError> {
        let predictions: Result<Vec<f64>, ScoringError> =
            rows.iter().map(|row| self.predict_one(row)).collect();
        let predictions = predictions?;

        let mean = targets.iter().sum::<f64>() / targets.len().max(1) as f64;
        let ss_tot: f64 = targets.iter().map(|y| (y - mean).powi(2)).sum();
        let ss_res: f64 = targets
            .iter()
            .zip(&predictions)
            .map(|(y, p)| (y - p).powi(2))
            .sum();

        if ss_tot == 0.0 {
            return Ok(0.0);
        }
        Ok(1.0 - ss_res / ss_tot)
    }
}

/// Converts a continuous grade estimate (0-20, high = good) into the discrete
/// cooked score (1-10, high = bad). The divisor spreads the typical grade
/// range over all ten buckets; extremes clamp instead of overflowing.
pub fn quantize_grade(grade: f64, divisor: f64) -> i32 {
    let bucket = (grade / divisor).floor() as i64;
    (11 - bucket).clamp(1, 10) as i32
}

/// Deterministic, seeded 90/10-style partition of `0..len` into
/// (train, holdout) index sets.
pub fn split_indices(len: usize, holdout_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let holdout_len = ((len as f64 * holdout_fraction).round() as usize).min(len.saturating_sub(1));
    let holdout = indices.split_off(len - holdout_len);
    info!(
        "Split {} rows into {} train / {} holdout",
        len,
        indices.len(),
        holdout.len()
    );
    (indices, holdout)
}
