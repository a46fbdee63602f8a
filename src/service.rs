// src/service.rs

use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::PipelineConfig;
use crate::dataset::TrainingSnapshot;
use crate::error::ScoringError;
use crate::models::{DatasetSummary, ModelStats, RawFeatureSet, ScoringResult, TrainingReport};
use crate::persistence::ModelStore;
use crate::pipeline::ScoringPipeline;

/// The single long-lived pipeline instance shared across request handlers.
pub type SharedPipeline = Arc<RwLock<ScoringPipeline>>;

pub fn create_shared_pipeline(pipeline: ScoringPipeline) -> SharedPipeline {
    Arc::new(RwLock::new(pipeline))
}

/// Concurrency boundary around the pipeline for a pool of request handlers.
///
/// Plain scoring takes a read lock and runs concurrently; training, feedback
/// and reset take the write lock and persist the snapshot before releasing
/// it, so mutation plus persistence is one exclusive section and callers
/// never observe half-swapped state.
pub struct ScoringService {
    pipeline: SharedPipeline,
    store: ModelStore,
}

impl ScoringService {
    pub fn new(pipeline: ScoringPipeline, store: ModelStore) -> Self {
        Self {
            pipeline: create_shared_pipeline(pipeline),
            store,
        }
    }

    /// Restores the service from the store's last snapshot, or starts fresh.
    pub fn load(store: ModelStore, config: PipelineConfig) -> Self {
        let pipeline = store.load(config);
        Self::new(pipeline, store)
    }

    pub fn pipeline(&self) -> SharedPipeline {
        Arc::clone(&self.pipeline)
    }

    pub async fn score(&self, features: &RawFeatureSet) -> Result<ScoringResult, ScoringError> {
        self.pipeline.read().await.score(features)
    }

    pub async fn train(&self, snapshot: TrainingSnapshot) -> Result<TrainingReport> {
        let mut pipeline = self.pipeline.write().await;
        let report = pipeline.train(snapshot)?;
        self.store
            .save(&pipeline)
            .context("Failed to persist snapshot after training")?;
        info!(
            "Trained and persisted: holdout R2 {:.4} over {} rows",
            report.holdout_r2, report.rows_trained
        );
        Ok(report)
    }

    pub async fn record_feedback(
        &self,
        features: &RawFeatureSet,
        predicted_score: i32,
        label: &str,
    ) -> Result<ModelStats> {
        let mut pipeline = self.pipeline.write().await;
        let stats = pipeline.record_feedback(features, predicted_score, label)?;
        self.store
            .save(&pipeline)
            .context("Failed to persist snapshot after feedback")?;
        Ok(stats)
    }

    pub async fn stats(&self) -> ModelStats {
        self.pipeline.read().await.stats()
    }

    pub async fn dataset_summary(&self) -> Result<DatasetSummary, ScoringError> {
        self.pipeline.read().await.dataset_summary()
    }

    pub async fn reset(&self) -> Result<()> {
        let mut pipeline = self.pipeline.write().await;
        pipeline.reset();
        self.store
            .save(&pipeline)
            .context("Failed to persist snapshot after reset")?;
        Ok(())
    }
}
