// src/persistence.rs

use anyhow::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::pipeline::ScoringPipeline;

const DEFAULT_MODEL_PATH: &str = "data/amicooked_model.json";

/// Serializes the pipeline's entire learned state as one unit: regressor,
/// category code maps, Q-table, feedback log, training snapshot and counters.
///
/// Saves are atomic (write to a sibling temp file, then rename) so a crash
/// mid-write never leaves a truncated snapshot behind. Loads either fully
/// succeed or fall back to a pristine untrained pipeline.
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Self {
        let path = std::env::var("AMICOOKED_MODEL_PATH")
            .unwrap_or_else(|_| DEFAULT_MODEL_PATH.to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, pipeline: &ScoringPipeline) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create snapshot directory {}", parent.display())
                })?;
            }
        }

        let bytes =
            serde_json::to_vec(pipeline).context("Failed to serialize pipeline snapshot")?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes)
            .with_context(|| format!("Failed to write snapshot temp file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!("Failed to move snapshot into place at {}", self.path.display())
        })?;

        info!(
            "Saved pipeline snapshot ({} bytes) to {}",
            bytes.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Loads the last snapshot, or returns a fresh untrained pipeline when no
    /// snapshot exists or the snapshot cannot be fully deserialized. A
    /// partially-written or corrupted file never yields a partially
    /// initialized pipeline.
    pub fn load(&self, config: PipelineConfig) -> ScoringPipeline {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<ScoringPipeline>(&bytes) {
                Ok(pipeline) => {
                    info!(
                        "Loaded pipeline snapshot from {} (trained: {})",
                        self.path.display(),
                        pipeline.is_trained()
                    );
                    pipeline
                }
                Err(e) => {
                    warn!(
                        "Snapshot at {} is corrupt ({}); starting with a fresh pipeline",
                        self.path.display(),
                        e
                    );
                    ScoringPipeline::new(config)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No snapshot at {}; starting with a fresh pipeline",
                    self.path.display()
                );
                ScoringPipeline::new(config)
            }
            Err(e) => {
                warn!(
                    "Could not read snapshot at {} ({}); starting with a fresh pipeline",
                    self.path.display(),
                    e
                );
                ScoringPipeline::new(config)
            }
        }
    }
}
