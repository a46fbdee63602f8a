// src/lib.rs

pub mod config;
pub mod dataset;
pub mod encoding;
pub mod error;
pub mod feature_cache;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod rl;
pub mod schema;
pub mod scorer;
pub mod service;

pub use config::PipelineConfig;
pub use dataset::TrainingSnapshot;
pub use error::ScoringError;
pub use models::{
    raw_features_from_json, FeedbackKind, ModelStats, RawFeatureSet, ScoringResult, TrainingReport,
};
pub use persistence::ModelStore;
pub use pipeline::ScoringPipeline;
pub use service::{create_shared_pipeline, ScoringService, SharedPipeline};
