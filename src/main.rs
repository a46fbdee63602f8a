// src/main.rs

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use amicooked_lib::{
    dataset, raw_features_from_json, ModelStore, PipelineConfig, ScoringService,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting AmICooked scoring service");

    let config = PipelineConfig::from_env();
    let store = ModelStore::from_env();
    let service = ScoringService::load(store, config);

    if !service.stats().await.is_trained {
        let dataset_path = PathBuf::from(
            std::env::var("AMICOOKED_DATASET").unwrap_or_else(|_| "data/student-por.csv".to_string()),
        );
        info!(
            "No trained model found; training from {}",
            dataset_path.display()
        );

        let snapshot = dataset::load_snapshot(&dataset_path)
            .with_context(|| format!("Failed to load dataset {}", dataset_path.display()))?;

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        spinner.set_message(format!("Training base scorer on {} rows...", snapshot.len()));
        spinner.enable_steady_tick(Duration::from_millis(100));

        let report = service.train(snapshot).await.context("Startup training failed")?;
        spinner.finish_with_message(format!(
            "Training complete: train R2 {:.4}, holdout R2 {:.4}",
            report.train_r2, report.holdout_r2
        ));
    }

    // Two contrasting profiles as a smoke check of the serving path.
    let cooked = raw_features_from_json(&json!({
        "studytime": 1, "failures": 2, "absences": 30,
        "G1": 8, "G2": 9, "goout": 5, "Dalc": 4, "Walc": 5,
        "schoolsup": "no", "famsup": "no", "higher": "no", "internet": "no",
        "health": 2
    }));
    let chilling = raw_features_from_json(&json!({
        "studytime": 15, "failures": 0, "absences": 2,
        "G1": 18, "G2": 18, "goout": 1, "Dalc": 1, "Walc": 1,
        "schoolsup": "yes", "famsup": "yes", "higher": "yes", "internet": "yes",
        "health": 5
    }));

    for (name, features) in [("cooked", &cooked), ("chilling", &chilling)] {
        let result = service.score(features).await?;
        println!(
            "{:>9} profile -> score {}/10 (base {}): {} [{} confidence]",
            name, result.score, result.base_score, result.label, result.confidence
        );
    }

    let stats = service.stats().await;
    println!(
        "Model stats: holdout R2 {:?}, feedback events {}, Q-table states {}",
        stats.base_model_r2, stats.total_feedback, stats.q_table_size
    );

    Ok(())
}
