//! Dynamic weights loader: reads the read-only category→weight table
//! external collaborators maintain, at the start of each cycle
//! (spec.md §3, §4.6: "loaded at cycle start from an external file").
//!
//! A missing or malformed file is not fatal: the orchestrator keeps
//! running on the previous (or default) weights and logs the failure,
//! since a stale weight table is strictly better than stalling the
//! pipeline over it.

use std::path::Path;

use tracing::warn;

use crate::models::DynamicWeights;

pub async fn load(path: &str, default_weight: f64) -> DynamicWeights {
    match load_from_file(path).await {
        Ok(weights) => weights,
        Err(err) => {
            warn!(path, error = %err, "failed to load dynamic weights, using defaults");
            DynamicWeights {
                weights: Default::default(),
                default_weight,
            }
        }
    }
}

async fn load_from_file(path: &str) -> anyhow::Result<DynamicWeights> {
    if !Path::new(path).exists() {
        anyhow::bail!("weights file not found: {path}");
    }
    let raw = tokio::fs::read_to_string(path).await?;
    let weights: DynamicWeights = serde_json::from_str(&raw)?;
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn loads_weights_from_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"weights": {{"fda": 3.0}}, "default_weight": 0.5}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let weights = load(&path, 0.5).await;
        assert_eq!(weights.get("fda"), 3.0);
        assert_eq!(weights.get("unknown_category"), 0.5);
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_default_weight() {
        let weights = load("/nonexistent/path/weights.json", 0.5).await;
        assert_eq!(weights.get("anything"), 0.5);
    }

    #[tokio::test]
    async fn malformed_file_falls_back_to_default_weight() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let weights = load(&path, 0.5).await;
        assert_eq!(weights.get("anything"), 0.5);
    }
}
