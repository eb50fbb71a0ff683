use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::classifier::{ClipValues, Preprocessing};

/// Environment variable overriding the default directory used by `save`.
pub const DATA_PATH_ENV: &str = "ENSEMBLE_DATA_PATH";

/// Construction parameters for [`crate::EnsembleClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Feature range every member must share.
    pub clip_values: ClipValues,
    /// One weight per member; uniform when absent.
    pub weights: Option<Vec<f32>>,
    /// Input normalization recorded on the ensemble.
    pub preprocessing: Preprocessing,
    /// Axis of the colour channels or features.
    pub channel_index: usize,
    /// Whether `set_learning_phase` reaches the members.
    pub propagate_learning_phase: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            clip_values: ClipValues::default(),
            weights: None,
            preprocessing: Preprocessing::default(),
            channel_index: 3,
            propagate_learning_phase: true,
        }
    }
}

impl EnsembleConfig {
    /// Loads a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents =
            fs::read_to_string(&path).with_context(|| format!("reading {:?}", path.as_ref()))?;
        serde_json::from_str(&contents).context("parsing ensemble config")
    }
}

/// Hyperparameters of [`crate::LinearSoftmaxClassifier`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearConfig {
    /// Gradient descent step size.
    pub learning_rate: f32,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self { learning_rate: 0.1 }
    }
}

/// Directory used when `save` receives no explicit one.
#[must_use]
pub fn default_data_path() -> PathBuf {
    env::var_os(DATA_PATH_ENV)
        .map_or_else(|| env::temp_dir().join("ensemble-data"), PathBuf::from)
}

/// Returns `dir` when given, the default data path otherwise.
#[must_use]
pub fn resolve_data_path(dir: Option<&Path>) -> PathBuf {
    dir.map_or_else(default_data_path, Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ensemble.json");
        fs::write(
            &path,
            r#"{ "clip_values": { "min": -1.0, "max": 1.0 }, "weights": [0.25, 0.75] }"#,
        )
        .unwrap();
        let config = EnsembleConfig::from_json_file(&path).unwrap();
        assert_eq!(config.clip_values, ClipValues::new(-1.0, 1.0));
        assert_eq!(config.weights, Some(vec![0.25, 0.75]));
        assert_eq!(config.preprocessing, Preprocessing::default());
        assert_eq!(config.channel_index, 3);
        assert!(config.propagate_learning_phase);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EnsembleConfig::from_json_file("/nonexistent/ensemble.json").unwrap_err();
        assert!(err.to_string().contains("ensemble.json"));
    }

    #[test]
    fn explicit_dir_wins() {
        let dir = tempdir().unwrap();
        assert_eq!(resolve_data_path(Some(dir.path())), dir.path());
        assert!(LinearConfig::default().learning_rate > 0.0);
    }
}
