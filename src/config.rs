//! Конфигурация пайплайна

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::ForestConfig;

pub const DEFAULT_DATA_PATH: &str = "a23_final.xlsx";
pub const EXPERIMENT_NAME: &str = "Valor_Aprovado_Prediction";
pub const DEFAULT_TRACKING_URI: &str = "mlruns";
pub const MODEL_TYPE: &str = "RandomForestRegressor";
pub const MODEL_ARTIFACT_PATH: &str = "model";

pub const TARGET_COLUMN: &str = "Valor Aprovado do procedimento";

pub const FEATURE_COLUMNS: [&str; 6] = [
    "Idade do paciente em anos",
    "Sexo do paciente",
    "Raça/Cor do paciente",
    "Código do Procedimento Ambulatorial",
    "Tipo de Estabelecimento",
    "Quantidade Produzida (APRESENTADA)",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    /// Выбираемые столбцы, включая целевой
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,
    #[serde(default = "default_target")]
    pub target: String,
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_experiment_name")]
    pub experiment_name: String,
    #[serde(default = "default_tracking_uri")]
    pub tracking_uri: String,
    #[serde(default)]
    pub tracking_token: Option<String>,
    #[serde(default)]
    pub run_name: Option<String>,
    #[serde(default = "default_csv_delimiter")]
    pub csv_delimiter: char,
    #[serde(default = "default_input_example_rows")]
    pub input_example_rows: usize,
    #[serde(default)]
    pub forest: ForestConfig,
}

fn default_data_path() -> PathBuf { PathBuf::from(DEFAULT_DATA_PATH) }
fn default_columns() -> Vec<String> {
    FEATURE_COLUMNS
        .iter()
        .chain(std::iter::once(&TARGET_COLUMN))
        .map(|c| c.to_string())
        .collect()
}
fn default_target() -> String { TARGET_COLUMN.to_string() }
fn default_test_size() -> f64 { 0.2 }
fn default_seed() -> u64 { 42 }
fn default_experiment_name() -> String { EXPERIMENT_NAME.to_string() }
fn default_tracking_uri() -> String { DEFAULT_TRACKING_URI.to_string() }
fn default_csv_delimiter() -> char { ',' }
fn default_input_example_rows() -> usize { 5 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            columns: default_columns(),
            target: default_target(),
            test_size: default_test_size(),
            seed: default_seed(),
            experiment_name: default_experiment_name(),
            tracking_uri: default_tracking_uri(),
            tracking_token: None,
            run_name: None,
            csv_delimiter: default_csv_delimiter(),
            input_example_rows: default_input_example_rows(),
            forest: ForestConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(PipelineError::Config(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.columns.len() < 2 {
            return Err(PipelineError::Config(
                "at least one feature column and the target are required".to_string(),
            ));
        }
        if !self.columns.contains(&self.target) {
            return Err(PipelineError::Config(format!(
                "target column {:?} is not among the selected columns",
                self.target
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(PipelineError::Config(format!("duplicate column {dup:?}")));
        }
        if !self.csv_delimiter.is_ascii() {
            return Err(PipelineError::Config(format!(
                "csv delimiter must be a single ASCII character, got {:?}",
                self.csv_delimiter
            )));
        }
        if self.experiment_name.trim().is_empty() {
            return Err(PipelineError::Config("experiment name is empty".to_string()));
        }
        self.forest.validate()
    }

    pub fn feature_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(move |c| *c != self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_seven_columns() {
        let config = PipelineConfig::default();
        assert_eq!(config.columns.len(), 7);
        assert_eq!(config.feature_columns().count(), 6);
        assert_eq!(config.test_size, 0.2);
        assert_eq!(config.seed, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "test_size": 0.25, "forest": { "n_estimators": 10 } }"#)
                .unwrap();
        assert_eq!(config.test_size, 0.25);
        assert_eq!(config.forest.n_estimators, 10);
        assert_eq!(config.forest.min_samples_leaf, 1);
        assert_eq!(config.experiment_name, EXPERIMENT_NAME);
    }

    #[test]
    fn rejects_bad_test_size_and_missing_target() {
        let mut config = PipelineConfig { test_size: 1.0, ..Default::default() };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        config.test_size = 0.2;
        config.target = "nope".to_string();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_duplicate_columns() {
        let mut config = PipelineConfig::default();
        config.columns.push(FEATURE_COLUMNS[0].to_string());
        assert!(config.validate().is_err());
    }
}
