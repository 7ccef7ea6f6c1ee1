//! Интерфейс хранилища экспериментов

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::tracking::file_store::FileStore;
use crate::tracking::rest_store::RestStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Scheduled => "SCHEDULED",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
            RunStatus::Killed => "KILLED",
        }
    }

    /// Числовой код в `meta.yaml` файлового хранилища
    pub fn code(&self) -> i32 {
        match self {
            RunStatus::Running => 1,
            RunStatus::Scheduled => 2,
            RunStatus::Finished => 3,
            RunStatus::Failed => 4,
            RunStatus::Killed => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(RunStatus::Running),
            2 => Some(RunStatus::Scheduled),
            3 => Some(RunStatus::Finished),
            4 => Some(RunStatus::Failed),
            5 => Some(RunStatus::Killed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    pub run_name: String,
    pub artifact_uri: String,
    pub start_time: i64,
    pub status: RunStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    pub timestamp: i64,
    pub step: i64,
}

/// Бэкенд трекинга: локальные файлы или удалённый сервер
pub trait TrackingStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<Experiment>;

    fn create_run(
        &self,
        experiment: &Experiment,
        run_name: Option<&str>,
        start_time: i64,
        tags: &[(String, String)],
    ) -> Result<RunInfo>;

    fn log_param(&self, run: &RunInfo, key: &str, value: &str) -> Result<()>;

    fn log_metric(&self, run: &RunInfo, metric: &Metric) -> Result<()>;

    /// Запись файла артефакта по относительному пути внутри каталога артефактов запуска
    fn log_artifact(&self, run: &RunInfo, artifact_path: &str, contents: &[u8]) -> Result<()>;

    fn update_run(&self, run: &RunInfo, status: RunStatus, end_time: i64) -> Result<()>;
}

/// Выбор бэкенда по URI: `http(s)://` означает сервер, иначе локальный каталог
pub fn open_store(uri: &str, token: Option<&str>) -> Result<Box<dyn TrackingStore>> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        Ok(Box::new(RestStore::new(uri, token)?))
    } else if uri.contains("://") && !uri.starts_with("file://") {
        Err(PipelineError::Config(format!("unsupported tracking URI scheme: {uri}")))
    } else {
        Ok(Box::new(FileStore::new(FileStore::path_from_uri(uri))?))
    }
}

/// Ключи параметров и метрик становятся именами файлов
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= 250
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ' | '/'))
        && !key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Tracking(format!("invalid key {key:?}")))
    }
}

/// Относительный путь артефакта без выхода за пределы каталога запуска
pub(crate) fn validate_artifact_path(path: &str) -> Result<()> {
    let valid = !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && !path.split('/').any(|part| part.is_empty() || part == "..");
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Tracking(format!("invalid artifact path {path:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            RunStatus::Running,
            RunStatus::Scheduled,
            RunStatus::Finished,
            RunStatus::Failed,
            RunStatus::Killed,
        ] {
            assert_eq!(RunStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(serde_json::to_string(&RunStatus::Finished).unwrap(), "\"FINISHED\"");
    }

    #[test]
    fn keys_and_paths_are_checked() {
        assert!(validate_key("r2_score").is_ok());
        assert!(validate_key("train/mse").is_ok());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key("").is_err());

        assert!(validate_artifact_path("model/MLmodel").is_ok());
        assert!(validate_artifact_path("/etc/passwd").is_err());
        assert!(validate_artifact_path("model/../../x").is_err());
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(matches!(open_store("s3://bucket/runs", None), Err(PipelineError::Config(_))));
    }
}
