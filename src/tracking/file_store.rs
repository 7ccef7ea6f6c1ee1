//! Файловое хранилище экспериментов (раскладка каталога `mlruns`)
//!
//! ```text
//! <root>/<experiment_id>/meta.yaml
//! <root>/<experiment_id>/<run_id>/meta.yaml
//! <root>/<experiment_id>/<run_id>/{params,metrics,tags,artifacts}/
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::tracking::now_millis;
use crate::tracking::store::{
    validate_artifact_path, validate_key, Experiment, Metric, RunInfo, RunStatus, TrackingStore,
};

const DEFAULT_EXPERIMENT_ID: &str = "0";
const DEFAULT_EXPERIMENT_NAME: &str = "Default";
const TRASH_DIR: &str = ".trash";
const META_FILE: &str = "meta.yaml";
const ACTIVE: &str = "active";
/// Тип источника LOCAL
const SOURCE_TYPE_LOCAL: i32 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExperimentMeta {
    artifact_location: String,
    creation_time: i64,
    experiment_id: String,
    last_update_time: i64,
    lifecycle_stage: String,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunMeta {
    artifact_uri: String,
    end_time: Option<i64>,
    entry_point_name: String,
    experiment_id: String,
    lifecycle_stage: String,
    run_id: String,
    run_name: String,
    run_uuid: String,
    source_name: String,
    source_type: i32,
    source_version: String,
    start_time: i64,
    status: i32,
    tags: Vec<String>,
    user_id: String,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| PipelineError::io(&root, e))?;
        let root = fs::canonicalize(&root).map_err(|e| PipelineError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn path_from_uri(uri: &str) -> PathBuf {
        let path = uri
            .strip_prefix("file://")
            .or_else(|| uri.strip_prefix("file:"))
            .unwrap_or(uri);
        PathBuf::from(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run: &RunInfo) -> PathBuf {
        self.root.join(&run.experiment_id).join(&run.run_id)
    }

    /// Чтение статуса запуска из его `meta.yaml`
    pub fn run_status(&self, run: &RunInfo) -> Result<RunStatus> {
        let meta: RunMeta = read_yaml(&self.run_dir(run).join(META_FILE))?;
        RunStatus::from_code(meta.status)
            .ok_or_else(|| PipelineError::Tracking(format!("unknown run status {}", meta.status)))
    }

    fn ensure_default_experiment(&self) -> Result<()> {
        if !self.root.join(DEFAULT_EXPERIMENT_ID).join(META_FILE).exists() {
            self.create_experiment(DEFAULT_EXPERIMENT_ID, DEFAULT_EXPERIMENT_NAME)?;
        }
        Ok(())
    }

    fn list_experiments(&self) -> Result<Vec<ExperimentMeta>> {
        let entries = fs::read_dir(&self.root).map_err(|e| PipelineError::io(&self.root, e))?;
        let mut experiments = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_dir() || entry.file_name() == TRASH_DIR {
                continue;
            }
            let meta_path = path.join(META_FILE);
            if meta_path.exists() {
                experiments.push(read_yaml::<ExperimentMeta>(&meta_path)?);
            }
        }
        Ok(experiments)
    }

    fn create_experiment(&self, experiment_id: &str, name: &str) -> Result<ExperimentMeta> {
        let dir = self.root.join(experiment_id);
        fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

        let now = now_millis();
        let meta = ExperimentMeta {
            artifact_location: format!("file://{}", dir.display()),
            creation_time: now,
            experiment_id: experiment_id.to_string(),
            last_update_time: now,
            lifecycle_stage: ACTIVE.to_string(),
            name: name.to_string(),
        };
        write_yaml(&dir.join(META_FILE), &meta)?;
        tracing::info!("Created experiment {:?} with id {}", name, experiment_id);
        Ok(meta)
    }
}

impl TrackingStore for FileStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<Experiment> {
        self.ensure_default_experiment()?;
        let experiments = self.list_experiments()?;

        if let Some(found) = experiments.iter().find(|e| e.name == name) {
            if found.lifecycle_stage != ACTIVE {
                return Err(PipelineError::Tracking(format!(
                    "experiment {name:?} exists but is {}",
                    found.lifecycle_stage
                )));
            }
            return Ok(Experiment {
                experiment_id: found.experiment_id.clone(),
                name: found.name.clone(),
            });
        }

        let next_id = experiments
            .iter()
            .filter_map(|e| e.experiment_id.parse::<u64>().ok())
            .max()
            .map_or(1, |max| max + 1);
        let meta = self.create_experiment(&next_id.to_string(), name)?;
        Ok(Experiment {
            experiment_id: meta.experiment_id,
            name: meta.name,
        })
    }

    fn create_run(
        &self,
        experiment: &Experiment,
        run_name: Option<&str>,
        start_time: i64,
        tags: &[(String, String)],
    ) -> Result<RunInfo> {
        let run_id = Uuid::new_v4().simple().to_string();
        let run_name = run_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("run-{}", &run_id[..8]));
        let run_dir = self.root.join(&experiment.experiment_id).join(&run_id);

        for sub in ["artifacts", "metrics", "params", "tags"] {
            let dir = run_dir.join(sub);
            fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        }

        let info = RunInfo {
            run_id: run_id.clone(),
            experiment_id: experiment.experiment_id.clone(),
            run_name: run_name.clone(),
            artifact_uri: format!("file://{}", run_dir.join("artifacts").display()),
            start_time,
            status: RunStatus::Running,
        };

        let meta = RunMeta {
            artifact_uri: info.artifact_uri.clone(),
            end_time: None,
            entry_point_name: String::new(),
            experiment_id: info.experiment_id.clone(),
            lifecycle_stage: ACTIVE.to_string(),
            run_id: run_id.clone(),
            run_name: run_name.clone(),
            run_uuid: run_id,
            source_name: String::new(),
            source_type: SOURCE_TYPE_LOCAL,
            source_version: String::new(),
            start_time,
            status: RunStatus::Running.code(),
            tags: Vec::new(),
            user_id: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
        };
        write_yaml(&run_dir.join(META_FILE), &meta)?;

        let run_name_tag = ("mlflow.runName".to_string(), run_name);
        for (key, value) in tags.iter().chain(std::iter::once(&run_name_tag)) {
            validate_key(key)?;
            write_file(&run_dir.join("tags").join(key), value.as_bytes())?;
        }

        Ok(info)
    }

    fn log_param(&self, run: &RunInfo, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.run_dir(run).join("params").join(key);
        if path.exists() {
            let existing = fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
            if existing != value {
                return Err(PipelineError::Tracking(format!(
                    "param {key:?} already logged as {existing:?}, cannot change it to {value:?}"
                )));
            }
            return Ok(());
        }
        write_file(&path, value.as_bytes())
    }

    fn log_metric(&self, run: &RunInfo, metric: &Metric) -> Result<()> {
        validate_key(&metric.key)?;
        let path = self.run_dir(run).join("metrics").join(&metric.key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PipelineError::io(&path, e))?;
        writeln!(file, "{} {} {}", metric.timestamp, metric.value, metric.step)
            .map_err(|e| PipelineError::io(&path, e))
    }

    fn log_artifact(&self, run: &RunInfo, artifact_path: &str, contents: &[u8]) -> Result<()> {
        let root = local_artifact_root(&run.artifact_uri).ok_or_else(|| {
            PipelineError::Tracking(format!(
                "artifact URI {:?} is not a local path",
                run.artifact_uri
            ))
        })?;
        write_local_artifact(&root, artifact_path, contents)
    }

    fn update_run(&self, run: &RunInfo, status: RunStatus, end_time: i64) -> Result<()> {
        let path = self.run_dir(run).join(META_FILE);
        let mut meta: RunMeta = read_yaml(&path)?;
        meta.status = status.code();
        if status != RunStatus::Running {
            meta.end_time = Some(end_time);
        }
        write_yaml(&path, &meta)
    }
}

/// Локальный каталог для URI артефактов вида `file://...` или обычного пути
pub(crate) fn local_artifact_root(uri: &str) -> Option<PathBuf> {
    if uri.starts_with("file:") || (!uri.contains("://") && !uri.contains(":/")) {
        Some(FileStore::path_from_uri(uri))
    } else {
        None
    }
}

pub(crate) fn write_local_artifact(root: &Path, artifact_path: &str, contents: &[u8]) -> Result<()> {
    validate_artifact_path(artifact_path)?;
    let path = root.join(artifact_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    write_file(&path, contents)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| PipelineError::io(path, e))
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(value)?;
    write_file(path, yaml.as_bytes())
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(serde_yaml::from_str(&raw)?)
}
