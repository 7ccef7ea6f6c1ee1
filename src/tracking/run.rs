//! Трекер экспериментов и область активного запуска

use std::fmt::Display;

use crate::error::Result;
use crate::tracking::model_artifact::ModelArtifact;
use crate::tracking::now_millis;
use crate::tracking::store::{open_store, Experiment, Metric, RunInfo, RunStatus, TrackingStore};

pub struct ExperimentTracker {
    store: Box<dyn TrackingStore>,
    tracking_uri: String,
}

impl ExperimentTracker {
    pub fn new(tracking_uri: &str, token: Option<&str>) -> Result<Self> {
        Ok(Self::with_store(open_store(tracking_uri, token)?, tracking_uri))
    }

    pub fn with_store(store: Box<dyn TrackingStore>, tracking_uri: &str) -> Self {
        Self {
            store,
            tracking_uri: tracking_uri.to_string(),
        }
    }

    pub fn tracking_uri(&self) -> &str {
        &self.tracking_uri
    }

    pub fn set_experiment(&self, name: &str) -> Result<Experiment> {
        let experiment = self.store.get_or_create_experiment(name)?;
        tracing::info!(
            "Using experiment {:?} (id {}) at {}",
            experiment.name,
            experiment.experiment_id,
            self.tracking_uri
        );
        Ok(experiment)
    }

    pub fn start_run(&self, experiment: &Experiment, run_name: Option<&str>) -> Result<ActiveRun<'_>> {
        let tags = vec![
            ("mlflow.source.type".to_string(), "LOCAL".to_string()),
            ("mlflow.source.name".to_string(), env!("CARGO_PKG_NAME").to_string()),
            (
                "mlflow.user".to_string(),
                std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            ),
        ];
        let info = self
            .store
            .create_run(experiment, run_name, now_millis(), &tags)?;
        tracing::info!("Started run {} ({})", info.run_id, info.run_name);
        Ok(ActiveRun {
            store: self.store.as_ref(),
            info,
            closed: false,
        })
    }

    /// Выполняет `body` внутри запуска: `Ok` закрывает запуск как FINISHED, `Err` как FAILED
    pub fn with_run<T, F>(
        &self,
        experiment: &Experiment,
        run_name: Option<&str>,
        body: F,
    ) -> Result<(T, RunInfo)>
    where
        F: FnOnce(&mut ActiveRun<'_>) -> Result<T>,
    {
        let mut run = self.start_run(experiment, run_name)?;
        match body(&mut run) {
            Ok(value) => {
                let info = run.end(RunStatus::Finished)?;
                Ok((value, info))
            }
            Err(e) => {
                if let Err(close_err) = run.end(RunStatus::Failed) {
                    tracing::warn!("Failed to mark run as FAILED: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

/// Открытый запуск. Если он не закрыт явно, `Drop` помечает его как FAILED.
pub struct ActiveRun<'a> {
    store: &'a dyn TrackingStore,
    info: RunInfo,
    closed: bool,
}

impl<'a> ActiveRun<'a> {
    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    pub fn log_param(&self, key: &str, value: impl Display) -> Result<()> {
        let value = value.to_string();
        tracing::debug!("param {} = {}", key, value);
        self.store.log_param(&self.info, key, &value)
    }

    pub fn log_metric(&self, key: &str, value: f64) -> Result<()> {
        self.log_metric_at(key, value, 0)
    }

    pub fn log_metric_at(&self, key: &str, value: f64, step: i64) -> Result<()> {
        tracing::debug!("metric {} = {} (step {})", key, value, step);
        let metric = Metric {
            key: key.to_string(),
            value,
            timestamp: now_millis(),
            step,
        };
        self.store.log_metric(&self.info, &metric)
    }

    pub fn log_artifact(&self, artifact_path: &str, contents: &[u8]) -> Result<()> {
        self.store.log_artifact(&self.info, artifact_path, contents)
    }

    pub fn log_model(&self, artifact_path: &str, artifact: &ModelArtifact<'_>) -> Result<()> {
        let files = artifact.files(artifact_path, &self.info.run_id)?;
        for (path, contents) in &files {
            self.log_artifact(path, contents)?;
        }
        tracing::info!(
            "Logged model artifact {:?} ({} files) to run {}",
            artifact_path,
            files.len(),
            self.info.run_id
        );
        Ok(())
    }

    pub fn finish(self) -> Result<RunInfo> {
        self.end(RunStatus::Finished)
    }

    pub fn fail(self) -> Result<RunInfo> {
        self.end(RunStatus::Failed)
    }

    fn end(mut self, status: RunStatus) -> Result<RunInfo> {
        self.store.update_run(&self.info, status, now_millis())?;
        self.closed = true;
        tracing::info!("Run {} ended with status {}", self.info.run_id, status.as_str());
        let mut info = self.info.clone();
        info.status = status;
        Ok(info)
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        tracing::warn!("Run {} was not closed; marking it FAILED", self.info.run_id);
        if let Err(e) = self
            .store
            .update_run(&self.info, RunStatus::Failed, now_millis())
        {
            tracing::warn!("Failed to close run {}: {}", self.info.run_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::tracking::file_store::FileStore;
    use tempfile::TempDir;

    fn tracker(dir: &TempDir) -> (ExperimentTracker, FileStore) {
        let store = FileStore::new(dir.path().join("mlruns")).unwrap();
        let tracker = ExperimentTracker::with_store(Box::new(store.clone()), "mlruns");
        (tracker, store)
    }

    #[test]
    fn with_run_finishes_on_success() {
        let dir = TempDir::new().unwrap();
        let (tracker, store) = tracker(&dir);
        let experiment = tracker.set_experiment("exp").unwrap();

        let (value, info) = tracker
            .with_run(&experiment, None, |run| {
                run.log_param("model_type", "RandomForestRegressor")?;
                run.log_metric("mse", 1.25)?;
                Ok(42)
            })
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(info.status, RunStatus::Finished);
        assert_eq!(store.run_status(&info).unwrap(), RunStatus::Finished);
    }

    #[test]
    fn with_run_fails_on_error() {
        let dir = TempDir::new().unwrap();
        let (tracker, store) = tracker(&dir);
        let experiment = tracker.set_experiment("exp").unwrap();

        let mut seen = None;
        let result: Result<((), RunInfo)> = tracker.with_run(&experiment, Some("broken"), |run| {
            seen = Some(run.info().clone());
            Err(PipelineError::Tracking("boom".into()))
        });

        assert!(result.is_err());
        let info = seen.unwrap();
        assert_eq!(store.run_status(&info).unwrap(), RunStatus::Failed);
    }

    #[test]
    fn dropped_run_is_marked_failed() {
        let dir = TempDir::new().unwrap();
        let (tracker, store) = tracker(&dir);
        let experiment = tracker.set_experiment("exp").unwrap();

        let info = {
            let run = tracker.start_run(&experiment, None).unwrap();
            run.info().clone()
        };
        assert_eq!(store.run_status(&info).unwrap(), RunStatus::Failed);
    }
}
