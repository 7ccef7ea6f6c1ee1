//! Трекинг экспериментов: эксперименты, запуски, параметры, метрики, артефакты

pub mod file_store;
pub mod model_artifact;
pub mod rest_store;
pub mod run;
pub mod store;

pub use file_store::FileStore;
pub use model_artifact::{InputExample, LoadedModel, ModelArtifact, ModelSignature};
pub use rest_store::RestStore;
pub use run::{ActiveRun, ExperimentTracker};
pub use store::{open_store, Experiment, Metric, RunInfo, RunStatus, TrackingStore};

/// Текущее время в миллисекундах Unix
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
