//! Пайплайн обучения: загрузка -> очистка -> кодирование -> разбиение -> обучение -> оценка -> логирование

use linfa::Dataset;

use crate::config::{PipelineConfig, MODEL_ARTIFACT_PATH, MODEL_TYPE};
use crate::data::DataLoader;
use crate::error::Result;
use crate::models::{Evaluator, RandomForestRegressor};
use crate::preprocessing::{CategoricalEncoder, DataCleaner, TrainTestSplitter};
use crate::tracking::{ExperimentTracker, InputExample, ModelArtifact, ModelSignature};
use crate::types::{ColumnSchema, PipelineOutcome, RegressionMetrics, Table, TrainTestSplit};

/// Данные после очистки, кодирования и разбиения
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub encoders: CategoricalEncoder,
    pub feature_schema: Vec<ColumnSchema>,
    pub split: TrainTestSplit,
    pub rows_clean: usize,
}

/// Обученная модель с метриками на тестовой выборке
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: RandomForestRegressor,
    pub metrics: RegressionMetrics,
    pub signature: ModelSignature,
    pub input_example: InputExample,
}

pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Полный запуск: данные из файла, трекер по URI из конфигурации
    pub fn run(&self) -> Result<PipelineOutcome> {
        let table = DataLoader::load(&self.config.data_path, self.config.csv_delimiter)?;
        let tracker = ExperimentTracker::new(
            &self.config.tracking_uri,
            self.config.tracking_token.as_deref(),
        )?;
        self.run_with(&table, &tracker)
    }

    pub fn run_with(&self, table: &Table, tracker: &ExperimentTracker) -> Result<PipelineOutcome> {
        let prepared = self.prepare(table)?;
        let trained = self.train(&prepared)?;
        let outcome = self.log_run(tracker, &prepared, &trained, table.height())?;

        tracing::info!(
            "Run {} finished: mse={:.4}, r2={:.4}",
            outcome.run_id,
            outcome.metrics.mse,
            outcome.metrics.r2
        );
        Ok(outcome)
    }

    /// Очистка, кодирование категориальных столбцов и разбиение train/test
    pub fn prepare(&self, table: &Table) -> Result<PreparedData> {
        let cleaned = DataCleaner::clean(table, &self.config.columns)?;
        let rows_clean = cleaned.height();

        let (encoders, frame) =
            CategoricalEncoder::fit_transform(&cleaned, std::slice::from_ref(&self.config.target))?;
        let (features, target, feature_schema) = frame.into_features_target(&self.config.target)?;

        let splitter = TrainTestSplitter::new(self.config.test_size, self.config.seed)?;
        let split = splitter.split(&features, &target)?;

        Ok(PreparedData {
            encoders,
            feature_schema,
            split,
            rows_clean,
        })
    }

    pub fn train(&self, prepared: &PreparedData) -> Result<TrainedModel> {
        let split = &prepared.split;
        let names: Vec<&str> = prepared.feature_schema.iter().map(|c| c.name.as_str()).collect();
        let dataset = Dataset::new(split.x_train.clone(), split.y_train.clone()).with_feature_names(names);

        tracing::info!(
            "Training {} with {} trees on {} rows",
            MODEL_TYPE,
            self.config.forest.n_estimators,
            split.x_train.nrows()
        );
        let model = RandomForestRegressor::fit(&self.config.forest, &dataset)?;

        let y_pred = model.try_predict(&split.x_test)?;
        let metrics = Evaluator::evaluate(&split.y_test, &y_pred)?;
        tracing::info!("Test metrics: mse={:.4}, r2={:.4}", metrics.mse, metrics.r2);

        let signature = ModelSignature::infer(&prepared.feature_schema)?;
        let input_example = InputExample::from_rows(
            &prepared.feature_schema,
            &split.x_train,
            self.config.input_example_rows,
        );

        Ok(TrainedModel {
            model,
            metrics,
            signature,
            input_example,
        })
    }

    fn log_run(
        &self,
        tracker: &ExperimentTracker,
        prepared: &PreparedData,
        trained: &TrainedModel,
        rows_loaded: usize,
    ) -> Result<PipelineOutcome> {
        let experiment = tracker.set_experiment(&self.config.experiment_name)?;

        let ((), info) = tracker.with_run(&experiment, self.config.run_name.as_deref(), |run| {
            run.log_param("model_type", MODEL_TYPE)?;
            run.log_param("test_size", self.config.test_size)?;
            run.log_metric("mse", trained.metrics.mse)?;
            run.log_metric("r2_score", trained.metrics.r2)?;

            let artifact = ModelArtifact::new(
                &trained.model,
                &prepared.encoders,
                trained.signature.clone(),
                trained.input_example.clone(),
            );
            run.log_model(MODEL_ARTIFACT_PATH, &artifact)
        })?;

        Ok(PipelineOutcome {
            run_id: info.run_id,
            experiment_id: info.experiment_id,
            artifact_uri: info.artifact_uri,
            metrics: trained.metrics,
            rows_loaded,
            rows_clean: prepared.rows_clean,
            train_size: prepared.split.train_indices.len(),
            test_size: prepared.split.test_indices.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FEATURE_COLUMNS, TARGET_COLUMN};
    use crate::error::PipelineError;
    use crate::tracking::{FileStore, RunStatus};
    use crate::types::{Cell, Column, ColumnType};
    use tempfile::TempDir;

    fn sample_table(n: usize) -> Table {
        let ages: Vec<f64> = (0..n).map(|i| 20.0 + (i % 50) as f64).collect();
        let sex: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "M" } else { "F" }).collect();
        let race: Vec<&str> = (0..n).map(|i| if i % 3 == 0 { "Branca" } else { "Parda" }).collect();
        let codes: Vec<f64> = (0..n).map(|i| 301010000.0 + (i % 4) as f64).collect();
        let kinds: Vec<f64> = (0..n).map(|i| (i % 3) as f64).collect();
        let qty: Vec<f64> = (0..n).map(|i| 1.0 + (i % 5) as f64).collect();
        let target: Vec<f64> = (0..n).map(|i| 10.0 * qty[i] + (i % 4) as f64).collect();

        Table::new(vec![
            Column::numbers(FEATURE_COLUMNS[0], &ages),
            Column::texts(FEATURE_COLUMNS[1], &sex),
            Column::texts(FEATURE_COLUMNS[2], &race),
            Column::numbers(FEATURE_COLUMNS[3], &codes),
            Column::numbers(FEATURE_COLUMNS[4], &kinds),
            Column::numbers(FEATURE_COLUMNS[5], &qty),
            Column::numbers(TARGET_COLUMN, &target),
        ])
        .unwrap()
    }

    fn small_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.forest.n_estimators = 10;
        config
    }

    #[test]
    fn prepare_encodes_and_splits() {
        let pipeline = TrainingPipeline::new(small_config()).unwrap();
        let prepared = pipeline.prepare(&sample_table(50)).unwrap();

        assert_eq!(prepared.rows_clean, 50);
        assert_eq!(prepared.split.x_train.nrows(), 40);
        assert_eq!(prepared.split.x_test.nrows(), 10);
        assert_eq!(prepared.feature_schema.len(), 6);
        assert_eq!(prepared.feature_schema[1].r#type, ColumnType::Long);
        assert_eq!(prepared.encoders.len(), 2);
    }

    #[test]
    fn prepare_drops_incomplete_rows() {
        let mut columns = sample_table(20).into_columns();
        columns[0].cells[3] = Cell::Empty;
        columns[6].cells[7] = Cell::Number(f64::NAN);
        let table = Table::new(columns).unwrap();

        let pipeline = TrainingPipeline::new(small_config()).unwrap();
        let prepared = pipeline.prepare(&table).unwrap();
        assert_eq!(prepared.rows_clean, 18);
    }

    #[test]
    fn missing_column_is_reported() {
        let columns: Vec<Column> = sample_table(10)
            .into_columns()
            .into_iter()
            .filter(|c| c.name != FEATURE_COLUMNS[2])
            .collect();
        let table = Table::new(columns).unwrap();

        let pipeline = TrainingPipeline::new(small_config()).unwrap();
        let err = pipeline.prepare(&table).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(name) if name == FEATURE_COLUMNS[2]));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = small_config();
        config.test_size = 1.5;
        assert!(matches!(
            TrainingPipeline::new(config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn run_logs_params_metrics_and_model() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("mlruns")).unwrap();
        let tracker = ExperimentTracker::with_store(Box::new(store.clone()), "mlruns");

        let pipeline = TrainingPipeline::new(small_config()).unwrap();
        let outcome = pipeline.run_with(&sample_table(60), &tracker).unwrap();

        assert_eq!(outcome.rows_loaded, 60);
        assert_eq!(outcome.train_size, 48);
        assert_eq!(outcome.test_size, 12);
        assert!(outcome.metrics.mse.is_finite());
        assert!(outcome.metrics.r2.is_finite());

        let info = crate::tracking::RunInfo {
            run_id: outcome.run_id.clone(),
            experiment_id: outcome.experiment_id.clone(),
            run_name: String::new(),
            artifact_uri: outcome.artifact_uri.clone(),
            start_time: 0,
            status: RunStatus::Finished,
        };
        let run_dir = store.run_dir(&info);
        assert_eq!(store.run_status(&info).unwrap(), RunStatus::Finished);

        let model_type = std::fs::read_to_string(run_dir.join("params/model_type")).unwrap();
        assert_eq!(model_type, MODEL_TYPE);
        let test_size = std::fs::read_to_string(run_dir.join("params/test_size")).unwrap();
        assert_eq!(test_size, "0.2");
        assert!(run_dir.join("metrics/mse").exists());
        assert!(run_dir.join("metrics/r2_score").exists());
        assert!(run_dir.join("artifacts/model/MLmodel").exists());
    }
}
