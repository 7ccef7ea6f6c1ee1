/// Типы данных для ML пайплайна

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Значение ячейки исходной таблицы
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Number(v) => v.is_nan(),
            Cell::Text(_) => false,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Cell::Text(_))
    }

    /// Метка для кодировщика (числа печатаются в кратчайшей форме: `1`, а не `1.0`)
    pub fn as_label(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Number(v) if v.is_nan() => None,
            Cell::Number(v) => Some(v.to_string()),
            Cell::Text(s) => Some(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    pub fn numbers(name: impl Into<String>, values: &[f64]) -> Self {
        Self::new(name, values.iter().map(|v| Cell::Number(*v)).collect())
    }

    pub fn texts(name: impl Into<String>, values: &[&str]) -> Self {
        Self::new(
            name,
            values.iter().map(|v| Cell::Text((*v).to_string())).collect(),
        )
    }

    pub fn is_categorical(&self) -> bool {
        self.cells.iter().any(Cell::is_text)
    }
}

/// Таблица в памяти: набор именованных столбцов одинаковой длины
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let height = first.cells.len();
            if let Some(bad) = columns.iter().find(|c| c.cells.len() != height) {
                return Err(PipelineError::Dataset(format!(
                    "column {:?} has {} rows, expected {}",
                    bad.name,
                    bad.cells.len(),
                    height
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn height(&self) -> usize {
        self.columns.first().map(|c| c.cells.len()).unwrap_or(0)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

/// Тип столбца в сигнатуре модели
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Long,
    Double,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub r#type: ColumnType,
}

/// Закодированная таблица: все значения числовые
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub schema: Vec<ColumnSchema>,
    pub values: Array2<f64>,
}

impl EncodedFrame {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Разделение на матрицу признаков и вектор целевой переменной
    pub fn into_features_target(
        self,
        target: &str,
    ) -> Result<(Array2<f64>, Array1<f64>, Vec<ColumnSchema>)> {
        let target_idx = self
            .schema
            .iter()
            .position(|c| c.name == target)
            .ok_or_else(|| PipelineError::MissingColumn(target.to_string()))?;

        let feature_idx: Vec<usize> = (0..self.schema.len()).filter(|&i| i != target_idx).collect();
        let features = self.values.select(ndarray::Axis(1), &feature_idx);
        let targets = self.values.column(target_idx).to_owned();
        let feature_schema = feature_idx
            .iter()
            .map(|&i| self.schema[i].clone())
            .collect();

        Ok((features, targets, feature_schema))
    }
}

#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub r2: f64,
}

/// Итог одного запуска пайплайна
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub experiment_id: String,
    pub artifact_uri: String,
    pub metrics: RegressionMetrics,
    pub rows_loaded: usize,
    pub rows_clean: usize,
    pub train_size: usize,
    pub test_size: usize,
}
