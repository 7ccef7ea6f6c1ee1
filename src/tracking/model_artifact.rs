//! Артефакт модели: MLmodel, сериализованный лес, кодировщики, пример входа

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::models::RandomForestRegressor;
use crate::preprocessing::CategoricalEncoder;
use crate::types::{ColumnSchema, ColumnType};

pub const MLMODEL_FILE: &str = "MLmodel";
pub const MODEL_FILE: &str = "model.json";
pub const ENCODERS_FILE: &str = "encoders.json";
pub const INPUT_EXAMPLE_FILE: &str = "input_example.json";
const FLAVOR: &str = "rust_random_forest";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub name: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: String,
    pub shape: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "tensor-spec")]
    pub tensor_spec: TensorSpec,
}

/// Сигнатура модели: столбцы на входе, тензор float64 на выходе
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
}

/// В MLmodel схемы хранятся JSON-строками
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureFields {
    pub inputs: String,
    pub outputs: String,
}

impl ModelSignature {
    /// Входы берутся из схемы признаков. Лес всегда предсказывает `f64`,
    /// поэтому выход фиксирован: тензор float64 формы `[-1]`.
    pub fn infer(schema: &[ColumnSchema]) -> Result<Self> {
        if schema.is_empty() {
            return Err(PipelineError::Model("cannot infer a signature without inputs".to_string()));
        }

        Ok(Self {
            inputs: schema
                .iter()
                .map(|c| InputSpec {
                    column_type: c.r#type,
                    name: c.name.clone(),
                    required: true,
                })
                .collect(),
            outputs: vec![OutputSpec {
                kind: "tensor".to_string(),
                tensor_spec: TensorSpec {
                    dtype: "float64".to_string(),
                    shape: vec![-1],
                },
            }],
        })
    }

    pub fn to_fields(&self) -> Result<SignatureFields> {
        Ok(SignatureFields {
            inputs: serde_json::to_string(&self.inputs)?,
            outputs: serde_json::to_string(&self.outputs)?,
        })
    }
}

/// Пример входа в ориентации split: `{"columns": [...], "data": [[...]]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputExample {
    pub columns: Vec<String>,
    pub data: Vec<Vec<serde_json::Value>>,
}

impl InputExample {
    /// Первые `n_rows` строк матрицы признаков; `long`-столбцы пишутся целыми
    pub fn from_rows(schema: &[ColumnSchema], x: &Array2<f64>, n_rows: usize) -> Self {
        let data = x
            .rows()
            .into_iter()
            .take(n_rows)
            .map(|row| {
                row.iter()
                    .zip(schema)
                    .map(|(&v, column)| match column.r#type {
                        ColumnType::Long => serde_json::Value::from(v as i64),
                        ColumnType::Double => serde_json::Value::from(v),
                    })
                    .collect()
            })
            .collect();

        Self {
            columns: schema.iter().map(|c| c.name.clone()).collect(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorSpec {
    pub model_type: String,
    pub model_file: String,
    pub encoders_file: String,
    pub crate_version: String,
    pub n_estimators: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputExampleInfo {
    pub artifact_path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub pandas_orient: String,
}

/// Содержимое файла `MLmodel`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlModelFile {
    pub artifact_path: String,
    pub flavors: BTreeMap<String, FlavorSpec>,
    pub model_uuid: String,
    pub run_id: String,
    pub utc_time_created: String,
    pub signature: SignatureFields,
    pub saved_input_example_info: InputExampleInfo,
}

pub struct ModelArtifact<'a> {
    model: &'a RandomForestRegressor,
    encoders: &'a CategoricalEncoder,
    signature: ModelSignature,
    input_example: InputExample,
}

/// Модель, восстановленная из каталога артефакта
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub mlmodel: MlModelFile,
    pub model: RandomForestRegressor,
    pub encoders: CategoricalEncoder,
    pub input_example: InputExample,
}

impl<'a> ModelArtifact<'a> {
    pub fn new(
        model: &'a RandomForestRegressor,
        encoders: &'a CategoricalEncoder,
        signature: ModelSignature,
        input_example: InputExample,
    ) -> Self {
        Self {
            model,
            encoders,
            signature,
            input_example,
        }
    }

    pub fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    /// Файлы артефакта: (путь относительно каталога артефактов запуска, содержимое)
    pub fn files(&self, artifact_path: &str, run_id: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut flavors = BTreeMap::new();
        flavors.insert(
            FLAVOR.to_string(),
            FlavorSpec {
                model_type: crate::config::MODEL_TYPE.to_string(),
                model_file: MODEL_FILE.to_string(),
                encoders_file: ENCODERS_FILE.to_string(),
                crate_version: env!("CARGO_PKG_VERSION").to_string(),
                n_estimators: self.model.trees().len(),
            },
        );

        let mlmodel = MlModelFile {
            artifact_path: artifact_path.to_string(),
            flavors,
            model_uuid: Uuid::new_v4().simple().to_string(),
            run_id: run_id.to_string(),
            utc_time_created: chrono::Utc::now()
                .format("%Y-%m-%d %H:%M:%S%.6f")
                .to_string(),
            signature: self.signature.to_fields()?,
            saved_input_example_info: InputExampleInfo {
                artifact_path: INPUT_EXAMPLE_FILE.to_string(),
                kind: "dataframe".to_string(),
                pandas_orient: "split".to_string(),
            },
        };

        let path = |file: &str| format!("{artifact_path}/{file}");
        Ok(vec![
            (path(MLMODEL_FILE), serde_yaml::to_string(&mlmodel)?.into_bytes()),
            (path(MODEL_FILE), serde_json::to_vec(self.model)?),
            (path(ENCODERS_FILE), serde_json::to_vec_pretty(self.encoders)?),
            (path(INPUT_EXAMPLE_FILE), serde_json::to_vec(&self.input_example)?),
        ])
    }

    pub fn load_from_dir(dir: &Path) -> Result<LoadedModel> {
        let read = |file: &str| {
            let path = dir.join(file);
            std::fs::read_to_string(&path).map_err(|e| PipelineError::io(path, e))
        };

        let mlmodel: MlModelFile = serde_yaml::from_str(&read(MLMODEL_FILE)?)?;
        let flavor = mlmodel.flavors.get(FLAVOR).ok_or_else(|| {
            PipelineError::Model(format!("{} has no {FLAVOR} flavor", dir.display()))
        })?;

        Ok(LoadedModel {
            model: serde_json::from_str(&read(&flavor.model_file)?)?,
            encoders: serde_json::from_str(&read(&flavor.encoders_file)?)?,
            input_example: serde_json::from_str(&read(&mlmodel.saved_input_example_info.artifact_path)?)?,
            mlmodel,
        })
    }
}
