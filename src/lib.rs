//! A23 ML - обучение регрессора "Valor Aprovado do procedimento" с трекингом экспериментов

pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod tracking;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::TrainingPipeline;
pub use types::*;
