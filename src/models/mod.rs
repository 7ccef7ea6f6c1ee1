/// ML модели

pub mod evaluation;
pub mod random_forest;

pub use evaluation::Evaluator;
pub use random_forest::{ForestConfig, RandomForestRegressor, RegressionTree};
