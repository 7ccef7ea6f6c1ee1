/// Модуль предобработки данных

pub mod cleaning;
pub mod encoding;
pub mod split;

pub use cleaning::DataCleaner;
pub use encoding::{CategoricalEncoder, LabelEncoder};
pub use split::TrainTestSplitter;
