/// Загрузка исходных данных

pub mod loader;

pub use loader::DataLoader;
