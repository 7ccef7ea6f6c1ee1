//! Детерминированное разбиение на обучающую и тестовую выборки

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{PipelineError, Result};
use crate::types::TrainTestSplit;

#[derive(Debug, Clone, Copy)]
pub struct TrainTestSplitter {
    test_size: f64,
    seed: u64,
}

impl TrainTestSplitter {
    pub fn new(test_size: f64, seed: u64) -> Result<Self> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(PipelineError::Config(format!(
                "test_size must be in (0, 1), got {test_size}"
            )));
        }
        Ok(Self { test_size, seed })
    }

    /// Индексы строк (train, test): случайная перестановка без повторений
    pub fn partition(&self, n_samples: usize) -> Result<(Vec<usize>, Vec<usize>)> {
        let n_test = (self.test_size * n_samples as f64).ceil() as usize;
        let n_train = n_samples.saturating_sub(n_test);
        if n_test == 0 || n_train == 0 {
            return Err(PipelineError::Dataset(format!(
                "cannot split {n_samples} rows with test_size {}: one side would be empty",
                self.test_size
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let train = indices.split_off(n_test);
        Ok((train, indices))
    }

    pub fn split(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<TrainTestSplit> {
        if x.nrows() != y.len() {
            return Err(PipelineError::Dataset(format!(
                "features have {} rows but target has {}",
                x.nrows(),
                y.len()
            )));
        }

        let (train_indices, test_indices) = self.partition(x.nrows())?;
        tracing::info!(
            "Split {} rows into {} train / {} test (seed {})",
            x.nrows(),
            train_indices.len(),
            test_indices.len(),
            self.seed
        );

        Ok(TrainTestSplit {
            x_train: x.select(Axis(0), &train_indices),
            x_test: x.select(Axis(0), &test_indices),
            y_train: y.select(Axis(0), &train_indices),
            y_test: y.select(Axis(0), &test_indices),
            train_indices,
            test_indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn hundred_rows_split_eighty_twenty() {
        let splitter = TrainTestSplitter::new(0.2, 42).unwrap();
        let (train, test) = splitter.partition(100).unwrap();

        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);

        let train_set: HashSet<usize> = train.iter().copied().collect();
        let test_set: HashSet<usize> = test.iter().copied().collect();
        assert!(train_set.is_disjoint(&test_set));
        assert_eq!(train_set.len() + test_set.len(), 100);
        assert!((0..100).all(|i| train_set.contains(&i) || test_set.contains(&i)));
    }

    #[test]
    fn same_seed_same_assignment() {
        let a = TrainTestSplitter::new(0.2, 42).unwrap().partition(250).unwrap();
        let b = TrainTestSplitter::new(0.2, 42).unwrap().partition(250).unwrap();
        let c = TrainTestSplitter::new(0.2, 7).unwrap().partition(250).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_side_rounds_up() {
        let (train, test) = TrainTestSplitter::new(0.2, 42).unwrap().partition(11).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);
    }

    #[test]
    fn split_keeps_rows_aligned() {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i * 10 + j) as f64);
        let y = Array1::from_shape_fn(10, |i| i as f64);
        let split = TrainTestSplitter::new(0.3, 1).unwrap().split(&x, &y).unwrap();

        for (row, &idx) in split.train_indices.iter().enumerate() {
            assert_eq!(split.x_train[[row, 0]], (idx * 10) as f64);
            assert_eq!(split.y_train[row], idx as f64);
        }
        assert_eq!(split.x_test.nrows(), 3);
    }

    #[test]
    fn rejects_degenerate_inputs() {
        assert!(TrainTestSplitter::new(0.0, 42).is_err());
        assert!(TrainTestSplitter::new(1.5, 42).is_err());
        assert!(TrainTestSplitter::new(0.2, 42).unwrap().partition(1).is_err());
    }
}
