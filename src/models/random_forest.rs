//! Случайный лес для регрессии

use linfa::traits::{Predict, PredictInplace};
use linfa::Dataset;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix1, Ix2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Гиперпараметры леса. Значения по умолчанию: 100 деревьев без ограничения
/// глубины, все признаки в каждом узле, бутстрэп, seed 42.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// `None`: все признаки
    #[serde(default)]
    pub max_features: Option<usize>,
    #[serde(default = "default_bootstrap")]
    pub bootstrap: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_n_estimators() -> usize { 100 }
fn default_min_samples_split() -> usize { 2 }
fn default_min_samples_leaf() -> usize { 1 }
fn default_bootstrap() -> bool { true }
fn default_seed() -> u64 { 42 }

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            max_features: None,
            bootstrap: default_bootstrap(),
            seed: default_seed(),
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PipelineError::Config("n_estimators must be at least 1".to_string()));
        }
        if self.min_samples_split < 2 {
            return Err(PipelineError::Config("min_samples_split must be at least 2".to_string()));
        }
        if self.min_samples_leaf == 0 {
            return Err(PipelineError::Config("min_samples_leaf must be at least 1".to_string()));
        }
        if self.max_features == Some(0) {
            return Err(PipelineError::Config("max_features must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Узел дерева; дети хранятся индексами в плоском векторе
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: f64,
        samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn predict_row(&self, sample: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if sample[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

/// Построение одного CART-дерева (критерий: сумма квадратов ошибок)
struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    config: &'a ForestConfig,
    n_candidates: usize,
    rng: StdRng,
}

impl<'a> TreeBuilder<'a> {
    fn build(mut self, indices: Vec<usize>) -> RegressionTree {
        let mut nodes = Vec::new();
        self.build_node(indices, 0, &mut nodes);
        RegressionTree { nodes }
    }

    fn build_node(&mut self, indices: Vec<usize>, depth: usize, nodes: &mut Vec<TreeNode>) -> usize {
        let n = indices.len();
        let mean = indices.iter().map(|&i| self.y[i]).sum::<f64>() / n as f64;

        let node_idx = nodes.len();
        nodes.push(TreeNode::Leaf {
            value: mean,
            samples: n,
        });

        let depth_reached = self.config.max_depth.is_some_and(|d| depth >= d);
        let first = self.y[indices[0]];
        let pure = indices.iter().all(|&i| self.y[i] == first);
        if depth_reached
            || pure
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
        {
            return node_idx;
        }

        let Some(best) = self.best_split(&indices) else {
            return node_idx;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[[i, best.feature]] <= best.threshold);

        let left = self.build_node(left_indices, depth + 1, nodes);
        let right = self.build_node(right_indices, depth + 1, nodes);
        nodes[node_idx] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_idx
    }

    fn best_split(&mut self, indices: &[usize]) -> Option<SplitCandidate> {
        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf;
        let total: f64 = indices.iter().map(|&i| self.y[i]).sum();

        // Порядок признаков случайный: он же разрешает ничьи
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(&mut self.rng);
        features.truncate(self.n_candidates);

        let mut best: Option<SplitCandidate> = None;
        let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature in features {
            sorted.clear();
            sorted.extend(indices.iter().map(|&i| (self.x[[i, feature]], self.y[i])));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            if sorted[0].0 == sorted[n - 1].0 {
                continue;
            }

            // Минимизация SSE детей равносильна максимизации S_l²/n_l + S_r²/n_r
            let mut left_sum = 0.0;
            for pos in 0..n - 1 {
                left_sum += sorted[pos].1;
                let n_left = pos + 1;
                let n_right = n - n_left;
                if sorted[pos].0 == sorted[pos + 1].0 || n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let right_sum = total - left_sum;
                let score = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
                if best.as_ref().map_or(true, |b| score > b.score) {
                    let (lo, hi) = (sorted[pos].0, sorted[pos + 1].0);
                    let mut threshold = lo + (hi - lo) / 2.0;
                    if threshold >= hi || !threshold.is_finite() {
                        threshold = lo;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        score,
                    });
                }
            }
        }

        best
    }
}

/// Ансамбль регрессионных деревьев, предсказание есть среднее по деревьям
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    config: ForestConfig,
    n_features: usize,
    feature_names: Vec<String>,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    /// Обучение на `linfa::Dataset`. Детерминировано при фиксированном seed и порядке строк.
    pub fn fit(config: &ForestConfig, dataset: &Dataset<f64, f64, Ix1>) -> Result<Self> {
        config.validate()?;

        let x = dataset.records();
        let y = dataset.targets();
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples == 0 || n_features == 0 {
            return Err(PipelineError::Model("Empty dataset".to_string()));
        }
        if y.len() != n_samples {
            return Err(PipelineError::Model(format!(
                "{} samples but {} targets",
                n_samples,
                y.len()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(PipelineError::Model(
                "training data contains non-finite values".to_string(),
            ));
        }

        let n_candidates = config.max_features.unwrap_or(n_features).min(n_features);
        let mut master = StdRng::seed_from_u64(config.seed);
        let mut trees = Vec::with_capacity(config.n_estimators);

        for t in 0..config.n_estimators {
            let mut rng = StdRng::seed_from_u64(master.gen());
            let indices: Vec<usize> = if config.bootstrap {
                (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
            } else {
                (0..n_samples).collect()
            };

            let builder = TreeBuilder {
                x,
                y,
                config,
                n_candidates,
                rng,
            };
            let tree = builder.build(indices);
            tracing::debug!(
                "Tree {}/{}: {} nodes, depth {}",
                t + 1,
                config.n_estimators,
                tree.n_nodes(),
                tree.depth()
            );
            trees.push(tree);
        }

        tracing::info!(
            "Random forest trained: {} trees on {} samples x {} features",
            trees.len(),
            n_samples,
            n_features
        );

        let mut feature_names: Vec<String> =
            dataset.feature_names().iter().map(|n| n.to_string()).collect();
        if feature_names.len() != n_features {
            feature_names = (0..n_features).map(|i| format!("feature-{i}")).collect();
        }

        Ok(Self {
            config: config.clone(),
            n_features,
            feature_names,
            trees,
        })
    }

    /// Предсказание с проверкой размерности входа
    pub fn try_predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features() {
            return Err(PipelineError::Model(format!(
                "expected {} features, got {}",
                self.n_features(),
                x.ncols()
            )));
        }
        Ok(self.predict(x))
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

impl<D: Data<Elem = f64>> PredictInplace<ArrayBase<D, Ix2>, Array1<f64>> for RandomForestRegressor {
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<f64>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let n_trees = self.trees.len() as f64;
        for (row, target) in x.rows().into_iter().zip(y.iter_mut()) {
            *target = self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees;
        }
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<f64> {
        Array1::zeros(x.nrows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn step_dataset() -> Dataset<f64, f64, Ix1> {
        // y = 10, если x0 < 5, иначе 20; x1 это шум
        let x = Array2::from_shape_fn((40, 2), |(i, j)| {
            if j == 0 { (i % 10) as f64 } else { ((i * 7) % 13) as f64 }
        });
        let y = x.column(0).mapv(|v| if v < 5.0 { 10.0 } else { 20.0 });
        Dataset::new(x, y).with_feature_names(vec!["x0", "x1"])
    }

    #[test]
    fn learns_a_step_function() {
        let config = ForestConfig { n_estimators: 20, ..Default::default() };
        let model = RandomForestRegressor::fit(&config, &step_dataset()).unwrap();

        let preds = model.predict(&array![[1.0, 3.0], [8.0, 3.0]]);
        assert_abs_diff_eq!(preds[0], 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(preds[1], 20.0, epsilon = 1e-9);
        assert_eq!(model.feature_names(), ["x0", "x1"]);
    }

    #[test]
    fn same_seed_same_forest() {
        let dataset = step_dataset();
        let config = ForestConfig { n_estimators: 5, ..Default::default() };
        let a = RandomForestRegressor::fit(&config, &dataset).unwrap();
        let b = RandomForestRegressor::fit(&config, &dataset).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_unbootstrapped_tree_fits_training_data_exactly() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![1.0, 4.0, 9.0, 16.0];
        let config = ForestConfig { n_estimators: 1, bootstrap: false, ..Default::default() };
        let model = RandomForestRegressor::fit(&config, &Dataset::new(x.clone(), y.clone())).unwrap();

        assert_eq!(model.predict(&x), y);
        assert_eq!(model.trees()[0].n_leaves(), 4);
    }

    #[test]
    fn max_depth_zero_predicts_the_mean() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![1.0, 2.0, 3.0, 6.0];
        let config = ForestConfig {
            n_estimators: 1,
            bootstrap: false,
            max_depth: Some(0),
            ..Default::default()
        };
        let model = RandomForestRegressor::fit(&config, &Dataset::new(x, y)).unwrap();
        assert_abs_diff_eq!(model.predict(&array![[100.0]])[0], 3.0);
    }

    #[test]
    fn serialized_model_predicts_the_same() {
        let dataset = step_dataset();
        let config = ForestConfig { n_estimators: 3, ..Default::default() };
        let model = RandomForestRegressor::fit(&config, &dataset).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: RandomForestRegressor = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.predict(dataset.records()), model.predict(dataset.records()));
    }

    #[test]
    fn rejects_wrong_feature_count() {
        let config = ForestConfig { n_estimators: 2, ..Default::default() };
        let model = RandomForestRegressor::fit(&config, &step_dataset()).unwrap();
        assert!(model.try_predict(&array![[1.0, 2.0, 3.0]]).is_err());
    }

    #[test]
    fn rejects_empty_and_non_finite_data() {
        let config = ForestConfig::default();
        let empty = Dataset::new(Array2::<f64>::zeros((0, 2)), Array1::<f64>::zeros(0));
        assert!(RandomForestRegressor::fit(&config, &empty).is_err());

        let nan = Dataset::new(array![[1.0], [f64::NAN]], array![1.0, 2.0]);
        assert!(RandomForestRegressor::fit(&config, &nan).is_err());
    }
}
