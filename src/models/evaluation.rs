//! Метрики качества регрессии

use ndarray::Array1;

use crate::error::{PipelineError, Result};
use crate::types::RegressionMetrics;

pub struct Evaluator;

impl Evaluator {
    pub fn evaluate(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<RegressionMetrics> {
        Ok(RegressionMetrics {
            mse: Self::mean_squared_error(y_true, y_pred)?,
            r2: Self::r2_score(y_true, y_pred)?,
        })
    }

    pub fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        check_lengths(y_true, y_pred)?;
        Ok((y_true - y_pred).mapv(|e| e * e).mean().unwrap_or(0.0))
    }

    /// Коэффициент детерминации.
    /// При постоянной истинной цели: 1.0 для точного предсказания, иначе 0.0.
    pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        check_lengths(y_true, y_pred)?;

        let mean = y_true.mean().unwrap_or(0.0);
        let ss_res: f64 = (y_true - y_pred).mapv(|e| e * e).sum();
        let ss_tot: f64 = y_true.mapv(|v| (v - mean) * (v - mean)).sum();

        if ss_tot == 0.0 {
            return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
        }
        Ok(1.0 - ss_res / ss_tot)
    }
}

fn check_lengths(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.is_empty() {
        return Err(PipelineError::Dataset("cannot score an empty test set".to_string()));
    }
    if y_true.len() != y_pred.len() {
        return Err(PipelineError::Dataset(format!(
            "{} true values but {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn perfect_predictions() {
        let y = array![1.0, 2.0, 3.0];
        let metrics = Evaluator::evaluate(&y, &y).unwrap();
        assert_eq!(metrics.mse, 0.0);
        assert_eq!(metrics.r2, 1.0);
    }

    #[test]
    fn known_values() {
        let y_true = array![3.0, -0.5, 2.0, 7.0];
        let y_pred = array![2.5, 0.0, 2.0, 8.0];
        assert_abs_diff_eq!(Evaluator::mean_squared_error(&y_true, &y_pred).unwrap(), 0.375);
        assert_abs_diff_eq!(
            Evaluator::r2_score(&y_true, &y_pred).unwrap(),
            0.948_608_137_044_967_9,
            epsilon = 1e-12
        );
    }

    #[test]
    fn r2_is_at_most_one_and_can_go_negative() {
        let y_true = array![1.0, 2.0, 3.0];
        let y_pred = array![3.0, 2.0, 1.0];
        let r2 = Evaluator::r2_score(&y_true, &y_pred).unwrap();
        assert!(r2 <= 1.0);
        assert_abs_diff_eq!(r2, -3.0);
    }

    #[test]
    fn constant_target() {
        let y_true = array![5.0, 5.0];
        assert_eq!(Evaluator::r2_score(&y_true, &array![5.0, 5.0]).unwrap(), 1.0);
        assert_eq!(Evaluator::r2_score(&y_true, &array![4.0, 5.0]).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_or_empty_inputs() {
        assert!(Evaluator::evaluate(&array![1.0], &array![1.0, 2.0]).is_err());
        assert!(Evaluator::evaluate(&Array1::zeros(0), &Array1::zeros(0)).is_err());
    }
}
