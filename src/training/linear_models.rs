//! Linear model implementations

use super::models::{check_fit_input, check_n_features, Regressor};
use super::params::{
    bool_param, float_param, positive_float_param, unknown_param, usize_param, ParamSet, ParamValue,
};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Pivots at or below this fraction of the mean diagonal are treated as singular.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Cholesky factorization A = L Lᵀ; `None` when A is not numerically positive definite.
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let scale = a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= PIVOT_TOLERANCE * scale {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    Some(l)
}

/// Forward then backward substitution with a Cholesky factor
fn cholesky_substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    x
}

/// Solve the symmetric system (XᵀX) w = Xᵀy.
///
/// Rank-deficient systems (collinear columns such as a full one-hot block) get a small
/// diagonal jitter and are solved again.
fn solve_normal_equations(xtx: &Array2<f64>, xty: &Array1<f64>) -> Result<Array1<f64>> {
    let n = xtx.nrows();
    if n == 0 {
        return Ok(Array1::zeros(0));
    }

    if let Some(l) = cholesky(xtx) {
        return Ok(cholesky_substitute(&l, xty));
    }

    let mean_diag = xtx.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    let jitter = 1e-8 * mean_diag.max(1.0);
    let mut regularized = xtx.clone();
    for i in 0..n {
        regularized[[i, i]] += jitter;
    }

    cholesky(&regularized)
        .map(|l| cholesky_substitute(&l, xty))
        .ok_or_else(|| {
            PipelineError::ComputationError(
                "normal equations are singular even after regularization".to_string(),
            )
        })
}

/// Center columns and targets when an intercept is fitted
fn center(
    x: &Array2<f64>,
    y: &Array1<f64>,
    fit_intercept: bool,
) -> (Array2<f64>, Array1<f64>, Option<(Array1<f64>, f64)>) {
    if !fit_intercept {
        return (x.clone(), y.clone(), None);
    }
    let x_mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    let y_mean = y.mean().unwrap_or(0.0);
    let x_centered = x - &x_mean.view().insert_axis(Axis(0));
    let y_centered = y - y_mean;
    (x_centered, y_centered, Some((x_mean, y_mean)))
}

fn intercept_from(coefficients: &Array1<f64>, means: Option<(Array1<f64>, f64)>) -> f64 {
    match means {
        Some((x_mean, y_mean)) => y_mean - coefficients.dot(&x_mean),
        None => 0.0,
    }
}

fn linear_predict(
    coefficients: Option<&Array1<f64>>,
    intercept: f64,
    x: &Array2<f64>,
) -> Result<Array1<f64>> {
    let coefficients = coefficients.ok_or(PipelineError::ModelNotFitted)?;
    check_n_features(coefficients.len(), x)?;
    Ok(x.dot(coefficients) + intercept)
}

/// Ordinary least squares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Fitted coefficients (weights)
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept (bias)
    pub intercept: f64,
    /// Whether to fit intercept
    pub fit_intercept: bool,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            fit_intercept: true,
        }
    }

    /// Enable/disable fitting intercept
    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;

        let (x_c, y_c, means) = center(x, y, self.fit_intercept);
        let coefficients = solve_normal_equations(&x_c.t().dot(&x_c), &x_c.t().dot(&y_c))?;

        self.intercept = intercept_from(&coefficients, means);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        linear_predict(self.coefficients.as_ref(), self.intercept, x)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params {
            match name.as_str() {
                "fit_intercept" => self.fit_intercept = bool_param(name, value)?,
                _ => return Err(unknown_param("LinearRegression", name, value)),
            }
        }
        Ok(())
    }

    fn get_params(&self) -> ParamSet {
        let mut params = ParamSet::new();
        params.insert("fit_intercept".to_string(), ParamValue::Bool(self.fit_intercept));
        params
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}

/// Ridge Regression (L2-regularized linear regression)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    pub fit_intercept: bool,
    /// L2 regularization strength
    pub alpha: f64,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            fit_intercept: true,
            alpha,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

impl Regressor for RidgeRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;

        let (x_c, y_c, means) = center(x, y, self.fit_intercept);
        let mut xtx = x_c.t().dot(&x_c);
        for i in 0..x.ncols() {
            xtx[[i, i]] += self.alpha;
        }
        let coefficients = solve_normal_equations(&xtx, &x_c.t().dot(&y_c))?;

        self.intercept = intercept_from(&coefficients, means);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        linear_predict(self.coefficients.as_ref(), self.intercept, x)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params {
            match name.as_str() {
                "alpha" => {
                    let alpha = float_param(name, value)?;
                    if alpha < 0.0 {
                        return Err(PipelineError::invalid_param(
                            name.as_str(),
                            value,
                            "must be non-negative",
                        ));
                    }
                    self.alpha = alpha;
                }
                "fit_intercept" => self.fit_intercept = bool_param(name, value)?,
                _ => return Err(unknown_param("Ridge", name, value)),
            }
        }
        Ok(())
    }

    fn get_params(&self) -> ParamSet {
        let mut params = ParamSet::new();
        params.insert("alpha".to_string(), ParamValue::Float(self.alpha));
        params.insert("fit_intercept".to_string(), ParamValue::Bool(self.fit_intercept));
        params
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}

/// Lasso Regression (L1-regularized via coordinate descent)
///
/// Minimizes `1/(2n) ||y - Xw||² + alpha ||w||₁`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LassoRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    pub fit_intercept: bool,
    /// L1 regularization strength
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for LassoRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl LassoRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            fit_intercept: true,
            alpha,
            max_iter: 1000,
            tol: 1e-6,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Soft-threshold operator for L1 proximal step
    fn soft_threshold(val: f64, threshold: f64) -> f64 {
        if val > threshold {
            val - threshold
        } else if val < -threshold {
            val + threshold
        } else {
            0.0
        }
    }
}

impl Regressor for LassoRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        let (x_c, y_c, means) = center(x, y, self.fit_intercept);

        let col_norms: Vec<f64> = (0..n_features)
            .map(|j| x_c.column(j).mapv(|v| v * v).sum())
            .collect();

        let mut w = Array1::zeros(n_features);
        let lambda = self.alpha * n_samples as f64;
        let mut residual = y_c.clone();

        for _ in 0..self.max_iter {
            let mut max_change: f64 = 0.0;

            for j in 0..n_features {
                if col_norms[j] < 1e-15 {
                    w[j] = 0.0;
                    continue;
                }
                let old_wj = w[j];
                let rho = x_c.column(j).dot(&residual) + col_norms[j] * old_wj;
                w[j] = Self::soft_threshold(rho, lambda) / col_norms[j];

                let delta = old_wj - w[j];
                if delta != 0.0 {
                    residual.scaled_add(delta, &x_c.column(j));
                    max_change = max_change.max(delta.abs());
                }
            }

            if max_change < self.tol {
                break;
            }
        }

        self.intercept = intercept_from(&w, means);
        self.coefficients = Some(w);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        linear_predict(self.coefficients.as_ref(), self.intercept, x)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params {
            match name.as_str() {
                "alpha" => self.alpha = positive_float_param(name, value)?,
                "max_iter" => self.max_iter = usize_param(name, value)?,
                "tol" => self.tol = positive_float_param(name, value)?,
                "fit_intercept" => self.fit_intercept = bool_param(name, value)?,
                _ => return Err(unknown_param("Lasso", name, value)),
            }
        }
        Ok(())
    }

    fn get_params(&self) -> ParamSet {
        let mut params = ParamSet::new();
        params.insert("alpha".to_string(), ParamValue::Float(self.alpha));
        params.insert("fit_intercept".to_string(), ParamValue::Bool(self.fit_intercept));
        params.insert("max_iter".to_string(), ParamValue::from(self.max_iter));
        params.insert("tol".to_string(), ParamValue::Float(self.tol));
        params
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_regression_simple() {
        let x = array![
            [1.0, 1.0],
            [2.0, 1.0],
            [1.0, 2.0],
            [2.0, 2.0],
            [3.0, 1.0],
        ];
        // y = 2*x1 + 3*x2 + 1
        let y = array![6.0, 8.0, 9.0, 11.0, 10.0];

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        assert!(model.is_fitted());
        let coef = model.coefficients.as_ref().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-8);
        assert!((coef[1] - 3.0).abs() < 1e-8);
        assert!((model.intercept - 1.0).abs() < 1e-8);

        let r2 = model.score(&x, &y).unwrap();
        assert!(r2 > 0.99, "R² should be close to 1, got {}", r2);
    }

    #[test]
    fn test_linear_regression_collinear_columns() {
        // Second and third columns always sum to one, like a one-hot block
        let x = array![
            [1.0, 1.0, 0.0],
            [2.0, 0.0, 1.0],
            [3.0, 1.0, 0.0],
            [4.0, 0.0, 1.0],
            [5.0, 1.0, 0.0],
        ];
        let y = array![3.0, 6.0, 7.0, 10.0, 11.0];

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let r2 = model.score(&x, &y).unwrap();
        assert!(r2 > 0.99, "R² = {}", r2);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LinearRegression::new();
        let err = model.predict(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::ModelNotFitted));
    }

    #[test]
    fn test_shape_mismatch() {
        let mut model = LinearRegression::new();
        let err = model.fit(&array![[1.0], [2.0]], &array![1.0]).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeError { .. }));

        model.fit(&array![[1.0], [2.0]], &array![1.0, 2.0]).unwrap();
        assert!(model.predict(&array![[1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_ridge_regression() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let mut model = RidgeRegression::new(0.1);
        model.fit(&x, &y).unwrap();
        assert!(model.is_fitted());
        let r2 = model.score(&x, &y).unwrap();
        assert!(r2 > 0.95, "Ridge R² = {}", r2);
    }

    #[test]
    fn test_ridge_set_params() {
        let mut model = RidgeRegression::default();
        let mut params = ParamSet::new();
        params.insert("alpha".to_string(), ParamValue::Float(10.0));
        model.set_params(&params).unwrap();
        assert_eq!(model.alpha, 10.0);

        params.insert("max_depth".to_string(), ParamValue::Int(3));
        assert!(model.set_params(&params).is_err());
    }

    #[test]
    fn test_lasso_regression() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let mut model = LassoRegression::new(0.01);
        model.fit(&x, &y).unwrap();
        assert!(model.is_fitted());
        let preds = model.predict(&x).unwrap();
        assert_eq!(preds.len(), 4);
        let r2 = model.score(&x, &y).unwrap();
        assert!(r2 > 0.9, "Lasso R² = {}", r2);
    }

    #[test]
    fn test_lasso_large_alpha_zeroes_coefficients() {
        let x = array![[1.0, 5.0], [2.0, 3.0], [3.0, 8.0], [4.0, 1.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let mut model = LassoRegression::new(100.0);
        model.fit(&x, &y).unwrap();
        let coef = model.coefficients.as_ref().unwrap();
        assert!(coef.iter().all(|c| *c == 0.0));
        assert!((model.intercept - 2.5).abs() < 1e-12);
    }
}
