//! Feature scaling over numeric matrices

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Type of scaler to use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerType {
    /// (x - mean) / std with the population std; without centering only divides
    Standard { with_mean: bool },
    /// (x - min) / (max - min)
    MinMax,
    /// (x - median) / IQR
    Robust,
    /// x / max(|x|)
    MaxAbs,
    /// No scaling
    None,
}

impl Default for ScalerType {
    fn default() -> Self {
        ScalerType::Standard { with_mean: true }
    }
}

/// Column-wise scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    scaler_type: ScalerType,
    center: Array1<f64>,
    scale: Array1<f64>,
    is_fitted: bool,
}

impl Scaler {
    pub fn new(scaler_type: ScalerType) -> Self {
        Self {
            scaler_type,
            center: Array1::zeros(0),
            scale: Array1::zeros(0),
            is_fitted: false,
        }
    }

    pub fn scaler_type(&self) -> &ScalerType {
        &self.scaler_type
    }

    pub fn center(&self) -> &Array1<f64> {
        &self.center
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let n_cols = x.ncols();
        let mut center = Array1::zeros(n_cols);
        let mut scale = Array1::ones(n_cols);

        if x.nrows() > 0 {
            for (j, col) in x.axis_iter(Axis(1)).enumerate() {
                let (c, s) = self.column_params(col);
                center[j] = c;
                // Constant columns pass through unscaled
                scale[j] = if s == 0.0 || !s.is_finite() { 1.0 } else { s };
            }
        }

        self.center = center;
        self.scale = scale;
        self.is_fitted = true;
        Ok(self)
    }

    fn column_params(&self, col: ArrayView1<f64>) -> (f64, f64) {
        match &self.scaler_type {
            ScalerType::Standard { with_mean } => {
                let mean = col.mean().unwrap_or(0.0);
                let std = col.std(0.0);
                (if *with_mean { mean } else { 0.0 }, std)
            }
            ScalerType::MinMax => {
                let min = col.fold(f64::INFINITY, |a, &b| a.min(b));
                let max = col.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                (min, max - min)
            }
            ScalerType::Robust => {
                let mut sorted = col.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let q1 = quantile(&sorted, 0.25);
                let q3 = quantile(&sorted, 0.75);
                (quantile(&sorted, 0.5), q3 - q1)
            }
            ScalerType::MaxAbs => (0.0, col.fold(0.0f64, |a, &b| a.max(b.abs()))),
            ScalerType::None => (0.0, 1.0),
        }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check(x)?;
        Ok((x - &self.center) / &self.scale)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check(x)?;
        Ok(x * &self.scale + &self.center)
    }

    fn check(&self, x: &Array2<f64>) -> Result<()> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }
        if x.ncols() != self.center.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} columns", self.center.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        Ok(())
    }
}

/// Linear-interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
