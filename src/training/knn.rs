//! K-Nearest Neighbors regression

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::models::{check_fit_input, check_n_features, Regressor};
use super::params::{str_param, unknown_param, usize_param, ParamSet, ParamValue};
use crate::error::{PipelineError, Result};

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Manhattan => "manhattan",
        }
    }

    fn distance(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(ai, bi)| {
                    let d = ai - bi;
                    d * d
                })
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Manhattan => {
                a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum()
            }
        }
    }
}

/// Weight scheme for neighbor contributions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightScheme {
    Uniform,
    /// Inverse distance; exact matches take all the weight
    Distance,
}

impl WeightScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightScheme::Uniform => "uniform",
            WeightScheme::Distance => "distance",
        }
    }
}

/// KNN configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNNConfig {
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// K-Nearest Neighbors Regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNNRegressor {
    pub config: KNNConfig,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl Default for KNNRegressor {
    fn default() -> Self {
        Self::new(KNNConfig::default())
    }
}

impl KNNRegressor {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: None,
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }
}

impl Regressor for KNNRegressor {
    /// Stores the training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.config.n_neighbors == 0 {
            return Err(PipelineError::invalid_param("n_neighbors", 0, "must be positive"));
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    /// Parallelized over query rows
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(xt), Some(yt)) => (xt, yt),
            _ => return Err(PipelineError::ModelNotFitted),
        };
        check_n_features(x_train.ncols(), x)?;

        // Folds smaller than k fall back to every stored sample
        let k = self.config.n_neighbors.min(x_train.nrows());
        let metric = self.config.metric;
        let weights = self.config.weights;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, y_train, k, metric);
                weighted_mean(&neighbors, weights)
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params {
            match name.as_str() {
                "n_neighbors" => {
                    let k = usize_param(name, value)?;
                    if k == 0 {
                        return Err(PipelineError::invalid_param(
                            name.as_str(),
                            value,
                            "must be positive",
                        ));
                    }
                    self.config.n_neighbors = k;
                }
                "weights" => {
                    self.config.weights = match str_param(name, value)? {
                        "uniform" => WeightScheme::Uniform,
                        "distance" => WeightScheme::Distance,
                        _ => {
                            return Err(PipelineError::invalid_param(
                                name.as_str(),
                                value,
                                "expected uniform or distance",
                            ))
                        }
                    }
                }
                "metric" => {
                    self.config.metric = match str_param(name, value)? {
                        "euclidean" => DistanceMetric::Euclidean,
                        "manhattan" => DistanceMetric::Manhattan,
                        _ => {
                            return Err(PipelineError::invalid_param(
                                name.as_str(),
                                value,
                                "expected euclidean or manhattan",
                            ))
                        }
                    }
                }
                _ => return Err(unknown_param("KNNRegressor", name, value)),
            }
        }
        Ok(())
    }

    fn get_params(&self) -> ParamSet {
        let mut params = ParamSet::new();
        params.insert("n_neighbors".to_string(), ParamValue::from(self.config.n_neighbors));
        params.insert("weights".to_string(), ParamValue::from(self.config.weights.as_str()));
        params.insert("metric".to_string(), ParamValue::from(self.config.metric.as_str()));
        params
    }

    fn is_fitted(&self) -> bool {
        self.x_train.is_some()
    }
}

/// Max-heap entry keyed by distance, then by training row so ties resolve to earlier rows
struct Neighbor {
    dist: f64,
    row: usize,
    target: f64,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.row.cmp(&other.row))
    }
}

/// Keep the k smallest distances with a bounded max-heap
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (row, sample) in x_train.rows().into_iter().enumerate() {
        let candidate = Neighbor {
            dist: metric.distance(point, sample),
            row,
            target: y_train[row],
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().map_or(false, |top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }

    heap.into_iter().map(|n| (n.dist, n.target)).collect()
}

fn weighted_mean(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    let uniform = || neighbors.iter().map(|(_, y)| y).sum::<f64>() / neighbors.len() as f64;

    match weights {
        WeightScheme::Uniform => uniform(),
        WeightScheme::Distance => {
            let exact: Vec<f64> = neighbors
                .iter()
                .filter(|(d, _)| *d == 0.0)
                .map(|(_, y)| *y)
                .collect();
            if !exact.is_empty() {
                return exact.iter().sum::<f64>() / exact.len() as f64;
            }

            let (weighted_sum, weight_total) = neighbors
                .iter()
                .fold((0.0, 0.0), |(s, t), &(d, y)| (s + y / d, t + 1.0 / d));
            if weight_total > 0.0 {
                weighted_sum / weight_total
            } else {
                uniform()
            }
        }
    }
}
