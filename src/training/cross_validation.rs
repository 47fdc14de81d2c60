//! Cross-validation fold generation

use crate::error::{PipelineError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Cross-validation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation, contiguous folds unless shuffled
    KFold { n_splits: usize, shuffle: bool },
    /// Shuffled K-Fold repeated with a different seed each time
    RepeatedKFold { n_splits: usize, n_repeats: usize },
    /// Leave-one-out cross-validation
    LeaveOneOut,
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::KFold {
            n_splits: 3,
            shuffle: false,
        }
    }
}

impl CVStrategy {
    /// Smallest dataset the strategy can split
    pub fn min_samples(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::RepeatedKFold { n_splits, .. } => {
                *n_splits
            }
            CVStrategy::LeaveOneOut => 2,
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone, Default)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn strategy(&self) -> &CVStrategy {
        &self.strategy
    }

    /// Generate train/test splits over `n_samples` rows
    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => {
                k_fold_split(n_samples, *n_splits, *shuffle, self.random_state)
            }
            CVStrategy::RepeatedKFold { n_splits, n_repeats } => {
                self.repeated_k_fold_split(n_samples, *n_splits, *n_repeats)
            }
            CVStrategy::LeaveOneOut => leave_one_out_split(n_samples),
        }
    }

    fn repeated_k_fold_split(
        &self,
        n_samples: usize,
        n_splits: usize,
        n_repeats: usize,
    ) -> Result<Vec<CVSplit>> {
        if n_repeats == 0 {
            return Err(PipelineError::invalid_param("n_repeats", 0, "must be positive"));
        }

        let mut all_splits = Vec::with_capacity(n_splits * n_repeats);
        for repeat in 0..n_repeats {
            let seed = self.random_state.map(|s| s.wrapping_add(repeat as u64));
            let mut splits = k_fold_split(n_samples, n_splits, true, seed)?;

            for split in &mut splits {
                split.fold_idx += repeat * n_splits;
            }
            all_splits.extend(splits);
        }

        Ok(all_splits)
    }
}

fn k_fold_split(
    n_samples: usize,
    n_splits: usize,
    shuffle: bool,
    random_state: Option<u64>,
) -> Result<Vec<CVSplit>> {
    if n_splits < 2 {
        return Err(PipelineError::invalid_param(
            "n_splits",
            n_splits,
            "must be at least 2",
        ));
    }
    if n_samples < n_splits {
        return Err(PipelineError::invalid_param(
            "n_splits",
            n_splits,
            format!("cannot exceed the number of samples ({})", n_samples),
        ));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    if shuffle {
        let mut rng = match random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        indices.shuffle(&mut rng);
    }

    // The first n_samples % n_splits folds take one extra sample
    let base = n_samples / n_splits;
    let remainder = n_samples % n_splits;

    let mut splits = Vec::with_capacity(n_splits);
    let mut current = 0;
    for fold_idx in 0..n_splits {
        let fold_size = if fold_idx < remainder { base + 1 } else { base };
        let test_indices = indices[current..current + fold_size].to_vec();
        let train_indices: Vec<usize> = indices[..current]
            .iter()
            .chain(indices[current + fold_size..].iter())
            .copied()
            .collect();

        splits.push(CVSplit {
            train_indices,
            test_indices,
            fold_idx,
        });
        current += fold_size;
    }

    Ok(splits)
}

fn leave_one_out_split(n_samples: usize) -> Result<Vec<CVSplit>> {
    if n_samples < 2 {
        return Err(PipelineError::invalid_param(
            "n_samples",
            n_samples,
            "leave-one-out needs at least 2 samples",
        ));
    }

    Ok((0..n_samples)
        .map(|i| CVSplit {
            train_indices: (0..n_samples).filter(|&j| j != i).collect(),
            test_indices: vec![i],
            fold_idx: i,
        })
        .collect())
}

/// Cross-validation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let denom = n_folds.max(1) as f64;
        let mean_score = scores.iter().sum::<f64>() / denom;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / denom;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(100).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        // All indices should be covered exactly once in test sets
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_default_is_three_contiguous_folds() {
        let splits = CrossValidator::default().split(10).unwrap();
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[0].test_indices, vec![0, 1, 2, 3]);
        assert_eq!(splits[1].test_indices, vec![4, 5, 6]);
        assert_eq!(splits[2].test_indices, vec![7, 8, 9]);
    }

    #[test]
    fn test_shuffled_k_fold_is_seeded() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 4, shuffle: true })
            .with_random_state(9);
        assert_eq!(cv.split(40).unwrap(), cv.split(40).unwrap());
    }

    #[test]
    fn test_invalid_fold_counts() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 1, shuffle: false });
        assert!(cv.split(10).is_err());

        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        assert!(cv.split(4).is_err());
    }

    #[test]
    fn test_leave_one_out() {
        let cv = CrossValidator::new(CVStrategy::LeaveOneOut);
        let splits = cv.split(10).unwrap();

        assert_eq!(splits.len(), 10);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 1);
            assert_eq!(split.train_indices.len(), 9);
        }
    }

    #[test]
    fn test_repeated_k_fold() {
        let cv = CrossValidator::new(CVStrategy::RepeatedKFold { n_splits: 5, n_repeats: 3 })
            .with_random_state(42);
        let splits = cv.split(100).unwrap();

        assert_eq!(splits.len(), 15);
        assert_eq!(splits.last().map(|s| s.fold_idx), Some(14));
    }

    #[test]
    fn test_cv_results() {
        let results = CVResults::from_scores(vec![0.5, 0.7, 0.9]);
        assert!((results.mean_score - 0.7).abs() < 1e-12);
        assert!(results.std_score > 0.0);
        assert_eq!(results.n_folds, 3);
    }
}
