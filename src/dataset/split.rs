//! Shuffling and proportional splitting
//!
//! The upstream train and test partitions are pooled, shuffled with one
//! permutation applied to images and labels together, and then cut into
//! train / validation / test index ranges of a second permutation:
//!
//! - **Train (75%)** - minibatch optimization
//! - **Validation (15%)** - per-epoch metrics for the training policies
//! - **Test (remainder, 10%)** - touched once, after training
//!
//! Counts are rounded half-to-even, so 60000 records split 45000 / 9000 / 6000.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::class_name;
use crate::dataset::corpus::ImageCorpus;
use crate::utils::error::{CifarError, Result};

/// Fractions of the pooled corpus per partition; test takes the remainder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub train_fraction: f64,
    pub validation_fraction: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.75,
            validation_fraction: 0.15,
        }
    }
}

impl SplitConfig {
    pub fn new(train_fraction: f64, validation_fraction: f64) -> Result<Self> {
        let config = Self {
            train_fraction,
            validation_fraction,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("Train", self.train_fraction),
            ("Validation", self.validation_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CifarError::Config(format!(
                    "{} fraction must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }

        if self.train_fraction + self.validation_fraction > 1.0 {
            return Err(CifarError::Config(
                "Train + validation fractions must not exceed 1.0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn test_fraction(&self) -> f64 {
        1.0 - self.train_fraction - self.validation_fraction
    }

    /// Partition sizes for a corpus of `n` records
    pub fn counts(&self, n: usize) -> SplitCounts {
        let train = ((n as f64 * self.train_fraction).round_ties_even() as usize).min(n);
        let validation =
            ((n as f64 * self.validation_fraction).round_ties_even() as usize).min(n - train);

        SplitCounts {
            train,
            validation,
            test: n - train - validation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCounts {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

/// Disjoint index ranges into the shuffled corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

/// Reorder every record of `corpus` with one random permutation.
pub fn shuffle_aligned(corpus: &ImageCorpus, rng: &mut ChaCha8Rng) -> Result<ImageCorpus> {
    let mut order: Vec<usize> = (0..corpus.len()).collect();
    order.shuffle(rng);
    corpus.select(&order)
}

/// Draw a fresh permutation of `0..n` and slice it by `config`.
pub fn split_indices(n: usize, config: &SplitConfig, rng: &mut ChaCha8Rng) -> SplitIndices {
    let counts = config.counts(n);

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);

    let test = order.split_off(counts.train + counts.validation);
    let validation = order.split_off(counts.train);

    SplitIndices {
        train: order,
        validation,
        test,
    }
}

/// Sizes and class balance of the three partitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitStats {
    pub total_images: usize,
    pub train_size: usize,
    pub validation_size: usize,
    pub test_size: usize,
    pub num_classes: usize,
    /// Per-class counts, indexed by class id
    pub train_distribution: Vec<usize>,
    pub validation_distribution: Vec<usize>,
    pub test_distribution: Vec<usize>,
}

impl std::fmt::Display for SplitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pct = |n: usize| {
            if self.total_images == 0 {
                0.0
            } else {
                100.0 * n as f64 / self.total_images as f64
            }
        };

        writeln!(f, "Dataset Split Statistics:")?;
        writeln!(f, "  Total images: {}", self.total_images)?;
        writeln!(f, "  Number of classes: {}", self.num_classes)?;
        writeln!(f, "  Train set: {} ({:.1}%)", self.train_size, pct(self.train_size))?;
        writeln!(f, "  Validation set: {} ({:.1}%)", self.validation_size, pct(self.validation_size))?;
        writeln!(f, "  Test set: {} ({:.1}%)", self.test_size, pct(self.test_size))?;
        writeln!(f)?;
        writeln!(f, "  {:<12} {:>8} {:>8} {:>8}", "class", "train", "val", "test")?;
        for class in 0..self.num_classes {
            let count = |d: &[usize]| d.get(class).copied().unwrap_or(0);
            writeln!(
                f,
                "  {:<12} {:>8} {:>8} {:>8}",
                class_name(class),
                count(&self.train_distribution),
                count(&self.validation_distribution),
                count(&self.test_distribution)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::corpus::ImageShape;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_default_counts_for_cifar() {
        let counts = SplitConfig::default().counts(60_000);
        assert_eq!(
            counts,
            SplitCounts {
                train: 45_000,
                validation: 9_000,
                test: 6_000
            }
        );
        assert!((SplitConfig::default().test_fraction() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_counts_round_half_to_even() {
        // 10 * 0.75 = 7.5 -> 8, 10 * 0.15 = 1.5 -> 2
        let counts = SplitConfig::default().counts(10);
        assert_eq!((counts.train, counts.validation, counts.test), (8, 2, 0));

        // 2 * 0.75 = 1.5 -> 2, leaving nothing for validation
        let counts = SplitConfig::default().counts(2);
        assert_eq!((counts.train, counts.validation, counts.test), (2, 0, 0));
    }

    #[test]
    fn test_counts_sum_to_n() {
        let config = SplitConfig::default();
        for n in [0, 1, 7, 99, 100, 1234] {
            let c = config.counts(n);
            assert_eq!(c.train + c.validation + c.test, n);
        }
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let split = split_indices(1000, &SplitConfig::default(), &mut rng);

        assert_eq!(split.train.len(), 750);
        assert_eq!(split.validation.len(), 150);
        assert_eq!(split.test.len(), 100);

        let all: HashSet<usize> = split
            .train
            .iter()
            .chain(&split.validation)
            .chain(&split.test)
            .copied()
            .collect();
        assert_eq!(all.len(), 1000);
        assert!(all.iter().all(|&i| i < 1000));
    }

    #[test]
    fn test_split_reproducibility() {
        let config = SplitConfig::default();
        let a = split_indices(500, &config, &mut ChaCha8Rng::seed_from_u64(7));
        let b = split_indices(500, &config, &mut ChaCha8Rng::seed_from_u64(7));
        let c = split_indices(500, &config, &mut ChaCha8Rng::seed_from_u64(8));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_shuffle_preserves_pairs() {
        let shape = ImageShape::new(1, 1, 2);
        // Image i holds [i, i], label i % 10
        let pixels: Vec<u8> = (0..50u8).flat_map(|i| [i, i]).collect();
        let labels: Vec<u8> = (0..50u8).map(|i| i % 10).collect();
        let corpus = ImageCorpus::new(shape, pixels, labels).unwrap();

        let shuffled = shuffle_aligned(&corpus, &mut ChaCha8Rng::seed_from_u64(7)).unwrap();
        assert_eq!(shuffled.len(), corpus.len());
        assert_ne!(shuffled, corpus);

        for i in 0..shuffled.len() {
            let image = shuffled.image(i).unwrap();
            assert_eq!(image[0], image[1]);
            assert_eq!(shuffled.label(i).unwrap(), image[0] % 10);
        }
    }

    #[test]
    fn test_invalid_fractions() {
        assert!(SplitConfig::new(0.9, 0.2).is_err());
        assert!(SplitConfig::new(-0.1, 0.2).is_err());
        assert!(SplitConfig::new(0.75, 1.5).is_err());
        assert!(SplitConfig::new(0.75, 0.15).is_ok());
    }
}
