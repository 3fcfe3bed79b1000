//! Deterministic synthetic corpus for offline runs and tests.
//!
//! Every class gets its own mean colour per channel; images are that colour
//! plus uniform noise, so a small network can separate them.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::dataset::corpus::{CorpusSource, ImageCorpus, ImageShape, UpstreamCorpus};
use crate::model::config::MAX_CLASSES;
use crate::utils::error::{CifarError, Result};

const NOISE: u8 = 40;

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub shape: ImageShape,
    pub num_classes: usize,
    pub train_per_class: usize,
    pub test_per_class: usize,
    pub seed: u64,
}

impl SyntheticSource {
    pub fn new(shape: ImageShape, num_classes: usize, train_per_class: usize, test_per_class: usize) -> Self {
        Self {
            shape,
            num_classes,
            train_per_class,
            test_per_class,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn class_mean(&self, class: usize, channel: usize) -> u8 {
        // Spread classes over the value range, shifted per channel
        let step = 200 / self.num_classes.max(1);
        (((class * step) + channel * 67) % 200 + 20) as u8
    }

    fn generate(&self, per_class: usize, rng: &mut ChaCha8Rng) -> Result<ImageCorpus> {
        let plane = self.shape.height * self.shape.width;
        let mut pixels = Vec::with_capacity(per_class * self.num_classes * self.shape.num_values());
        let mut labels = Vec::with_capacity(per_class * self.num_classes);

        for class in 0..self.num_classes {
            for _ in 0..per_class {
                for channel in 0..self.shape.channels {
                    let mean = self.class_mean(class, channel);
                    for _ in 0..plane {
                        let noise = rng.gen_range(0..=NOISE);
                        pixels.push(mean.saturating_add(noise));
                    }
                }
                labels.push(class as u8);
            }
        }

        ImageCorpus::new(self.shape, pixels, labels)
    }
}

impl CorpusSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self) -> Result<UpstreamCorpus> {
        if self.num_classes > MAX_CLASSES {
            return Err(CifarError::Config(format!(
                "synthetic corpus supports at most {} classes, got {}",
                MAX_CLASSES, self.num_classes
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let train = self.generate(self.train_per_class, &mut rng)?;
        let test = self.generate(self.test_per_class, &mut rng)?;

        tracing::debug!(
            "Generated synthetic corpus: {} train + {} test images of {}",
            train.len(),
            test.len(),
            self.shape
        );
        Ok(UpstreamCorpus { train, test })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_sizes_and_labels() {
        let source = SyntheticSource::new(ImageShape::new(3, 8, 8), 10, 8, 2);
        let corpus = source.fetch().unwrap();

        assert_eq!(corpus.train.len(), 80);
        assert_eq!(corpus.test.len(), 20);
        assert_eq!(corpus.total_len(), 100);
        assert_eq!(corpus.train.class_distribution(10), vec![8; 10]);
    }

    #[test]
    fn test_synthetic_is_deterministic() {
        let source = SyntheticSource::new(ImageShape::new(1, 4, 4), 3, 2, 1).with_seed(9);
        let a = source.fetch().unwrap();
        let b = source.fetch().unwrap();
        assert_eq!(a.train, b.train);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn test_rejects_classes_beyond_label_range() {
        let source = SyntheticSource::new(ImageShape::new(1, 2, 2), 300, 1, 0);
        assert!(matches!(source.fetch(), Err(CifarError::Config(_))));
    }
}
