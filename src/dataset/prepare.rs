//! Dataset preparation
//!
//! `CifarData` fetches the upstream corpus, pools and shuffles it, splits
//! it into train / validation / test and then hands out read-only views.
//! Nothing mutates the partitions after construction.

use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::burn_dataset::NormalizedPartition;
use crate::dataset::class_name;
use crate::dataset::corpus::{CorpusSource, ImageCorpus, ImageShape, UpstreamCorpus};
use crate::dataset::split::{shuffle_aligned, split_indices, SplitConfig, SplitStats};
use crate::utils::error::{CifarError, Result};
use crate::NUM_CLASSES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionKind {
    Train,
    Validation,
    Test,
}

impl std::fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PartitionKind::Train => "train",
            PartitionKind::Validation => "validation",
            PartitionKind::Test => "test",
        };
        write!(f, "{}", name)
    }
}

/// One split partition
#[derive(Debug, Clone)]
pub struct Partition {
    pub kind: PartitionKind,
    pub corpus: ImageCorpus,
    /// Positions the records occupied in the shuffled pooled corpus
    pub indices: Vec<usize>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }
}

/// What the model builder is allowed to see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub input_shape: ImageShape,
    pub num_classes: usize,
}

/// A single image drawn for one class
#[derive(Debug, Clone)]
pub struct ClassSample {
    pub class: usize,
    /// Position within the validation partition
    pub index: usize,
    pub shape: ImageShape,
    /// Channel-planar raw values
    pub pixels: Vec<u8>,
}

/// Prepared CIFAR-10 partitions
#[derive(Debug, Clone)]
pub struct CifarData {
    train: Arc<Partition>,
    validation: Arc<Partition>,
    test: Arc<Partition>,
    num_classes: usize,
}

impl CifarData {
    /// Fetch the corpus from `source`, then shuffle and split it.
    pub fn load(source: &dyn CorpusSource, split: &SplitConfig, rng: &mut ChaCha8Rng) -> Result<Self> {
        tracing::info!("Fetching corpus from source '{}'", source.name());
        let upstream = source.fetch()?;
        tracing::debug!("Fetched {} upstream images", upstream.total_len());
        Self::from_upstream(upstream, split, rng)
    }

    /// Pool both upstream partitions, shuffle them aligned and split.
    pub fn from_upstream(upstream: UpstreamCorpus, split: &SplitConfig, rng: &mut ChaCha8Rng) -> Result<Self> {
        split.validate()?;

        let UpstreamCorpus { mut train, test } = upstream;
        train.append(test)?;
        let pooled = train;
        if pooled.is_empty() {
            return Err(CifarError::DataUnavailable("source returned no images".to_string()));
        }

        let shuffled = shuffle_aligned(&pooled, rng)?;
        let indices = split_indices(shuffled.len(), split, rng);

        let make = |kind: PartitionKind, indices: Vec<usize>| -> Result<Arc<Partition>> {
            Ok(Arc::new(Partition {
                kind,
                corpus: shuffled.select(&indices)?,
                indices,
            }))
        };

        let data = Self {
            train: make(PartitionKind::Train, indices.train)?,
            validation: make(PartitionKind::Validation, indices.validation)?,
            test: make(PartitionKind::Test, indices.test)?,
            num_classes: NUM_CLASSES,
        };

        tracing::info!(
            "Split {} images: {} train / {} validation / {} test",
            shuffled.len(),
            data.train.len(),
            data.validation.len(),
            data.test.len()
        );
        Ok(data)
    }

    pub fn metadata(&self) -> DatasetMetadata {
        DatasetMetadata {
            input_shape: self.train.corpus.shape(),
            num_classes: self.num_classes,
        }
    }

    pub fn raw(&self, kind: PartitionKind) -> &Partition {
        match kind {
            PartitionKind::Train => &self.train,
            PartitionKind::Validation => &self.validation,
            PartitionKind::Test => &self.test,
        }
    }

    fn shared(&self, kind: PartitionKind) -> Arc<Partition> {
        match kind {
            PartitionKind::Train => self.train.clone(),
            PartitionKind::Validation => self.validation.clone(),
            PartitionKind::Test => self.test.clone(),
        }
    }

    /// Normalized view of a partition: pixels in `[0, 1]`, one-hot labels.
    pub fn normalized(&self, kind: PartitionKind) -> NormalizedPartition {
        NormalizedPartition::new(self.shared(kind), self.num_classes)
    }

    /// One random validation image of `class`.
    pub fn sample_class(&self, class: usize, rng: &mut ChaCha8Rng) -> Result<ClassSample> {
        let corpus = &self.validation.corpus;
        let members: Vec<usize> = corpus
            .labels()
            .iter()
            .enumerate()
            .filter(|(_, &label)| label as usize == class)
            .map(|(i, _)| i)
            .collect();

        if members.is_empty() {
            return Err(CifarError::EmptyClass {
                class,
                name: class_name(class).to_string(),
            });
        }

        let index = members[rng.gen_range(0..members.len())];
        let pixels = corpus
            .image(index)
            .ok_or_else(|| CifarError::InvalidInput(format!("validation index {} out of range", index)))?
            .to_vec();

        Ok(ClassSample {
            class,
            index,
            shape: corpus.shape(),
            pixels,
        })
    }

    /// One random validation image per class, in class order.
    ///
    /// Classes without validation members yield `CifarError::EmptyClass`.
    pub fn sample_by_class(&self, rng: &mut ChaCha8Rng) -> Vec<Result<ClassSample>> {
        (0..self.num_classes)
            .map(|class| self.sample_class(class, rng))
            .collect()
    }

    pub fn stats(&self) -> SplitStats {
        SplitStats {
            total_images: self.train.len() + self.validation.len() + self.test.len(),
            train_size: self.train.len(),
            validation_size: self.validation.len(),
            test_size: self.test.len(),
            num_classes: self.num_classes,
            train_distribution: self.train.corpus.class_distribution(self.num_classes),
            validation_distribution: self.validation.corpus.class_distribution(self.num_classes),
            test_distribution: self.test.corpus.class_distribution(self.num_classes),
        }
    }
}
