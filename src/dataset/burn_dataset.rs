//! Burn integration for prepared partitions
//!
//! - `NormalizedPartition`: lazy `Dataset` view scaling pixels to `[0, 1]`
//!   and expanding labels to one-hot vectors
//! - `CifarBatcher`: stacks items into `[batch, channels, height, width]`

use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;

use crate::dataset::corpus::ImageShape;
use crate::dataset::prepare::Partition;

/// One normalized example
#[derive(Debug, Clone)]
pub struct CifarItem {
    /// Channel-planar values in `[0, 1]`
    pub image: Vec<f32>,
    /// One-hot target of width `num_classes`
    pub one_hot: Vec<f32>,
    pub label: usize,
}

/// Pixel scaling and one-hot expansion
pub fn normalize_pixels(pixels: &[u8]) -> Vec<f32> {
    pixels.iter().map(|&p| p as f32 / 255.0).collect()
}

pub fn one_hot(label: usize, num_classes: usize) -> Vec<f32> {
    let mut encoded = vec![0.0; num_classes];
    if let Some(slot) = encoded.get_mut(label) {
        *slot = 1.0;
    }
    encoded
}

/// Normalized view over a shared raw partition.
///
/// The raw records are never modified; items are produced on access.
#[derive(Debug, Clone)]
pub struct NormalizedPartition {
    raw: Arc<Partition>,
    num_classes: usize,
}

impl NormalizedPartition {
    pub fn new(raw: Arc<Partition>, num_classes: usize) -> Self {
        Self { raw, num_classes }
    }

    pub fn shape(&self) -> ImageShape {
        self.raw.corpus.shape()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn raw(&self) -> &Partition {
        &self.raw
    }
}

impl Dataset<CifarItem> for NormalizedPartition {
    fn get(&self, index: usize) -> Option<CifarItem> {
        let image = self.raw.corpus.image(index)?;
        let label = self.raw.corpus.label(index)? as usize;

        Some(CifarItem {
            image: normalize_pixels(image),
            one_hot: one_hot(label, self.num_classes),
            label,
        })
    }

    fn len(&self) -> usize {
        self.raw.corpus.len()
    }
}

/// A batch ready for the model
#[derive(Debug, Clone)]
pub struct CifarBatch<B: Backend> {
    /// `[batch, channels, height, width]`
    pub images: Tensor<B, 4>,
    /// One-hot targets, `[batch, num_classes]`
    pub targets: Tensor<B, 2>,
    /// Class ids, `[batch]`
    pub labels: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct CifarBatcher {
    shape: ImageShape,
    num_classes: usize,
}

impl CifarBatcher {
    pub fn new(shape: ImageShape, num_classes: usize) -> Self {
        Self { shape, num_classes }
    }
}

impl<B: Backend> Batcher<B, CifarItem, CifarBatch<B>> for CifarBatcher {
    fn batch(&self, items: Vec<CifarItem>, device: &B::Device) -> CifarBatch<B> {
        let batch_size = items.len();
        let [channels, height, width] = self.shape.dims();

        let mut images_data = Vec::with_capacity(batch_size * self.shape.num_values());
        let mut targets_data = Vec::with_capacity(batch_size * self.num_classes);
        let mut labels_data = Vec::with_capacity(batch_size);

        for item in items {
            images_data.extend(item.image);
            targets_data.extend(item.one_hot);
            labels_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );
        let targets = Tensor::<B, 2>::from_floats(
            TensorData::new(targets_data, [batch_size, self.num_classes]),
            device,
        );
        let labels =
            Tensor::<B, 1, Int>::from_data(TensorData::new(labels_data, [batch_size]), device);

        CifarBatch {
            images,
            targets,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::corpus::ImageCorpus;
    use crate::dataset::prepare::PartitionKind;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn partition() -> Arc<Partition> {
        let shape = ImageShape::new(3, 2, 2);
        let pixels: Vec<u8> = (0..24).map(|i| (i * 11) as u8).chain([255; 12]).collect();
        let corpus = ImageCorpus::new(shape, pixels, vec![0, 9, 4]).unwrap();
        Arc::new(Partition {
            kind: PartitionKind::Validation,
            corpus,
            indices: vec![10, 11, 12],
        })
    }

    #[test]
    fn test_normalized_values_in_unit_range() {
        let dataset = NormalizedPartition::new(partition(), 10);
        assert_eq!(dataset.len(), 3);

        for item in dataset.iter() {
            assert!(item.image.iter().all(|&v| (0.0..=1.0).contains(&v)));
            assert_eq!(item.one_hot.len(), 10);
            assert_eq!(item.one_hot.iter().sum::<f32>(), 1.0);
            assert_eq!(item.one_hot[item.label], 1.0);
        }

        let last = dataset.get(2).unwrap();
        assert!(last.image.iter().all(|&v| v == 1.0));
        assert!(dataset.get(3).is_none());
    }

    #[test]
    fn test_raw_partition_untouched() {
        let raw = partition();
        let dataset = NormalizedPartition::new(raw.clone(), 10);
        let _ = dataset.get(0);
        assert_eq!(dataset.raw().corpus.image(2).unwrap(), &[255; 12]);
        assert_eq!(raw.corpus.label(1), Some(9));
    }

    #[test]
    fn test_batcher_shapes() {
        let dataset = NormalizedPartition::new(partition(), 10);
        let items: Vec<CifarItem> = dataset.iter().collect();
        let batcher = CifarBatcher::new(dataset.shape(), 10);
        let device = Default::default();

        let batch: CifarBatch<TestBackend> = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [3, 3, 2, 2]);
        assert_eq!(batch.targets.dims(), [3, 10]);
        assert_eq!(batch.labels.dims(), [3]);

        let row_sums: Vec<f32> = batch.targets.sum_dim(1).into_data().to_vec().unwrap();
        assert_eq!(row_sums, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_one_hot() {
        assert_eq!(one_hot(2, 4), vec![0.0, 0.0, 1.0, 0.0]);
        // Out-of-range labels encode as all zeros
        assert_eq!(one_hot(7, 4), vec![0.0; 4]);
    }
}
