//! In-memory image corpus
//!
//! Images are stored back to back as channel-planar (CHW) `u8` values, the
//! layout of the CIFAR-10 binary batches, with one label byte per image.

use serde::{Deserialize, Serialize};

use crate::utils::error::{CifarError, Result};

/// Dimensions of a single image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    pub const fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Number of `u8` values per image
    pub const fn num_values(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub const fn dims(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.height, self.width)
    }
}

/// Ordered, aligned collection of images and labels
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCorpus {
    shape: ImageShape,
    pixels: Vec<u8>,
    labels: Vec<u8>,
}

impl ImageCorpus {
    /// Build a corpus, checking that the pixel buffer holds exactly one image per label.
    pub fn new(shape: ImageShape, pixels: Vec<u8>, labels: Vec<u8>) -> Result<Self> {
        if pixels.len() != labels.len() * shape.num_values() {
            return Err(CifarError::InvalidInput(format!(
                "{} pixel values do not hold {} images of shape {}",
                pixels.len(),
                labels.len(),
                shape
            )));
        }
        Ok(Self {
            shape,
            pixels,
            labels,
        })
    }

    pub fn empty(shape: ImageShape) -> Self {
        Self {
            shape,
            pixels: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<u8> {
        self.labels.get(index).copied()
    }

    /// Pixel values of image `index`
    pub fn image(&self, index: usize) -> Option<&[u8]> {
        if index >= self.len() {
            return None;
        }
        let size = self.shape.num_values();
        Some(&self.pixels[index * size..(index + 1) * size])
    }

    /// Append every record of `other`, keeping order.
    pub fn append(&mut self, other: ImageCorpus) -> Result<()> {
        if other.shape != self.shape {
            return Err(CifarError::ShapeMismatch {
                expected: self.shape,
                found: other.shape,
            });
        }
        self.pixels.extend(other.pixels);
        self.labels.extend(other.labels);
        Ok(())
    }

    /// New corpus holding the records at `indices`, in that order.
    ///
    /// Image and label move together, so pairings survive any reordering.
    pub fn select(&self, indices: &[usize]) -> Result<ImageCorpus> {
        let size = self.shape.num_values();
        let mut pixels = Vec::with_capacity(indices.len() * size);
        let mut labels = Vec::with_capacity(indices.len());

        for &index in indices {
            let image = self.image(index).ok_or_else(|| {
                CifarError::InvalidInput(format!("index {} out of range for {} records", index, self.len()))
            })?;
            pixels.extend_from_slice(image);
            labels.push(self.labels[index]);
        }

        Ok(ImageCorpus {
            shape: self.shape,
            pixels,
            labels,
        })
    }

    /// Count of records per class id, for ids below `num_classes`
    pub fn class_distribution(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        for &label in &self.labels {
            if let Some(count) = counts.get_mut(label as usize) {
                *count += 1;
            }
        }
        counts
    }
}

/// The two partitions as published upstream
#[derive(Debug, Clone)]
pub struct UpstreamCorpus {
    pub train: ImageCorpus,
    pub test: ImageCorpus,
}

impl UpstreamCorpus {
    pub fn total_len(&self) -> usize {
        self.train.len() + self.test.len()
    }
}

/// Somewhere an upstream corpus can be fetched from
pub trait CorpusSource {
    /// Short name for logging
    fn name(&self) -> &str;

    /// Fetch both upstream partitions.
    ///
    /// Fails with `CifarError::DataUnavailable` when nothing can be retrieved.
    fn fetch(&self) -> Result<UpstreamCorpus>;
}
