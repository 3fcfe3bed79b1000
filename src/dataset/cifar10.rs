//! CIFAR-10 binary source
//!
//! Downloads `cifar-10-binary.tar.gz` once, extracts it into the cache
//! directory and parses the binary batches on every fetch.
//!
//! Record layout: `[label: 1 byte][red: 1024][green: 1024][blue: 1024]`.
//! The planes are kept as-is, so images stay channel-planar.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::dataset::corpus::{CorpusSource, ImageCorpus, ImageShape, UpstreamCorpus};
use crate::utils::error::{CifarError, Result};
use crate::NUM_CLASSES;

pub const CIFAR10_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";
const ARCHIVE_NAME: &str = "cifar-10-binary.tar.gz";
const EXTRACTED_DIR: &str = "cifar-10-batches-bin";

pub const CIFAR10_SHAPE: ImageShape = ImageShape::new(3, 32, 32);
const RECORD_SIZE: usize = 1 + CIFAR10_SHAPE.num_values();

const TRAIN_BATCHES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_BATCH: &str = "test_batch.bin";

/// CIFAR-10 corpus cached under a local directory
#[derive(Debug, Clone)]
pub struct Cifar10Source {
    data_dir: PathBuf,
    allow_download: bool,
}

impl Cifar10Source {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            allow_download: true,
        }
    }

    /// Only use the local cache
    pub fn offline(mut self) -> Self {
        self.allow_download = false;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn batches_dir(&self) -> PathBuf {
        self.data_dir.join(EXTRACTED_DIR)
    }

    pub fn is_cached(&self) -> bool {
        let dir = self.batches_dir();
        TRAIN_BATCHES
            .iter()
            .chain(std::iter::once(&TEST_BATCH))
            .all(|name| dir.join(name).is_file())
    }

    /// Download and extract the archive unless the batches are already cached.
    pub fn ensure_cached(&self) -> Result<()> {
        if self.is_cached() {
            tracing::debug!("CIFAR-10 cache found at {}", self.batches_dir().display());
            return Ok(());
        }
        if !self.allow_download {
            return Err(CifarError::DataUnavailable(format!(
                "no cached CIFAR-10 batches in {} and downloading is disabled",
                self.batches_dir().display()
            )));
        }

        fs::create_dir_all(&self.data_dir)?;
        let archive = self.data_dir.join(ARCHIVE_NAME);

        if archive.is_file() {
            tracing::info!("CIFAR-10 archive already present, skipping download");
        } else {
            download(CIFAR10_URL, &archive)?;
        }

        tracing::info!("Extracting {}", archive.display());
        extract_tar_gz(&archive, &self.data_dir)?;

        if !self.is_cached() {
            return Err(CifarError::DataUnavailable(format!(
                "archive {} did not contain the expected batch files",
                archive.display()
            )));
        }
        Ok(())
    }
}

impl CorpusSource for Cifar10Source {
    fn name(&self) -> &str {
        "cifar10"
    }

    fn fetch(&self) -> Result<UpstreamCorpus> {
        self.ensure_cached()?;
        let dir = self.batches_dir();

        let mut train = ImageCorpus::empty(CIFAR10_SHAPE);
        for name in TRAIN_BATCHES {
            train.append(load_batch(&dir.join(name))?)?;
        }
        let test = load_batch(&dir.join(TEST_BATCH))?;

        tracing::info!(
            "Loaded CIFAR-10: {} train + {} test images",
            train.len(),
            test.len()
        );
        Ok(UpstreamCorpus { train, test })
    }
}

/// Parse one binary batch file
fn load_batch(path: &Path) -> Result<ImageCorpus> {
    let mut buffer = Vec::new();
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut buffer))
        .map_err(|e| CifarError::DataUnavailable(format!("failed to read {}: {}", path.display(), e)))?;

    parse_batch(&buffer).map_err(|e| match e {
        CifarError::DataUnavailable(msg) => {
            CifarError::DataUnavailable(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

fn parse_batch(buffer: &[u8]) -> Result<ImageCorpus> {
    if buffer.is_empty() || buffer.len() % RECORD_SIZE != 0 {
        return Err(CifarError::DataUnavailable(format!(
            "corrupt batch: {} bytes is not a whole number of {}-byte records",
            buffer.len(),
            RECORD_SIZE
        )));
    }

    let count = buffer.len() / RECORD_SIZE;
    let mut labels = Vec::with_capacity(count);
    let mut pixels = Vec::with_capacity(count * CIFAR10_SHAPE.num_values());

    for record in buffer.chunks_exact(RECORD_SIZE) {
        let label = record[0];
        if label as usize >= NUM_CLASSES {
            return Err(CifarError::DataUnavailable(format!(
                "corrupt batch: label {} out of range",
                label
            )));
        }
        labels.push(label);
        pixels.extend_from_slice(&record[1..]);
    }

    ImageCorpus::new(CIFAR10_SHAPE, pixels, labels)
}

fn download(url: &str, destination: &Path) -> Result<()> {
    tracing::info!("Downloading CIFAR-10 from {}", url);

    let unavailable = |e: reqwest::Error| CifarError::DataUnavailable(format!("download failed: {}", e));
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(unavailable)?;
    let bytes = response.bytes().map_err(unavailable)?;

    // Partial downloads never land under the final name
    let partial = destination.with_extension("part");
    let mut file = File::create(&partial)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&partial, destination)?;

    tracing::info!("Downloaded {} bytes", bytes.len());
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, output_dir: &Path) -> Result<()> {
    let tar_gz = File::open(archive_path)?;
    let decompressor = flate2::read::GzDecoder::new(tar_gz);
    let mut archive = tar::Archive::new(decompressor);

    archive
        .unpack(output_dir)
        .map_err(|e| CifarError::DataUnavailable(format!("failed to extract {}: {}", archive_path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_records(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for &label in labels {
            bytes.push(label);
            // red plane = label, green = 100, blue = 200
            bytes.extend(std::iter::repeat(label).take(1024));
            bytes.extend(std::iter::repeat(100).take(1024));
            bytes.extend(std::iter::repeat(200).take(1024));
        }
        bytes
    }

    fn write_fake_cache(root: &Path) {
        let dir = root.join(EXTRACTED_DIR);
        fs::create_dir_all(&dir).unwrap();
        for (i, name) in TRAIN_BATCHES.iter().enumerate() {
            fs::write(dir.join(name), fake_records(&[i as u8, 9])).unwrap();
        }
        fs::write(dir.join(TEST_BATCH), fake_records(&[3, 4, 5])).unwrap();
    }

    #[test]
    fn test_parse_batch_keeps_planes() {
        let corpus = parse_batch(&fake_records(&[7, 2])).unwrap();

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.labels(), &[7, 2]);
        let image = corpus.image(0).unwrap();
        assert_eq!(image[0], 7);
        assert_eq!(image[1024], 100);
        assert_eq!(image[3071], 200);
    }

    #[test]
    fn test_parse_batch_rejects_truncated() {
        let mut bytes = fake_records(&[1]);
        bytes.pop();
        assert!(matches!(parse_batch(&bytes), Err(CifarError::DataUnavailable(_))));
    }

    #[test]
    fn test_parse_batch_rejects_bad_label() {
        assert!(matches!(parse_batch(&fake_records(&[10])), Err(CifarError::DataUnavailable(_))));
    }

    #[test]
    fn test_fetch_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_cache(dir.path());

        let source = Cifar10Source::new(dir.path()).offline();
        assert!(source.is_cached());

        let corpus = source.fetch().unwrap();
        assert_eq!(corpus.train.len(), 10);
        assert_eq!(corpus.test.len(), 3);
        assert_eq!(corpus.train.shape(), CIFAR10_SHAPE);
        assert_eq!(&corpus.train.labels()[..2], &[0, 9]);
    }

    #[test]
    fn test_missing_cache_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let source = Cifar10Source::new(dir.path()).offline();

        assert!(matches!(source.fetch(), Err(CifarError::DataUnavailable(_))));
    }
}
