//! Class-sample gallery
//!
//! Renders one validation image per class into a 2x5 PNG grid with the
//! `image` crate. Classes without a sample get a blank tile.

use std::path::Path;

use image::{Rgb, RgbImage};

use crate::dataset::prepare::ClassSample;
use crate::dataset::class_name;
use crate::utils::error::Result;

const GRID_ROWS: u32 = 2;
const GRID_COLS: u32 = 5;
/// Pixel gap between tiles
const SPACING: u32 = 4;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const BLANK_TILE: Rgb<u8> = Rgb([220, 220, 220]);

/// Write the gallery PNG to `path`.
///
/// `samples[i]` is the outcome of sampling class `i`; an error leaves the
/// tile blank and is logged as a warning. Tiles are upscaled by `scale`.
pub fn render_class_samples(
    samples: &[Result<ClassSample>],
    tile_size: (u32, u32),
    scale: u32,
    path: &Path,
) -> Result<RgbImage> {
    let scale = scale.max(1);
    let tile_w = tile_size.0 * scale;
    let tile_h = tile_size.1 * scale;
    let width = GRID_COLS * tile_w + (GRID_COLS + 1) * SPACING;
    let height = GRID_ROWS * tile_h + (GRID_ROWS + 1) * SPACING;

    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

    for (slot, sample) in samples.iter().take((GRID_ROWS * GRID_COLS) as usize).enumerate() {
        let slot = slot as u32;
        let origin_x = SPACING + (slot % GRID_COLS) * (tile_w + SPACING);
        let origin_y = SPACING + (slot / GRID_COLS) * (tile_h + SPACING);

        match sample {
            Ok(sample) => {
                let tile = sample_to_rgb(sample);
                for y in 0..tile_h {
                    for x in 0..tile_w {
                        let src_x = (x / scale).min(tile.width().saturating_sub(1));
                        let src_y = (y / scale).min(tile.height().saturating_sub(1));
                        canvas.put_pixel(origin_x + x, origin_y + y, *tile.get_pixel(src_x, src_y));
                    }
                }
                tracing::debug!("Gallery tile {} <- {} (#{})", slot, class_name(sample.class), sample.index);
            }
            Err(e) => {
                tracing::warn!("Leaving gallery tile {} blank: {}", slot, e);
                for y in 0..tile_h {
                    for x in 0..tile_w {
                        canvas.put_pixel(origin_x + x, origin_y + y, BLANK_TILE);
                    }
                }
            }
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    canvas.save(path)?;
    tracing::info!("Class gallery written to {}", path.display());

    Ok(canvas)
}

/// Convert a channel-planar sample to an RGB image; single-channel images are greyscale.
fn sample_to_rgb(sample: &ClassSample) -> RgbImage {
    let shape = sample.shape;
    let plane = shape.height * shape.width;
    let mut img = RgbImage::new(shape.width as u32, shape.height as u32);

    for y in 0..shape.height {
        for x in 0..shape.width {
            let offset = y * shape.width + x;
            let channel = |c: usize| {
                let c = c.min(shape.channels.saturating_sub(1));
                sample.pixels.get(c * plane + offset).copied().unwrap_or(0)
            };
            img.put_pixel(x as u32, y as u32, Rgb([channel(0), channel(1), channel(2)]));
        }
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::corpus::ImageShape;
    use crate::utils::error::CifarError;

    fn solid_sample(class: usize, rgb: [u8; 3]) -> ClassSample {
        let shape = ImageShape::new(3, 4, 4);
        let mut pixels = Vec::with_capacity(shape.num_values());
        for value in rgb {
            pixels.extend(std::iter::repeat(value).take(16));
        }
        ClassSample {
            class,
            index: class,
            shape,
            pixels,
        }
    }

    #[test]
    fn test_gallery_layout_and_blank_tile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.png");

        let mut samples: Vec<Result<ClassSample>> =
            (0..10).map(|c| Ok(solid_sample(c, [200, 10, 30]))).collect();
        samples[3] = Err(CifarError::EmptyClass {
            class: 3,
            name: "cat".to_string(),
        });

        let canvas = render_class_samples(&samples, (4, 4), 2, &path).unwrap();
        assert!(path.exists());

        assert_eq!(canvas.width(), 5 * 8 + 6 * SPACING);
        assert_eq!(canvas.height(), 2 * 8 + 3 * SPACING);

        // First tile carries the sample's colour
        assert_eq!(*canvas.get_pixel(SPACING, SPACING), Rgb([200, 10, 30]));
        // Fourth tile (class 3) is blank
        let x3 = SPACING + 3 * (8 + SPACING);
        assert_eq!(*canvas.get_pixel(x3, SPACING), BLANK_TILE);
    }

    #[test]
    fn test_planar_to_rgb() {
        let sample = solid_sample(0, [1, 2, 3]);
        let rgb = sample_to_rgb(&sample);
        assert_eq!(*rgb.get_pixel(2, 3), Rgb([1, 2, 3]));
    }
}
