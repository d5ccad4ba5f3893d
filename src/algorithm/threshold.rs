//! Reference detector: dark-blob centroids in a grayscale tile.
//!
//! 1. Decode the tile and convert to 8-bit luma.
//! 2. Label 4-connected regions darker than `threshold`.
//! 3. Keep regions whose area lies strictly between the `low_percentile` and
//!    `high_percentile` of all region areas.
//! 4. Emit one detection per kept region at its (truncated) centroid.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use image::GrayImage;
use tracing::debug;

use super::{Detection, InlineAlgorithm};
use crate::error::AlgorithmError;
use crate::scan::TileSubmitted;

pub const DEFAULT_THRESHOLD: u8 = 77;
pub const DEFAULT_LOW_PERCENTILE: f64 = 95.0;
pub const DEFAULT_HIGH_PERCENTILE: f64 = 98.0;
pub const DEFAULT_CLASS_ID: i64 = 1;
pub const DEFAULT_LABEL: &str = "Mitosis";

/// Tuning for [`ThresholdDetector`].
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSettings {
    /// Pixels with luma strictly below this are foreground
    pub threshold: u8,
    pub low_percentile: f64,
    pub high_percentile: f64,
    pub class_id: i64,
    pub label: String,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            low_percentile: DEFAULT_LOW_PERCENTILE,
            high_percentile: DEFAULT_HIGH_PERCENTILE,
            class_id: DEFAULT_CLASS_ID,
            label: DEFAULT_LABEL.to_string(),
        }
    }
}

/// Built-in [`InlineAlgorithm`] used by the `serve` command.
#[derive(Debug, Clone, Default)]
pub struct ThresholdDetector {
    settings: ThresholdSettings,
}

impl ThresholdDetector {
    pub fn new(settings: ThresholdSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ThresholdSettings {
        &self.settings
    }

    /// Run detection on an already decoded image.
    pub fn detect_image(&self, image: &GrayImage) -> Vec<Detection> {
        let blobs = find_blobs(image, self.settings.threshold);
        if blobs.is_empty() {
            return Vec::new();
        }

        let areas: Vec<f64> = blobs.iter().map(|b| b.area as f64).collect();
        let low = percentile(&areas, self.settings.low_percentile);
        let high = percentile(&areas, self.settings.high_percentile);

        blobs
            .iter()
            .filter(|b| (b.area as f64) > low && (b.area as f64) < high)
            .map(|b| {
                let (cx, cy) = b.centroid();
                Detection::new(
                    cx.trunc(),
                    cy.trunc(),
                    self.settings.class_id,
                    self.settings.label.clone(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl InlineAlgorithm for ThresholdDetector {
    async fn detect(&self, tile: &TileSubmitted) -> Result<Vec<Detection>, AlgorithmError> {
        let path = tile.tile_image_path.clone();
        let image = tokio::task::spawn_blocking(move || load_gray(Path::new(&path)))
            .await
            .map_err(|e| AlgorithmError::with_source("tile decoding task failed", e))??;

        let detections = self.detect_image(&image);
        debug!(
            tile_name = %tile.tile_name,
            width = image.width(),
            height = image.height(),
            detections = detections.len(),
            "Threshold detection complete"
        );
        Ok(detections)
    }
}

fn load_gray(path: &Path) -> Result<GrayImage, AlgorithmError> {
    let image = image::open(path).map_err(|e| {
        AlgorithmError::with_source(format!("failed to read tile {}", path.display()), e)
    })?;
    Ok(image.to_luma8())
}

// =============================================================================
// Connected Components
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Blob {
    area: u64,
    sum_x: u64,
    sum_y: u64,
}

impl Blob {
    fn centroid(&self) -> (f64, f64) {
        let area = self.area as f64;
        (self.sum_x as f64 / area, self.sum_y as f64 / area)
    }
}

/// Label 4-connected regions of pixels darker than `threshold`.
fn find_blobs(image: &GrayImage, threshold: u8) -> Vec<Blob> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut visited = vec![false; w * h];
    let mut blobs = Vec::new();
    let mut queue = VecDeque::new();

    for start_y in 0..h {
        for start_x in 0..w {
            let idx = start_y * w + start_x;
            if visited[idx] || image.get_pixel(start_x as u32, start_y as u32)[0] >= threshold {
                continue;
            }

            visited[idx] = true;
            queue.push_back((start_x, start_y));
            let mut blob = Blob {
                area: 0,
                sum_x: 0,
                sum_y: 0,
            };

            while let Some((x, y)) = queue.pop_front() {
                blob.area += 1;
                blob.sum_x += x as u64;
                blob.sum_y += y as u64;

                let neighbors = [
                    (x.wrapping_sub(1), y),
                    (x + 1, y),
                    (x, y.wrapping_sub(1)),
                    (x, y + 1),
                ];
                for (nx, ny) in neighbors {
                    if nx >= w || ny >= h {
                        continue;
                    }
                    let nidx = ny * w + nx;
                    if !visited[nidx] && image.get_pixel(nx as u32, ny as u32)[0] < threshold {
                        visited[nidx] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }

            blobs.push(blob);
        }
    }

    blobs
}

/// Percentile with linear interpolation between closest ranks.
fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
