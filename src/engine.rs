use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use image::{ImageBuffer, Luma};

use crate::encode;
use crate::errors::Result;
use crate::marshal::EngineBuffer;
use crate::settings::EngineSettings;

/// Per-pixel superpixel IDs, same extent as the normalized asset.
pub type LabelMask = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Aggregate statistics of one superpixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperpixelInfo {
    pub id: u16,
    pub pixel_count: u32,
    pub centroid: (f32, f32),
    /// Mean color in the clustering color space, then mean alpha.
    pub mean_color: [f32; 4],
}

impl SuperpixelInfo {
    pub const fn empty(id: u16) -> Self {
        Self {
            id,
            pixel_count: 0,
            centroid: (0.0, 0.0),
            mean_color: [0.0; 4],
        }
    }
}

/// Owned snapshot of an engine's output for one asset.
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    pub label_mask: LabelMask,
    /// Full table, zero-count entries included.
    pub superpixels: Vec<SuperpixelInfo>,
}

impl SegmentationResult {
    pub fn dimensions(&self) -> (u32, u32) {
        self.label_mask.dimensions()
    }

    /// Table entries with at least one pixel, keyed by ID.
    pub fn active_superpixels(&self) -> HashMap<u16, &SuperpixelInfo> {
        self.superpixels
            .iter()
            .filter(|info| info.pixel_count > 0)
            .map(|info| (info.id, info))
            .collect()
    }

    pub fn distinct_labels(&self) -> BTreeSet<u16> {
        self.label_mask.pixels().map(|Luma([l])| *l).collect()
    }

    /// Labels present in the mask without a non-zero-count table entry.
    pub fn inconsistent_labels(&self) -> Vec<u16> {
        let active = self.active_superpixels();
        self.distinct_labels()
            .into_iter()
            .filter(|label| !active.contains_key(label))
            .collect()
    }
}

/// A segmentation engine bound to fixed settings and raster dimensions.
///
/// The label mask and superpixel table are views of the most recent
/// `process` call. Engines are `Send` but not `Sync`: one worker owns an
/// engine at a time.
pub trait SegmentationEngine: Send {
    fn dimensions(&self) -> (u32, u32);

    /// Segments `input`, blocking until the device work finishes.
    fn process(&mut self, input: &EngineBuffer) -> Result<()>;

    /// Draws the last input with superpixel boundaries overlaid.
    fn draw_result(&self, out: &mut EngineBuffer) -> Result<()>;

    /// Draws superpixel boundaries only: boundary pixels white, others black.
    fn draw_boundary(&self, out: &mut EngineBuffer) -> Result<()>;

    fn label_mask(&self) -> &LabelMask;

    fn superpixels(&self) -> &[SuperpixelInfo];

    fn write_mask_as_pgm(&self, path: &Path) -> Result<()> {
        encode::write_pgm(self.label_mask(), path)
    }

    fn result(&self) -> SegmentationResult {
        SegmentationResult {
            label_mask: self.label_mask().clone(),
            superpixels: self.superpixels().to_vec(),
        }
    }
}

/// Creates engines. Creation may acquire device resources and is expensive.
pub trait EngineFactory: Send + Sync {
    type Engine: SegmentationEngine;

    fn create(&self, settings: &EngineSettings, dims: (u32, u32)) -> Result<Self::Engine>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(labels: Vec<u16>, table: Vec<SuperpixelInfo>) -> SegmentationResult {
        SegmentationResult {
            label_mask: LabelMask::from_raw(2, 2, labels).unwrap(),
            superpixels: table,
        }
    }

    fn info(id: u16, pixel_count: u32) -> SuperpixelInfo {
        SuperpixelInfo {
            pixel_count,
            ..SuperpixelInfo::empty(id)
        }
    }

    #[test]
    fn test_consistent_result() {
        let result = result_with(vec![0, 0, 2, 2], vec![info(0, 2), info(1, 0), info(2, 2)]);
        assert!(result.inconsistent_labels().is_empty());
        assert_eq!(result.active_superpixels().len(), 2);
        assert_eq!(result.distinct_labels().into_iter().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_reports_labels_without_pixels() {
        let result = result_with(vec![0, 1, 3, 3], vec![info(0, 1), info(1, 0), info(3, 2)]);
        assert_eq!(result.inconsistent_labels(), vec![1]);
    }
}
