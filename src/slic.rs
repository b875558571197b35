//! CPU implementation of the segmentation engine contract (SLIC).

mod color;
mod connectivity;
pub mod draw;

pub use connectivity::enforce_connectivity;

use rayon::prelude::*;
use tracing::trace;

use crate::engine::{EngineFactory, LabelMask, SegmentationEngine, SuperpixelInfo};
use crate::errors::{Result, SuperpixelError};
use crate::marshal::{EngineBuffer, A, B, G, R};
use crate::settings::{EngineSettings, SizeConstraint};

/// Creates [`SlicEngine`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlicFactory;

impl EngineFactory for SlicFactory {
    type Engine = SlicEngine;

    fn create(&self, settings: &EngineSettings, dims: (u32, u32)) -> Result<SlicEngine> {
        SlicEngine::new(settings.clone(), dims)
    }
}

/// Layout of the initial cluster centers.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Grid {
    cols: u32,
    rows: u32,
    step_x: f32,
    step_y: f32,
}

impl Grid {
    fn new(constraint: SizeConstraint, width: u32, height: u32) -> Self {
        let (cols, rows) = match constraint {
            SizeConstraint::GivenNum(n) => {
                let aspect = width as f64 / height as f64;
                let cols = ((n as f64 * aspect).sqrt().round() as u32).clamp(1, n.min(width));
                let rows = (n / cols).clamp(1, height);
                (cols, rows)
            }
            SizeConstraint::GivenSize(size) => {
                let side = (size as f64).sqrt().max(1.0);
                let cols = ((width as f64 / side).ceil() as u32).clamp(1, width);
                let rows = ((height as f64 / side).ceil() as u32).clamp(1, height);
                (cols, rows)
            }
        };
        Self {
            cols,
            rows,
            step_x: width as f32 / cols as f32,
            step_y: height as f32 / rows as f32,
        }
    }

    fn len(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    fn cell_of(&self, x: f32, y: f32) -> (i64, i64) {
        (
            ((x / self.step_x) as i64).min(self.cols as i64 - 1),
            ((y / self.step_y) as i64).min(self.rows as i64 - 1),
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Center {
    color: [f32; 3],
    x: f32,
    y: f32,
}

pub struct SlicEngine {
    settings: EngineSettings,
    width: u32,
    height: u32,
    grid: Grid,
    source: EngineBuffer,
    labels: LabelMask,
    table: Vec<SuperpixelInfo>,
}

impl SlicEngine {
    pub fn new(settings: EngineSettings, (width, height): (u32, u32)) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SuperpixelError::InvalidAsset {
                width: width.into(),
                height: height.into(),
                reason: "engine dimensions must be positive".to_string(),
            });
        }
        let grid = Grid::new(settings.constraint, width, height);
        if grid.len() > usize::from(u16::MAX) + 1 {
            return Err(SuperpixelError::configuration(format!(
                "{} superpixels exceed the 16-bit label range",
                grid.len()
            )));
        }

        Ok(Self {
            settings,
            width,
            height,
            grid,
            source: EngineBuffer::new(width, height),
            labels: LabelMask::new(width, height),
            table: Vec::new(),
        })
    }

    fn seed(&self, features: &[[f32; 3]]) -> Vec<Center> {
        let mut centers = Vec::with_capacity(self.grid.len());
        for row in 0..self.grid.rows {
            for col in 0..self.grid.cols {
                let x = (col as f32 + 0.5) * self.grid.step_x;
                let y = (row as f32 + 0.5) * self.grid.step_y;
                let px = (x as u32).min(self.width - 1);
                let py = (y as u32).min(self.height - 1);
                centers.push(Center {
                    color: features[(py * self.width + px) as usize],
                    x,
                    y,
                });
            }
        }
        centers
    }

    /// Assigns every pixel to the nearest center among the 3x3 seeding cells
    /// around it. Center `i` always belongs to seeding cell `i`.
    fn assign(&self, features: &[[f32; 3]], centers: &[Center], labels: &mut [u16]) {
        let grid = self.grid;
        let width = self.width as usize;
        let range = color::range(self.settings.color_space);
        let color_norm = 1.0 / (range * range);
        let step = grid.step_x.max(grid.step_y);
        let xy_norm = self.settings.coh_weight / (step * step);

        labels
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, label) in row.iter_mut().enumerate() {
                    let feature = features[y * width + x];
                    let (cx, cy) = grid.cell_of(x as f32 + 0.5, y as f32 + 0.5);
                    let mut best = (f32::INFINITY, *label);

                    for ny in (cy - 1)..=(cy + 1) {
                        for nx in (cx - 1)..=(cx + 1) {
                            if nx < 0 || ny < 0 || nx >= grid.cols as i64 || ny >= grid.rows as i64
                            {
                                continue;
                            }
                            let id = (ny * grid.cols as i64 + nx) as usize;
                            let center = &centers[id];
                            let dcolor: f32 = feature
                                .iter()
                                .zip(&center.color)
                                .map(|(a, b)| (a - b) * (a - b))
                                .sum();
                            let dx = x as f32 + 0.5 - center.x;
                            let dy = y as f32 + 0.5 - center.y;
                            let distance = dcolor * color_norm + (dx * dx + dy * dy) * xy_norm;
                            if distance < best.0 {
                                best = (distance, id as u16);
                            }
                        }
                    }
                    *label = best.1;
                }
            });
    }

    /// Moves each center to the mean of its pixels. Empty clusters stay put.
    fn update(&self, features: &[[f32; 3]], labels: &[u16], centers: &mut [Center]) {
        let mut sums = vec![([0.0f64; 3], 0.0f64, 0.0f64, 0u32); centers.len()];
        for (idx, &label) in labels.iter().enumerate() {
            let (x, y) = (idx as u32 % self.width, idx as u32 / self.width);
            let entry = &mut sums[usize::from(label)];
            for (acc, c) in entry.0.iter_mut().zip(&features[idx]) {
                *acc += f64::from(*c);
            }
            entry.1 += f64::from(x) + 0.5;
            entry.2 += f64::from(y) + 0.5;
            entry.3 += 1;
        }

        for (center, (color, sx, sy, n)) in centers.iter_mut().zip(sums) {
            if n == 0 {
                continue;
            }
            let n = f64::from(n);
            center.color = color.map(|c| (c / n) as f32);
            center.x = (sx / n) as f32;
            center.y = (sy / n) as f32;
        }
    }

    fn build_table(&self, features: &[[f32; 3]], input: &EngineBuffer) -> Vec<SuperpixelInfo> {
        let mut table: Vec<SuperpixelInfo> =
            (0..self.grid.len()).map(|id| SuperpixelInfo::empty(id as u16)).collect();
        let mut sums = vec![[0.0f64; 6]; table.len()];

        for (idx, pixel) in self.labels.pixels().enumerate() {
            let label = usize::from(pixel[0]);
            let (x, y) = (idx as u32 % self.width, idx as u32 / self.width);
            let s = &mut sums[label];
            s[0] += f64::from(x);
            s[1] += f64::from(y);
            for c in 0..3 {
                s[2 + c] += f64::from(features[idx][c]);
            }
            s[5] += f64::from(input.pixels()[idx][A]);
            table[label].pixel_count += 1;
        }

        for (info, s) in table.iter_mut().zip(sums) {
            if info.pixel_count == 0 {
                continue;
            }
            let n = f64::from(info.pixel_count);
            info.centroid = ((s[0] / n) as f32, (s[1] / n) as f32);
            info.mean_color = [
                (s[2] / n) as f32,
                (s[3] / n) as f32,
                (s[4] / n) as f32,
                (s[5] / n) as f32,
            ];
        }
        table
    }
}

impl SegmentationEngine for SlicEngine {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn process(&mut self, input: &EngineBuffer) -> Result<()> {
        if input.dimensions() != self.dimensions() {
            return Err(SuperpixelError::DimensionMismatch {
                expected: self.dimensions(),
                actual: input.dimensions(),
            });
        }

        let space = self.settings.color_space;
        let features: Vec<[f32; 3]> = input
            .pixels()
            .par_iter()
            .map(|p| color::convert([p[R], p[G], p[B]], space))
            .collect();

        let mut centers = self.seed(&features);
        let mut labels = vec![0u16; features.len()];
        for iteration in 0..self.settings.iterations {
            self.assign(&features, &centers, &mut labels);
            self.update(&features, &labels, &mut centers);
            trace!(iteration, "slic iteration finished");
        }

        if self.settings.enforce_connectivity {
            enforce_connectivity(&mut labels, self.width, self.height);
        }

        self.labels = LabelMask::from_raw(self.width, self.height, labels).ok_or(
            SuperpixelError::DimensionMismatch {
                expected: self.dimensions(),
                actual: input.dimensions(),
            },
        )?;
        self.source = input.clone();
        self.table = self.build_table(&features, input);
        Ok(())
    }

    fn draw_result(&self, out: &mut EngineBuffer) -> Result<()> {
        draw::draw_segmentation(&self.labels, &self.source, out)
    }

    fn draw_boundary(&self, out: &mut EngineBuffer) -> Result<()> {
        draw::draw_boundary_only(&self.labels, out)
    }

    fn label_mask(&self) -> &LabelMask {
        &self.labels
    }

    fn superpixels(&self) -> &[SuperpixelInfo] {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ColorSpace;

    fn settings(constraint: SizeConstraint, enforce_connectivity: bool) -> EngineSettings {
        EngineSettings {
            constraint,
            color_space: ColorSpace::Xyz,
            coh_weight: 0.6,
            iterations: 5,
            enforce_connectivity,
        }
    }

    fn two_tone(width: u32, height: u32) -> EngineBuffer {
        let pixels = (0..width * height)
            .map(|i| {
                if i % width < width / 2 {
                    [200, 30, 30, 255]
                } else {
                    [20, 40, 220, 255]
                }
            })
            .collect();
        EngineBuffer::from_pixels(width, height, pixels).unwrap()
    }

    #[test]
    fn test_given_num_grid_never_exceeds_target() {
        for n in [1, 2, 7, 16, 128, 2000] {
            for (w, h) in [(50, 25), (25, 50), (640, 480), (3, 300)] {
                let grid = Grid::new(SizeConstraint::GivenNum(n), w, h);
                assert!(grid.len() as u32 <= n, "n={n} dims={w}x{h} grid={grid:?}");
                assert!(grid.len() >= 1);
            }
        }
    }

    #[test]
    fn test_given_size_grid_covers_image() {
        let grid = Grid::new(SizeConstraint::GivenSize(16), 50, 25);
        assert_eq!((grid.cols, grid.rows), (13, 7));
    }

    #[test]
    fn test_every_mask_label_has_pixels() {
        let mut engine =
            SlicFactory.create(&settings(SizeConstraint::GivenNum(16), true), (50, 25)).unwrap();
        engine.process(&two_tone(50, 25)).unwrap();

        let result = engine.result();
        assert!(result.inconsistent_labels().is_empty());
        let distinct = result.distinct_labels().len();
        assert!((1..=16).contains(&distinct), "got {distinct} labels");
        assert_eq!(
            result.superpixels.iter().map(|s| s.pixel_count).sum::<u32>(),
            50 * 25
        );
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let run = || {
            let mut engine = SlicFactory
                .create(&settings(SizeConstraint::GivenSize(36), true), (40, 30))
                .unwrap();
            engine.process(&two_tone(40, 30)).unwrap();
            engine.label_mask().clone()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_regions_do_not_straddle_color_edge() {
        let mut engine = SlicFactory
            .create(&settings(SizeConstraint::GivenNum(4), false), (40, 20))
            .unwrap();
        engine.process(&two_tone(40, 20)).unwrap();

        let mask = engine.label_mask();
        for y in 0..20 {
            assert_ne!(mask.get_pixel(19, y)[0], mask.get_pixel(20, y)[0]);
        }
    }

    #[test]
    fn test_rejects_wrong_input_extent() {
        let mut engine = SlicFactory
            .create(&settings(SizeConstraint::GivenNum(4), true), (10, 10))
            .unwrap();
        assert!(matches!(
            engine.process(&EngineBuffer::new(10, 9)),
            Err(SuperpixelError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_draw_outputs_match_extent() {
        let mut engine = SlicFactory
            .create(&settings(SizeConstraint::GivenNum(4), true), (20, 10))
            .unwrap();
        engine.process(&two_tone(20, 10)).unwrap();

        let mut viz = EngineBuffer::new(20, 10);
        engine.draw_result(&mut viz).unwrap();
        let mut boundary = EngineBuffer::new(20, 10);
        engine.draw_boundary(&mut boundary).unwrap();
        assert!(boundary.pixels().iter().any(|p| p[0] == 255));
        assert!(engine.draw_result(&mut EngineBuffer::new(2, 2)).is_err());
    }
}
