use image::Luma;

use crate::engine::{EngineFactory, LabelMask, SegmentationEngine, SuperpixelInfo};
use crate::errors::{Result, SuperpixelError};
use crate::marshal::EngineBuffer;
use crate::settings::EngineSettings;
use crate::slic::draw;

/// Test engine that labels a fixed `cols` x `rows` grid of blocks.
///
/// Deterministic and content-independent, so tests can predict every label.
#[derive(Debug, Clone)]
pub struct GridEngine {
    cols: u32,
    rows: u32,
    source: EngineBuffer,
    labels: LabelMask,
    table: Vec<SuperpixelInfo>,
}

impl GridEngine {
    pub fn new(cols: u32, rows: u32, (width, height): (u32, u32)) -> Result<Self> {
        if width == 0 || height == 0 || cols == 0 || rows == 0 {
            return Err(SuperpixelError::Device {
                message: format!("cannot build a {cols}x{rows} grid engine for {width}x{height}"),
            });
        }
        Ok(Self {
            cols: cols.min(width),
            rows: rows.min(height),
            source: EngineBuffer::new(width, height),
            labels: LabelMask::new(width, height),
            table: Vec::new(),
        })
    }

    fn label_at(&self, x: u32, y: u32) -> u16 {
        let (width, height) = self.source.dimensions();
        let col = x * self.cols / width;
        let row = y * self.rows / height;
        (row * self.cols + col) as u16
    }
}

impl SegmentationEngine for GridEngine {
    fn dimensions(&self) -> (u32, u32) {
        self.source.dimensions()
    }

    fn process(&mut self, input: &EngineBuffer) -> Result<()> {
        if input.dimensions() != self.dimensions() {
            return Err(SuperpixelError::DimensionMismatch {
                expected: self.dimensions(),
                actual: input.dimensions(),
            });
        }
        self.source = input.clone();

        let mut sums = vec![(0u32, 0.0f64, 0.0f64, [0.0f64; 4]); (self.cols * self.rows) as usize];
        let (width, height) = self.source.dimensions();
        self.labels = LabelMask::from_fn(width, height, |x, y| Luma([self.label_at(x, y)]));

        for (x, y, &Luma([label])) in self.labels.enumerate_pixels() {
            let entry = &mut sums[label as usize];
            entry.0 += 1;
            entry.1 += f64::from(x);
            entry.2 += f64::from(y);
            for (acc, value) in entry.3.iter_mut().zip(self.source.get(x, y)) {
                *acc += f64::from(value);
            }
        }

        self.table = sums
            .into_iter()
            .enumerate()
            .map(|(id, (count, sx, sy, color))| {
                let n = f64::from(count.max(1));
                SuperpixelInfo {
                    id: id as u16,
                    pixel_count: count,
                    centroid: ((sx / n) as f32, (sy / n) as f32),
                    mean_color: color.map(|c| (c / n) as f32),
                }
            })
            .collect();
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

#[derive(Debug, Clone, Copy)]
pub struct GridEngineFactory {
    pub cols: u32,
    pub rows: u32,
}

impl GridEngineFactory {
    pub const fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }
}

impl EngineFactory for GridEngineFactory {
    type Engine = GridEngine;

    fn create(&self, _settings: &EngineSettings, dims: (u32, u32)) -> Result<GridEngine> {
        GridEngine::new(self.cols, self.rows, dims)
    }
}
