//! Pixel transfer between host rasters and engine buffers.
//!
//! Host rasters are `image::RgbImage` values as decoded by the `image` crate.
//! Engine buffers hold four 8-bit channels per pixel in `R, G, B, A` order;
//! the alpha channel is not read on input.

use image::{Rgb, RgbImage};

use crate::errors::{Result, SuperpixelError};

pub const R: usize = 0;
pub const G: usize = 1;
pub const B: usize = 2;
pub const A: usize = 3;

/// Row-major grid of 4-channel pixels in engine channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineBuffer {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 4]>,
}

impl EngineBuffer {
    /// A zeroed buffer. Alpha starts at 255.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0, 0, 0, u8::MAX]; width as usize * height as usize],
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<[u8; 4]>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(SuperpixelError::DimensionMismatch {
                expected: (width, height),
                actual: (pixels.len() as u32 / height.max(1), height),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[[u8; 4]] {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels[self.index(x, y)]
    }

    pub fn put(&mut self, x: u32, y: u32, pixel: [u8; 4]) {
        let idx = self.index(x, y);
        self.pixels[idx] = pixel;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        x as usize + y as usize * self.width as usize
    }
}

/// Copies every host pixel into `engine`. Both must have the same extent.
pub fn to_engine_buffer(host: &RgbImage, engine: &mut EngineBuffer) -> Result<()> {
    check_extent(engine.dimensions(), host.dimensions())?;

    for (x, y, Rgb(rgb)) in host.enumerate_pixels() {
        let idx = engine.index(x, y);
        let out = &mut engine.pixels[idx];
        out[R] = rgb[0];
        out[G] = rgb[1];
        out[B] = rgb[2];
    }
    Ok(())
}

/// Copies every engine pixel back into `host`, dropping alpha.
pub fn from_engine_buffer(engine: &EngineBuffer, host: &mut RgbImage) -> Result<()> {
    check_extent(engine.dimensions(), host.dimensions())?;

    for (x, y, pixel) in host.enumerate_pixels_mut() {
        let p = engine.get(x, y);
        *pixel = Rgb([p[R], p[G], p[B]]);
    }
    Ok(())
}

fn check_extent(engine: (u32, u32), host: (u32, u32)) -> Result<()> {
    if engine != host {
        return Err(SuperpixelError::DimensionMismatch {
            expected: engine,
            actual: host,
        });
    }
    Ok(())
}
