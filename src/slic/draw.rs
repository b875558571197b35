use crate::engine::LabelMask;
use crate::errors::{Result, SuperpixelError};
use crate::marshal::EngineBuffer;

pub const BOUNDARY_COLOR: [u8; 4] = [255, 0, 0, 255];

/// True where a pixel's label differs from one of its 4-neighbours.
pub fn is_boundary(mask: &LabelMask, x: u32, y: u32) -> bool {
    let (width, height) = mask.dimensions();
    let label = mask.get_pixel(x, y)[0];
    let differs = |nx: u32, ny: u32| mask.get_pixel(nx, ny)[0] != label;

    (x > 0 && differs(x - 1, y))
        || (x + 1 < width && differs(x + 1, y))
        || (y > 0 && differs(x, y - 1))
        || (y + 1 < height && differs(x, y + 1))
}

/// Copies `source` into `out` and paints superpixel boundaries red.
pub fn draw_segmentation(
    mask: &LabelMask,
    source: &EngineBuffer,
    out: &mut EngineBuffer,
) -> Result<()> {
    check(mask, out)?;
    check(mask, source)?;

    for y in 0..out.height() {
        for x in 0..out.width() {
            let pixel = if is_boundary(mask, x, y) {
                BOUNDARY_COLOR
            } else {
                source.get(x, y)
            };
            out.put(x, y, pixel);
        }
    }
    Ok(())
}

/// Paints boundary pixels white and everything else black.
pub fn draw_boundary_only(mask: &LabelMask, out: &mut EngineBuffer) -> Result<()> {
    check(mask, out)?;

    for y in 0..out.height() {
        for x in 0..out.width() {
            let v = if is_boundary(mask, x, y) { u8::MAX } else { 0 };
            out.put(x, y, [v, v, v, u8::MAX]);
        }
    }
    Ok(())
}

fn check(mask: &LabelMask, buffer: &EngineBuffer) -> Result<()> {
    if mask.dimensions() != buffer.dimensions() {
        return Err(SuperpixelError::DimensionMismatch {
            expected: mask.dimensions(),
            actual: buffer.dimensions(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_between_two_halves() {
        let mask = LabelMask::from_fn(4, 2, |x, _| image::Luma([u16::from(x >= 2)]));
        let mut out = EngineBuffer::new(4, 2);
        draw_boundary_only(&mask, &mut out).unwrap();

        let row: Vec<u8> = (0..4).map(|x| out.get(x, 0)[0]).collect();
        assert_eq!(row, vec![0, 255, 255, 0]);
    }

    #[test]
    fn test_overlay_keeps_interior_pixels() {
        let mask = LabelMask::from_fn(3, 1, |x, _| image::Luma([u16::from(x == 2)]));
        let source = EngineBuffer::from_pixels(3, 1, vec![[9, 9, 9, 255]; 3]).unwrap();
        let mut out = EngineBuffer::new(3, 1);
        draw_segmentation(&mask, &source, &mut out).unwrap();

        assert_eq!(out.get(0, 0), [9, 9, 9, 255]);
        assert_eq!(out.get(1, 0), BOUNDARY_COLOR);
        assert_eq!(out.get(2, 0), BOUNDARY_COLOR);
    }
}
