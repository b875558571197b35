//! Artifact encoders.
//!
//! Binary artifacts are little-endian; the PGM mask stores big-endian 16-bit
//! samples as the format requires. Every writer truncates an existing file.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use image::{ImageFormat, RgbImage};

use crate::engine::{LabelMask, SegmentationResult, SuperpixelInfo};
use crate::errors::{Result, SuperpixelError};
use crate::marshal::EngineBuffer;
use crate::settings::ColorSpace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum ArtifactKind {
    /// Input with superpixel boundaries drawn (`.viz.png`)
    Viz,
    /// 16-bit label mask (`.slic.pgm`)
    Pgm,
    /// Superpixel summary table (`.centers.txt`)
    Centers,
    /// Per-pixel centroid coordinates (`.slic.bin`)
    Centroids,
    /// Per-pixel superpixel color (`.colors.bin`)
    Colors,
    /// Per-pixel boundary flags (`.boundary.bin`)
    Boundary,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::Viz,
        ArtifactKind::Pgm,
        ArtifactKind::Centers,
        ArtifactKind::Centroids,
        ArtifactKind::Colors,
        ArtifactKind::Boundary,
    ];

    pub const fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::Viz => ".viz.png",
            ArtifactKind::Pgm => ".slic.pgm",
            ArtifactKind::Centers => ".centers.txt",
            ArtifactKind::Centroids => ".slic.bin",
            ArtifactKind::Colors => ".colors.bin",
            ArtifactKind::Boundary => ".boundary.bin",
        }
    }

    /// `<output_dir>/<file_name><suffix>`; `file_name` keeps its own extension.
    pub fn path_for(self, output_dir: &Path, file_name: &str) -> PathBuf {
        output_dir.join(format!("{file_name}{}", self.suffix()))
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => Ok(()),
        }
    }
}

/// Result of writing one artifact.
#[derive(Debug)]
pub struct ArtifactOutcome {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub result: Result<()>,
}

impl ArtifactOutcome {
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Writes `P5\n<W> <H>\n65535\n` followed by big-endian labels.
pub fn encode_pgm<W: Write>(mask: &LabelMask, out: &mut W) -> std::io::Result<()> {
    let (width, height) = mask.dimensions();
    write!(out, "P5\n{width} {height}\n65535\n")?;
    for label in mask.as_raw() {
        out.write_all(&label.to_be_bytes())?;
    }
    Ok(())
}

pub fn write_pgm(mask: &LabelMask, path: &Path) -> Result<()> {
    write_with(path, "write PGM mask", |out| encode_pgm(mask, out))
}

/// `i32 height, i32 width`, then one byte per pixel: 1 where the first
/// channel of the boundary drawing is non-zero.
pub fn encode_boundary<W: Write>(boundary: &EngineBuffer, out: &mut W) -> std::io::Result<()> {
    write_header(boundary.dimensions(), out)?;
    let flags: Vec<u8> = boundary
        .pixels()
        .iter()
        .map(|p| u8::from(p[0] > 0))
        .collect();
    out.write_all(&flags)
}

pub fn write_boundary(boundary: &EngineBuffer, path: &Path) -> Result<()> {
    write_with(path, "write boundary bitmap", |out| {
        encode_boundary(boundary, out)
    })
}

/// `i32 height, i32 width`, then `(f32 x, f32 y)` of each pixel's superpixel centroid.
pub fn encode_centroids<W: Write>(result: &SegmentationResult, out: &mut W) -> Result<()> {
    encode_per_pixel(result, out, |info, buf| {
        buf.extend_from_slice(&info.centroid.0.to_le_bytes());
        buf.extend_from_slice(&info.centroid.1.to_le_bytes());
    })
}

pub fn write_centroids(result: &SegmentationResult, path: &Path) -> Result<()> {
    superpixel_lookup(result)?;
    write_encoded(path, "write centroid binary", |out| {
        encode_centroids(result, out)
    })
}

/// `i32 height, i32 width`, then `(f32, f32, f32)` mean color of each pixel's superpixel.
pub fn encode_colors<W: Write>(result: &SegmentationResult, out: &mut W) -> Result<()> {
    encode_per_pixel(result, out, |info, buf| {
        for channel in &info.mean_color[..3] {
            buf.extend_from_slice(&channel.to_le_bytes());
        }
    })
}

pub fn write_colors(result: &SegmentationResult, path: &Path) -> Result<()> {
    superpixel_lookup(result)?;
    write_encoded(path, "write color binary", |out| encode_colors(result, out))
}

/// Text table of superpixels with at least one pixel.
///
/// The count line is the full table length, zero-count entries included.
pub fn encode_summary<W: Write>(
    result: &SegmentationResult,
    color_space: ColorSpace,
    out: &mut W,
) -> std::io::Result<()> {
    writeln!(out, "# Centroid information")?;
    writeln!(out, "{}", color_space.summary_columns())?;
    writeln!(out, "{}", result.superpixels.len())?;
    for info in result.superpixels.iter().filter(|s| s.pixel_count > 0) {
        let [c0, c1, c2, alpha] = info.mean_color;
        writeln!(
            out,
            "{} {} {} {} {} {} {} {}",
            info.id, info.pixel_count, info.centroid.0, info.centroid.1, c0, c1, c2, alpha
        )?;
    }
    writeln!(out)
}

pub fn write_summary(result: &SegmentationResult, color_space: ColorSpace, path: &Path) -> Result<()> {
    write_with(path, "write superpixel summary", |out| {
        encode_summary(result, color_space, out)
    })
}

pub fn write_visualization(image: &RgbImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| match e {
            image::ImageError::IoError(source) => {
                SuperpixelError::file_system(path, "write visualization", source)
            }
            other => SuperpixelError::file_system(
                path,
                "write visualization",
                std::io::Error::other(other),
            ),
        })
}

fn write_header<W: Write>((width, height): (u32, u32), out: &mut W) -> std::io::Result<()> {
    out.write_all(&(height as i32).to_le_bytes())?;
    out.write_all(&(width as i32).to_le_bytes())
}

fn encode_per_pixel<W, F>(result: &SegmentationResult, out: &mut W, mut emit: F) -> Result<()>
where
    W: Write,
    F: FnMut(&SuperpixelInfo, &mut Vec<u8>),
{
    let lookup = superpixel_lookup(result)?;

    let mut buf = Vec::with_capacity(16);
    write_header(result.dimensions(), out)?;
    for label in result.label_mask.as_raw() {
        buf.clear();
        emit(lookup[label], &mut buf);
        out.write_all(&buf)?;
    }
    Ok(())
}

/// Active superpixels by id. Fails unless every label in the mask has one.
fn superpixel_lookup(result: &SegmentationResult) -> Result<HashMap<u16, &SuperpixelInfo>> {
    let lookup: HashMap<u16, &SuperpixelInfo> = result.active_superpixels();
    if lookup.is_empty() {
        return Err(SuperpixelError::Device {
            message: "superpixel table is empty".to_string(),
        });
    }
    if let Some(label) = result
        .label_mask
        .as_raw()
        .iter()
        .find(|label| !lookup.contains_key(*label))
    {
        return Err(SuperpixelError::Device {
            message: format!("label {label} has no superpixel entry"),
        });
    }
    Ok(lookup)
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| SuperpixelError::file_system(path, "create artifact", e))
}

fn write_with<F>(path: &Path, operation: &str, encode: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let mut out = create(path)?;
    encode(&mut out)
        .and_then(|()| out.flush())
        .map_err(|e| SuperpixelError::file_system(path, operation, e))
}

fn write_encoded<F>(path: &Path, operation: &str, encode: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let mut out = create(path)?;
    encode(&mut out).map_err(|e| match e {
        SuperpixelError::FileSystem { source, .. } => {
            SuperpixelError::file_system(path, operation, source)
        }
        other => other,
    })?;
    out.flush()
        .map_err(|e| SuperpixelError::file_system(path, operation, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn result() -> SegmentationResult {
        SegmentationResult {
            label_mask: LabelMask::from_raw(3, 2, vec![0, 0, 2, 0, 2, 2]).unwrap(),
            superpixels: vec![
                SuperpixelInfo {
                    id: 0,
                    pixel_count: 3,
                    centroid: (0.5, 0.25),
                    mean_color: [1.0, 2.0, 3.0, 255.0],
                },
                SuperpixelInfo::empty(1),
                SuperpixelInfo {
                    id: 2,
                    pixel_count: 3,
                    centroid: (1.5, 1.0),
                    mean_color: [4.0, 5.0, 6.0, 255.0],
                },
            ],
        }
    }

    fn f32s(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_pgm_header_and_big_endian_labels() {
        let mut mask = LabelMask::new(2, 1);
        mask.put_pixel(0, 0, Luma([42]));
        mask.put_pixel(1, 0, Luma([0x0102]));

        let mut bytes = Vec::new();
        encode_pgm(&mask, &mut bytes).unwrap();

        let header = b"P5\n2 1\n65535\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(&bytes[header.len()..], &[0x00, 0x2A, 0x01, 0x02]);
    }

    #[test]
    fn test_boundary_bitmap_layout() {
        let boundary = EngineBuffer::from_pixels(
            2,
            1,
            vec![[255, 255, 255, 255], [0, 0, 0, 255]],
        )
        .unwrap();
        let mut bytes = Vec::new();
        encode_boundary(&boundary, &mut bytes).unwrap();

        assert_eq!(&bytes[..4], &1i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2i32.to_le_bytes());
        assert_eq!(&bytes[8..], &[1, 0]);
    }

    #[test]
    fn test_centroids_follow_labels() {
        let mut bytes = Vec::new();
        encode_centroids(&result(), &mut bytes).unwrap();

        assert_eq!(&bytes[..4], &2i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &3i32.to_le_bytes());
        let values = f32s(&bytes[8..]);
        assert_eq!(values.len(), 12);
        assert_eq!(&values[..2], &[0.5, 0.25]);
        assert_eq!(&values[4..6], &[1.5, 1.0]);
    }

    #[test]
    fn test_colors_follow_labels() {
        let mut bytes = Vec::new();
        encode_colors(&result(), &mut bytes).unwrap();

        let values = f32s(&bytes[8..]);
        assert_eq!(values.len(), 18);
        assert_eq!(&values[6..9], &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_unknown_label_is_an_error() {
        let mut broken = result();
        broken.label_mask.put_pixel(0, 0, Luma([1]));
        assert!(encode_centroids(&broken, &mut Vec::new()).is_err());

        broken.superpixels.clear();
        assert!(encode_colors(&broken, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_broken_labels_leave_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let centroids = dir.path().join("x.png.slic.bin");
        let colors = dir.path().join("x.png.colors.bin");
        let mut broken = result();
        broken.label_mask.put_pixel(2, 1, Luma([7]));

        assert!(matches!(
            write_centroids(&broken, &centroids),
            Err(SuperpixelError::Device { .. })
        ));
        assert!(write_colors(&broken, &colors).is_err());
        assert!(!centroids.exists());
        assert!(!colors.exists());

        write_centroids(&result(), &centroids).unwrap();
        assert_eq!(std::fs::metadata(&centroids).unwrap().len(), 8 + 6 * 8);
    }

    #[test]
    fn test_summary_skips_empty_superpixels() {
        let mut bytes = Vec::new();
        encode_summary(&result(), ColorSpace::CieLab, &mut bytes).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "# Centroid information");
        assert_eq!(lines[1], "# ID NUM_PIX CX CY L A B A");
        assert_eq!(lines[2], "3");
        assert_eq!(lines[3], "0 3 0.5 0.25 1 2 3 255");
        assert_eq!(lines[4], "2 3 1.5 1 4 5 6 255");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_artifact_paths_keep_file_name() {
        let dir = Path::new("out/a/b");
        assert_eq!(
            ArtifactKind::Pgm.path_for(dir, "c.png"),
            PathBuf::from("out/a/b/c.png.slic.pgm")
        );
        assert_eq!(ArtifactKind::Centroids.to_string(), "centroids");
    }

    #[test]
    fn test_writers_overwrite_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.slic.pgm");
        std::fs::write(&path, vec![0xFF; 1024]).unwrap();

        write_pgm(&result().label_mask, &path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 13 + 6 * 2);
    }

    #[test]
    fn test_unwritable_path_is_file_system_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("x.slic.pgm");
        assert!(matches!(
            write_pgm(&result().label_mask, &path),
            Err(SuperpixelError::FileSystem { .. })
        ));
    }
}
