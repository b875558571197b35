use clap::{Args, Parser};
use std::path::PathBuf;
use std::thread;

use crate::encode::ArtifactKind;
use crate::errors::{Result, SuperpixelError};
use crate::geometry::GeometryPolicy;
use crate::settings::EngineSettings;

/// Clustering options shared by both entry points.
///
/// `color_space` and `seg_method` stay strings here; `EngineSettings::from_options`
/// rejects unknown values.
#[derive(Args, Clone, Debug)]
pub struct SlicOptions {
    /// Number of superpixels to segment into. Used with --seg-method GIVEN_NUM.
    #[arg(long, default_value_t = 128)]
    pub num_segs: i32,

    /// Size of superpixels in pixels. Used with --seg-method GIVEN_SIZE.
    #[arg(long, default_value_t = 256)]
    pub spixel_size: i32,

    /// Color cohesion weight
    #[arg(long, default_value_t = 0.6)]
    pub coh_weight: f32,

    /// Number of clustering iterations
    #[arg(long, default_value_t = 5)]
    pub num_iters: i32,

    /// 'XYZ', 'RGB', or 'CIELAB'. Color space in which to perform clustering
    #[arg(long, default_value = "XYZ")]
    pub color_space: String,

    /// 'GIVEN_SIZE' or 'GIVEN_NUM'. Segmentation constraint
    #[arg(long, default_value = "GIVEN_SIZE")]
    pub seg_method: String,

    /// Disables enforcement of superpixel connectivity
    #[arg(long)]
    pub no_enforce: bool,
}

impl Default for SlicOptions {
    fn default() -> Self {
        Self {
            num_segs: 128,
            spixel_size: 256,
            coh_weight: 0.6,
            num_iters: 5,
            color_space: "XYZ".to_string(),
            seg_method: "GIVEN_SIZE".to_string(),
            no_enforce: false,
        }
    }
}

#[derive(Args, Clone, Debug, Default)]
pub struct ResizeOptions {
    /// Scale factor to resize the images with
    #[arg(long, conflicts_with = "max_sidelen")]
    pub scale: Option<f64>,

    /// Maximum side-length to resize the images to (preserving aspect ratio)
    #[arg(long)]
    pub max_sidelen: Option<f64>,
}

impl ResizeOptions {
    pub fn policy(&self) -> Result<GeometryPolicy> {
        match (self.scale, self.max_sidelen) {
            (Some(_), Some(_)) => Err(SuperpixelError::configuration(
                "--scale and --max-sidelen are mutually exclusive",
            )),
            (None, Some(length)) => GeometryPolicy::max_side_length(length),
            (Some(factor), None) => GeometryPolicy::fixed_scale(factor),
            (None, None) => GeometryPolicy::fixed_scale(1.0),
        }
    }
}

/// Image segmenter configuration.
#[derive(Parser, Clone, Debug)]
#[command(version, about = "Segment images into superpixels", long_about = None)]
pub struct ImageConfig {
    /// Image file or directory of images to segment
    #[arg(long)]
    pub input_path: PathBuf,

    /// Directory to write the segmentations to
    #[arg(long)]
    pub output_path: PathBuf,

    /// File extension of images to segment (leading period optional)
    #[arg(long)]
    pub ext: String,

    /// Simple recursion into subdirectories (loads all paths into memory)
    #[arg(long, conflicts_with = "large_scale")]
    pub recursive: bool,

    /// Streaming recursion into subdirectories (for large-scale datasets)
    #[arg(long)]
    pub large_scale: bool,

    #[command(flatten)]
    pub resize: ResizeOptions,

    #[command(flatten)]
    pub slic: SlicOptions,

    /// Artifacts to write for every image
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [ArtifactKind::Viz, ArtifactKind::Pgm]
    )]
    pub artifacts: Vec<ArtifactKind>,

    /// Number of worker threads
    #[arg(long, default_value_t = default_num_threads())]
    pub num_threads: usize,

    /// Number of engines allowed on the device at once
    #[arg(long, default_value_t = 1)]
    pub engine_slots: usize,

    /// Verbosity
    #[arg(short, long)]
    pub verbose: bool,
}

impl ImageConfig {
    pub fn engine_settings(&self) -> Result<EngineSettings> {
        EngineSettings::from_options(&self.slic)
    }
}

/// Video segmenter configuration.
#[derive(Parser, Clone, Debug)]
#[command(version, about = "Segment sampled video frames into superpixels", long_about = None)]
pub struct VideoConfig {
    /// Video file to sample
    #[arg(long)]
    pub input_path: PathBuf,

    /// Directory to save segmented frames
    #[arg(long)]
    pub output_path: PathBuf,

    /// How frequently to sample the video, in frames
    #[arg(long)]
    pub sampling_rate: f64,

    #[command(flatten)]
    pub resize: ResizeOptions,

    #[command(flatten)]
    pub slic: SlicOptions,

    /// Artifacts to write for every sampled frame
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [ArtifactKind::Pgm, ArtifactKind::Centers, ArtifactKind::Viz]
    )]
    pub artifacts: Vec<ArtifactKind>,

    /// Verbosity
    #[arg(short, long)]
    pub verbose: bool,
}

impl VideoConfig {
    pub fn engine_settings(&self) -> Result<EngineSettings> {
        EngineSettings::from_options(&self.slic)
    }
}

fn default_num_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_config_defaults() {
        let config = ImageConfig::try_parse_from([
            "superpixel-seg",
            "--input-path",
            "in",
            "--output-path",
            "out",
            "--ext",
            ".png",
        ])
        .unwrap();

        assert_eq!(config.slic.num_segs, 128);
        assert_eq!(config.slic.spixel_size, 256);
        assert_eq!(config.slic.num_iters, 5);
        assert_eq!(config.slic.color_space, "XYZ");
        assert_eq!(config.slic.seg_method, "GIVEN_SIZE");
        assert!(!config.slic.no_enforce);
        assert_eq!(config.artifacts, vec![ArtifactKind::Viz, ArtifactKind::Pgm]);
        assert_eq!(config.engine_slots, 1);
        assert_eq!(
            config.resize.policy().unwrap(),
            GeometryPolicy::FixedScale(1.0)
        );
    }

    #[test]
    fn test_mutually_exclusive_options() {
        let scale_and_sidelen = ImageConfig::try_parse_from([
            "superpixel-seg",
            "--input-path",
            "in",
            "--output-path",
            "out",
            "--ext",
            "png",
            "--scale",
            "0.5",
            "--max-sidelen",
            "100",
        ]);
        assert!(scale_and_sidelen.is_err());

        let both_recursions = ImageConfig::try_parse_from([
            "superpixel-seg",
            "--input-path",
            "in",
            "--output-path",
            "out",
            "--ext",
            "png",
            "--recursive",
            "--large-scale",
        ]);
        assert!(both_recursions.is_err());
    }

    #[test]
    fn test_missing_required_arguments() {
        assert!(ImageConfig::try_parse_from(["superpixel-seg", "--input-path", "in"]).is_err());
        assert!(VideoConfig::try_parse_from([
            "video-segmenter",
            "--input-path",
            "in.mp4",
            "--output-path",
            "out"
        ])
        .is_err());
    }

    #[test]
    fn test_video_config_artifacts() {
        let config = VideoConfig::try_parse_from([
            "video-segmenter",
            "--input-path",
            "in.mp4",
            "--output-path",
            "out",
            "--sampling-rate",
            "2.5",
            "--max-sidelen",
            "320",
            "--artifacts",
            "pgm,colors",
        ])
        .unwrap();

        assert_eq!(config.sampling_rate, 2.5);
        assert_eq!(
            config.artifacts,
            vec![ArtifactKind::Pgm, ArtifactKind::Colors]
        );
        assert_eq!(
            config.resize.policy().unwrap(),
            GeometryPolicy::MaxSideLength(320.0)
        );
    }
}
