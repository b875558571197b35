pub mod config;
pub mod device;
pub mod encode;
pub mod engine;
pub mod errors;
pub mod geometry;
pub mod marshal;
pub mod segmenter;
pub mod settings;
pub mod slic;
pub mod traversal;
pub mod video;

pub mod mocks;

pub use config::{ImageConfig, VideoConfig};
pub use device::DeviceContext;
pub use encode::ArtifactKind;
pub use engine::{EngineFactory, LabelMask, SegmentationEngine, SegmentationResult, SuperpixelInfo};
pub use errors::{Result, Stage, SuperpixelError};
pub use geometry::GeometryPolicy;
pub use marshal::EngineBuffer;
pub use segmenter::{AssetReport, AssetSegmenter};
pub use settings::{ColorSpace, EngineSettings, SegMethod, SizeConstraint};
pub use slic::{SlicEngine, SlicFactory};
pub use traversal::{AssetSource, BatchReport, Extension};
pub use video::{FfmpegFrames, FrameSampler, FrameSource};

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber for a binary.
///
/// `RUST_LOG` wins over `verbose`, which otherwise selects `debug` over `info`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
