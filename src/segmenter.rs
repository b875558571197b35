use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::{imageops, imageops::FilterType, RgbImage};
use tracing::{debug, warn};

use crate::device::DeviceContext;
use crate::encode::{self, ArtifactKind, ArtifactOutcome};
use crate::engine::{EngineFactory, SegmentationEngine, SegmentationResult};
use crate::errors::{Result, Stage, SuperpixelError};
use crate::geometry::GeometryPolicy;
use crate::marshal::{self, EngineBuffer};
use crate::settings::EngineSettings;

/// What happened to one asset.
#[derive(Debug)]
pub struct AssetReport {
    pub asset: PathBuf,
    pub dimensions: (u32, u32),
    pub superpixels: usize,
    pub artifacts: Vec<ArtifactOutcome>,
}

impl AssetReport {
    /// True when every requested artifact was written.
    pub fn is_complete(&self) -> bool {
        self.artifacts.iter().all(ArtifactOutcome::is_ok)
    }

    pub fn failed_artifacts(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.artifacts.iter().filter(|a| !a.is_ok())
    }
}

/// Runs the per-asset pipeline: load, normalize, marshal in, segment,
/// marshal out, encode.
///
/// Shared by all traversal workers. The settings are fixed at construction;
/// each asset gets its own engine and buffers.
pub struct AssetSegmenter<F: EngineFactory> {
    factory: F,
    settings: Arc<EngineSettings>,
    policy: GeometryPolicy,
    artifacts: Vec<ArtifactKind>,
    device: DeviceContext,
}

impl<F: EngineFactory> AssetSegmenter<F> {
    pub fn new(factory: F, settings: EngineSettings, policy: GeometryPolicy) -> Self {
        Self {
            factory,
            settings: Arc::new(settings),
            policy,
            artifacts: vec![ArtifactKind::Viz, ArtifactKind::Pgm],
            device: DeviceContext::exclusive(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: &[ArtifactKind]) -> Self {
        let mut artifacts = artifacts.to_vec();
        artifacts.sort_unstable();
        artifacts.dedup();
        self.artifacts = artifacts;
        self
    }

    pub fn with_device(mut self, device: DeviceContext) -> Self {
        self.device = device;
        self
    }

    pub const fn policy(&self) -> GeometryPolicy {
        self.policy
    }

    pub fn artifacts(&self) -> &[ArtifactKind] {
        &self.artifacts
    }

    /// Segments the image at `input`, writing artifacts into `output_dir`
    /// named after the input's file name.
    pub fn segment_file(&self, input: &Path, output_dir: &Path) -> Result<AssetReport> {
        debug!(asset = %input.display(), "segmenting image");

        let image = load_image(input).map_err(|e| e.at(input, Stage::Load))?;
        let file_name = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SuperpixelError::configuration("asset path has no file name").at(input, Stage::Load)
            })?;

        self.segment_image(image, input, output_dir, &file_name)
    }

    /// Segments an already decoded raster with a fresh engine.
    pub fn segment_image(
        &self,
        image: RgbImage,
        asset: &Path,
        output_dir: &Path,
        file_name: &str,
    ) -> Result<AssetReport> {
        let image = self.normalize(image).map_err(|e| e.at(asset, Stage::Normalize))?;
        let mut engine = self
            .create_engine(image.dimensions())
            .map_err(|e| e.at(asset, Stage::Segment))?;

        self.segment_with(&mut engine, &image, asset, output_dir, file_name)
    }

    /// Resizes `image` to the policy's target dimensions. The original is consumed.
    pub fn normalize(&self, image: RgbImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        let target = self.policy.normalize(width.into(), height.into())?;
        if target == (width, height) {
            return Ok(image);
        }
        Ok(imageops::resize(&image, target.0, target.1, FilterType::Triangle))
    }

    /// Creates an engine on the device for `dims`.
    pub fn create_engine(&self, dims: (u32, u32)) -> Result<F::Engine> {
        self.device.run(|| self.factory.create(&self.settings, dims))?
    }

    /// Runs marshal-in through encode on an engine that matches `image`.
    pub fn segment_with(
        &self,
        engine: &mut F::Engine,
        image: &RgbImage,
        asset: &Path,
        output_dir: &Path,
        file_name: &str,
    ) -> Result<AssetReport> {
        let mut input = EngineBuffer::new(image.width(), image.height());
        marshal::to_engine_buffer(image, &mut input).map_err(|e| e.at(asset, Stage::MarshalIn))?;

        let drawn = self
            .run_engine(engine, &input)
            .map_err(|e| e.at(asset, Stage::Segment))?;

        let viz = drawn
            .viz
            .map(|buffer| {
                let mut host = RgbImage::new(buffer.width(), buffer.height());
                marshal::from_engine_buffer(&buffer, &mut host).map(|()| host)
            })
            .transpose()
            .map_err(|e| e.at(asset, Stage::MarshalOut))?;

        let inconsistent = drawn.result.inconsistent_labels();
        if !inconsistent.is_empty() {
            warn!(
                asset = %asset.display(),
                labels = ?inconsistent,
                "label mask references superpixels without pixels"
            );
        }

        let outputs = Outputs {
            engine: &*engine,
            result: &drawn.result,
            viz: viz.as_ref(),
            boundary: drawn.boundary.as_ref(),
        };
        let artifacts = self
            .artifacts
            .iter()
            .map(|&kind| {
                let path = kind.path_for(output_dir, file_name);
                let result = self.encode(kind, &outputs, &path);
                if let Err(e) = &result {
                    warn!(asset = %asset.display(), artifact = %kind, error = %e, "failed to write artifact");
                }
                ArtifactOutcome { kind, path, result }
            })
            .collect();

        debug!(asset = %asset.display(), output = %output_dir.display(), "segmentations written");

        Ok(AssetReport {
            asset: asset.to_path_buf(),
            dimensions: image.dimensions(),
            superpixels: drawn.result.active_superpixels().len(),
            artifacts,
        })
    }

    fn run_engine(&self, engine: &mut F::Engine, input: &EngineBuffer) -> Result<Drawn> {
        let draw_viz = self.artifacts.contains(&ArtifactKind::Viz);
        let draw_boundary = self.artifacts.contains(&ArtifactKind::Boundary);

        self.device.run(|| {
            let (width, height) = input.dimensions();
            let started = Instant::now();
            engine.process(input)?;
            debug!(elapsed_ms = started.elapsed().as_millis() as u64, "segmentation finished");

            let viz = if draw_viz {
                let mut out = EngineBuffer::new(width, height);
                engine.draw_result(&mut out)?;
                Some(out)
            } else {
                None
            };
            let boundary = if draw_boundary {
                let mut out = EngineBuffer::new(width, height);
                engine.draw_boundary(&mut out)?;
                Some(out)
            } else {
                None
            };

            Ok(Drawn {
                result: engine.result(),
                viz,
                boundary,
            })
        })?
    }

    fn encode(&self, kind: ArtifactKind, outputs: &Outputs<'_, F::Engine>, path: &Path) -> Result<()> {
        match kind {
            ArtifactKind::Viz => match outputs.viz {
                Some(image) => encode::write_visualization(image, path),
                None => Err(missing(kind)),
            },
            ArtifactKind::Pgm => outputs.engine.write_mask_as_pgm(path),
            ArtifactKind::Centers => {
                encode::write_summary(outputs.result, self.settings.color_space, path)
            }
            ArtifactKind::Centroids => encode::write_centroids(outputs.result, path),
            ArtifactKind::Colors => encode::write_colors(outputs.result, path),
            ArtifactKind::Boundary => match outputs.boundary {
                Some(buffer) => encode::write_boundary(buffer, path),
                None => Err(missing(kind)),
            },
        }
    }
}

struct Drawn {
    result: SegmentationResult,
    viz: Option<EngineBuffer>,
    boundary: Option<EngineBuffer>,
}

struct Outputs<'a, E> {
    engine: &'a E,
    result: &'a SegmentationResult,
    viz: Option<&'a RgbImage>,
    boundary: Option<&'a EngineBuffer>,
}

fn missing(kind: ArtifactKind) -> SuperpixelError {
    SuperpixelError::Device {
        message: format!("engine produced no drawing for the {kind} artifact"),
    }
}

fn load_image(path: &Path) -> Result<RgbImage> {
    image::open(path)
        .map(|image| image.into_rgb8())
        .map_err(|e| SuperpixelError::AssetLoad {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
}
