use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::{error, info};

use superpixel_seg::{
    init_logging, video, AssetSegmenter, FfmpegFrames, FrameSampler, SlicFactory, VideoConfig,
};

fn main() -> Result<()> {
    let config = VideoConfig::parse();
    init_logging(config.verbose);

    let (segmenter, sampler) = match build(&config) {
        Ok(built) => built,
        Err(e) => {
            let _ = VideoConfig::command().print_help();
            return Err(e.into());
        }
    };

    let mut frames = match FfmpegFrames::open(&config.input_path) {
        Ok(frames) => frames,
        Err(e) => {
            let _ = VideoConfig::command().print_help();
            return Err(e)
                .with_context(|| format!("Failed to open video {}", config.input_path.display()));
        }
    };

    info!(
        video = %config.input_path.display(),
        output = %config.output_path.display(),
        step = sampler.step(),
        "segmenting video frames"
    );
    let report = match video::segment_frames(
        &segmenter,
        &mut frames,
        sampler,
        &config.input_path,
        &config.output_path,
    ) {
        Ok(report) => report,
        Err(e) => {
            let _ = VideoConfig::command().print_help();
            return Err(e)
                .with_context(|| format!("Failed to segment {}", config.input_path.display()));
        }
    };

    info!(
        succeeded = report.succeeded(),
        partial = report.partial(),
        failed = report.failed(),
        "video finished"
    );
    for failure in report.into_failures() {
        error!(frame = %failure.asset.display(), error = ?failure.error, "frame failed");
    }
    Ok(())
}

fn build(config: &VideoConfig) -> superpixel_seg::Result<(AssetSegmenter<SlicFactory>, FrameSampler)> {
    let settings = config.engine_settings()?;
    let policy = config.resize.policy()?;
    let sampler = FrameSampler::new(config.sampling_rate)?;

    let segmenter =
        AssetSegmenter::new(SlicFactory, settings, policy).with_artifacts(&config.artifacts);
    Ok((segmenter, sampler))
}
