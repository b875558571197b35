use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use rayon::ThreadPoolBuilder;
use tracing::{error, info};

use superpixel_seg::{
    init_logging, AssetSegmenter, AssetSource, BatchReport, DeviceContext, Extension,
    ImageConfig, SlicFactory,
};

fn main() -> Result<()> {
    let config = ImageConfig::parse();
    init_logging(config.verbose);

    let (segmenter, source) = match build(&config) {
        Ok(built) => built,
        Err(e) => {
            let _ = ImageConfig::command().print_help();
            return Err(e.into());
        }
    };

    ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build_global()
        .context("Failed to build the worker pool")?;

    info!(
        input = %config.input_path.display(),
        output = %config.output_path.display(),
        threads = config.num_threads,
        "segmenting images"
    );
    let report = match source.run(&segmenter, &config.output_path) {
        Ok(report) => report,
        Err(e) => {
            let _ = ImageConfig::command().print_help();
            return Err(e)
                .with_context(|| format!("Failed to segment {}", config.input_path.display()));
        }
    };

    log_report(report);
    Ok(())
}

fn build(
    config: &ImageConfig,
) -> superpixel_seg::Result<(AssetSegmenter<SlicFactory>, AssetSource)> {
    let settings = config.engine_settings()?;
    let policy = config.resize.policy()?;
    let device = DeviceContext::new(config.engine_slots, config.num_threads)?;
    let ext = Extension::new(&config.ext)?;

    let source = if config.input_path.is_file() {
        AssetSource::File(config.input_path.clone())
    } else if config.large_scale {
        AssetSource::Tree {
            root: config.input_path.clone(),
            ext,
        }
    } else {
        AssetSource::Listing {
            root: config.input_path.clone(),
            ext,
            recursive: config.recursive,
        }
    };

    let segmenter = AssetSegmenter::new(SlicFactory, settings, policy)
        .with_artifacts(&config.artifacts)
        .with_device(device);
    Ok((segmenter, source))
}

fn log_report(report: BatchReport) {
    info!(
        succeeded = report.succeeded(),
        partial = report.partial(),
        failed = report.failed(),
        "batch finished"
    );
    for failure in report.into_failures() {
        error!(asset = %failure.asset.display(), error = ?failure.error, "asset failed");
    }
}
