//! Asset discovery and parallel fan-out over an input tree.
//!
//! Every asset's artifacts land in the output directory that mirrors the
//! asset's input directory. Output directories are created before any asset
//! beneath them is segmented.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::engine::EngineFactory;
use crate::errors::{Result, SuperpixelError};
use crate::segmenter::{AssetReport, AssetSegmenter};

/// File extension filter. Leading period optional, ASCII case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension(String);

impl Extension {
    pub fn new(ext: &str) -> Result<Self> {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        if ext.is_empty() {
            return Err(SuperpixelError::configuration("file extension must not be empty"));
        }
        Ok(Self(ext.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.0))
    }
}

/// Where the assets of a batch come from.
#[derive(Debug, Clone)]
pub enum AssetSource {
    /// One image, segmented straight into the output root.
    File(PathBuf),
    /// Matching files collected up front, optionally from all subdirectories.
    /// The whole list is held in memory.
    Listing {
        root: PathBuf,
        ext: Extension,
        recursive: bool,
    },
    /// Depth-first streaming walk for trees too large to list.
    Tree { root: PathBuf, ext: Extension },
}

impl AssetSource {
    /// Segments every asset of the source. Per-asset failures are recorded
    /// in the report; only problems with the roots themselves are returned
    /// as errors.
    pub fn run<F: EngineFactory>(
        &self,
        segmenter: &AssetSegmenter<F>,
        output_root: &Path,
    ) -> Result<BatchReport> {
        let report = BatchReport::default();
        ensure_dir(output_root)?;

        match self {
            Self::File(path) => {
                if !path.is_file() {
                    return Err(not_found(path, "input file does not exist"));
                }
                report.record(path, segmenter.segment_file(path, output_root));
            }
            Self::Listing {
                root,
                ext,
                recursive,
            } => {
                let assets = collect_assets(root, ext, *recursive)?;
                run_listing(segmenter, root, output_root, &assets, &report);
            }
            Self::Tree { root, ext } => {
                if !root.is_dir() {
                    return Err(not_found(root, "input directory does not exist"));
                }
                let spinner = ProgressBar::new_spinner();
                walk_tree(segmenter, root, output_root, ext, &report, &spinner);
                spinner.finish_and_clear();
            }
        }

        Ok(report)
    }
}

/// Lists matching files under `root`, sorted by path.
pub fn collect_assets(root: &Path, ext: &Extension, recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(not_found(root, "input directory does not exist"));
    }

    let mut walker = WalkDir::new(root).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut assets: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && ext.matches(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    assets.sort();

    debug!(root = %root.display(), count = assets.len(), "collected assets");
    Ok(assets)
}

fn run_listing<F: EngineFactory>(
    segmenter: &AssetSegmenter<F>,
    input_root: &Path,
    output_root: &Path,
    assets: &[PathBuf],
    report: &BatchReport,
) {
    if assets.is_empty() {
        info!(root = %input_root.display(), "no matching assets found");
        return;
    }

    let pb = ProgressBar::new(assets.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    assets.par_iter().for_each(|asset| {
        let outcome = asset_output_dir(input_root, output_root, asset).and_then(|out_dir| {
            ensure_dir(&out_dir)?;
            segmenter.segment_file(asset, &out_dir)
        });
        report.record(asset, outcome);
        pb.inc(1);
    });

    pb.finish_and_clear();
}

fn walk_tree<F: EngineFactory>(
    segmenter: &AssetSegmenter<F>,
    dir: &Path,
    out_dir: &Path,
    ext: &Extension,
    report: &BatchReport,
    spinner: &ProgressBar,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            report.record_failure(dir, SuperpixelError::file_system(dir, "read directory", e));
            return;
        }
    };

    rayon::scope(|scope| {
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report.record_failure(dir, SuperpixelError::file_system(dir, "read directory entry", e));
                    continue;
                }
            };
            let path = entry.path();
            let is_dir = match entry.file_type() {
                Ok(file_type) => file_type.is_dir(),
                Err(e) => {
                    report.record_failure(&path, SuperpixelError::file_system(&path, "stat", e));
                    continue;
                }
            };

            if is_dir {
                let child_out = out_dir.join(entry.file_name());
                if let Err(e) = ensure_dir(&child_out) {
                    report.record_failure(&path, e);
                    continue;
                }
                scope.spawn(move |_| walk_tree(segmenter, &path, &child_out, ext, report, spinner));
            } else if ext.matches(&path) {
                scope.spawn(move |_| {
                    report.record(&path, segmenter.segment_file(&path, out_dir));
                    spinner.inc(1);
                });
            }
        }
    });
}

/// Output directory mirroring the directory that holds `asset`.
pub fn asset_output_dir(input_root: &Path, output_root: &Path, asset: &Path) -> Result<PathBuf> {
    let relative = asset.strip_prefix(input_root).map_err(|_| {
        SuperpixelError::file_system(
            asset,
            "mirror output path",
            std::io::Error::new(ErrorKind::InvalidInput, "asset is outside the input root"),
        )
    })?;

    Ok(match relative.parent() {
        Some(parent) => output_root.join(parent),
        None => output_root.to_path_buf(),
    })
}

/// Creates `path` and its parents. Safe to race: an existing directory is success.
pub fn ensure_dir(path: &Path) -> Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(SuperpixelError::file_system(path, "create output directory", e)),
    }
}

fn not_found(path: &Path, message: &str) -> SuperpixelError {
    SuperpixelError::file_system(path, "open input", std::io::Error::new(ErrorKind::NotFound, message))
}

#[derive(Debug)]
pub struct AssetFailure {
    pub asset: PathBuf,
    pub error: SuperpixelError,
}

/// Outcome counts of a batch, safe to update from many workers.
#[derive(Debug, Default)]
pub struct BatchReport {
    succeeded: AtomicUsize,
    partial: AtomicUsize,
    failures: Mutex<Vec<AssetFailure>>,
}

impl BatchReport {
    pub fn record(&self, asset: &Path, outcome: Result<AssetReport>) {
        match outcome {
            Ok(report) if report.is_complete() => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(report) => {
                let failed: Vec<_> = report.failed_artifacts().map(|a| a.kind).collect();
                warn!(asset = %asset.display(), artifacts = ?failed, "asset written partially");
                self.partial.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.record_failure(asset, e),
        }
    }

    pub fn record_failure(&self, asset: &Path, error: SuperpixelError) {
        error!(asset = %asset.display(), error = %error, "failed to segment asset");
        self.failures.lock().push(AssetFailure {
            asset: asset.to_path_buf(),
            error,
        });
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Assets segmented with at least one artifact missing.
    pub fn partial(&self) -> usize {
        self.partial.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failures.lock().len()
    }

    pub fn total(&self) -> usize {
        self.succeeded() + self.partial() + self.failed()
    }

    pub fn into_failures(self) -> Vec<AssetFailure> {
        self.failures.into_inner()
    }
}
