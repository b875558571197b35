//! Sampled video frames as assets.
//!
//! Frames are decoded by an `ffmpeg` child process into raw `rgb24` frames on
//! its stdout. The k-th sampled frame is `trunc(k * step)`, so with a step
//! below one the same frame is sampled again and its artifacts overwritten.

use std::io::{self, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use image::RgbImage;
use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::engine::EngineFactory;
use crate::errors::{Result, Stage, SuperpixelError};
use crate::segmenter::AssetSegmenter;
use crate::traversal::{ensure_dir, BatchReport};

/// Yields sampled frame indices `trunc(k * step)` for k = 0, 1, 2, ...
#[derive(Debug, Clone)]
pub struct FrameSampler {
    step: f64,
    k: u64,
}

impl FrameSampler {
    pub fn new(step: f64) -> Result<Self> {
        if !step.is_finite() || step <= 0.0 {
            return Err(SuperpixelError::configuration(format!(
                "sampling rate must be a positive number, got {step}"
            )));
        }
        Ok(Self { step, k: 0 })
    }

    pub const fn step(&self) -> f64 {
        self.step
    }
}

impl Iterator for FrameSampler {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let index = (self.k as f64 * self.step).trunc();
        if index >= u64::MAX as f64 {
            return None;
        }
        self.k += 1;
        Some(index as u64)
    }
}

/// A stream of decoded frames read in non-decreasing index order.
pub trait FrameSource {
    fn dimensions(&self) -> (u32, u32);

    /// The frame at `index`, or `None` past the end of the stream.
    fn frame(&mut self, index: u64) -> Result<Option<RgbImage>>;
}

/// Packed `rgb24` frames back to back in a byte stream.
pub struct RawFrames<R> {
    reader: R,
    dims: (u32, u32),
    position: u64,
    last: Option<(u64, RgbImage)>,
}

impl<R: Read> RawFrames<R> {
    pub fn new(reader: R, (width, height): (u32, u32)) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SuperpixelError::InvalidAsset {
                width: width.into(),
                height: height.into(),
                reason: "video frames must be non-empty".to_string(),
            });
        }
        Ok(Self {
            reader,
            dims: (width, height),
            position: 0,
            last: None,
        })
    }

    fn frame_len(&self) -> usize {
        self.dims.0 as usize * self.dims.1 as usize * 3
    }

    fn read_next(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.frame_len()];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {
                self.position += 1;
                Ok(Some(buf))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(SuperpixelError::file_system("<frame stream>", "read frame", e)),
        }
    }
}

impl<R: Read> FrameSource for RawFrames<R> {
    fn dimensions(&self) -> (u32, u32) {
        self.dims
    }

    fn frame(&mut self, index: u64) -> Result<Option<RgbImage>> {
        if let Some((last, image)) = &self.last {
            if *last == index {
                return Ok(Some(image.clone()));
            }
        }
        if index < self.position {
            return Err(SuperpixelError::configuration(format!(
                "frame {index} requested after frame {}",
                self.position - 1
            )));
        }

        let mut data = None;
        while self.position <= index {
            data = match self.read_next()? {
                Some(buf) => Some(buf),
                None => return Ok(None),
            };
        }

        let (width, height) = self.dims;
        let image = data
            .and_then(|buf| RgbImage::from_raw(width, height, buf))
            .ok_or_else(|| SuperpixelError::Device {
                message: format!("frame {index} could not be decoded"),
            })?;
        self.last = Some((index, image.clone()));
        Ok(Some(image))
    }
}

/// Frames decoded by an `ffmpeg` child process.
///
/// The end of the stream is only a clean end if the decoder exits with
/// success; otherwise its stderr is reported as a load error.
pub struct FfmpegFrames {
    path: PathBuf,
    child: Child,
    stderr: Option<JoinHandle<String>>,
    frames: RawFrames<BufReader<ChildStdout>>,
}

impl FfmpegFrames {
    pub fn open(path: &Path) -> Result<Self> {
        let dims = probe_dimensions(path)?;
        let mut command = Command::new("ffmpeg");
        command
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"]);
        Self::spawn(command, path, dims)
    }

    /// Runs `command` as the decoder of `path`, reading `rgb24` frames of `dims` from its stdout.
    fn spawn(mut command: Command, path: &Path, dims: (u32, u32)) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| load_error(path, e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| load_error(path, io::Error::new(ErrorKind::BrokenPipe, "ffmpeg has no stdout")))?;
        // Drained on its own thread so a chatty decoder never blocks on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut bytes = Vec::new();
                let _ = pipe.read_to_end(&mut bytes);
                String::from_utf8_lossy(&bytes).trim().to_string()
            })
        });

        debug!(video = %path.display(), width = dims.0, height = dims.1, "decoding video");
        Ok(Self {
            path: path.to_path_buf(),
            child,
            stderr,
            frames: RawFrames::new(BufReader::new(stdout), dims)?,
        })
    }

    fn check_exit(&mut self) -> Result<()> {
        let status = self.child.wait().map_err(|e| load_error(&self.path, e))?;
        if status.success() {
            return Ok(());
        }
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        Err(load_error(
            &self.path,
            io::Error::other(format!("ffmpeg exited with {status}: {stderr}")),
        ))
    }
}

impl FrameSource for FfmpegFrames {
    fn dimensions(&self) -> (u32, u32) {
        self.frames.dimensions()
    }

    fn frame(&mut self, index: u64) -> Result<Option<RgbImage>> {
        match self.frames.frame(index)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                self.check_exit()?;
                Ok(None)
            }
        }
    }
}

impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        // Sampling may stop before ffmpeg reaches the end of the stream.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Reads the first video stream's frame size with `ffprobe`.
pub fn probe_dimensions(path: &Path) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .map_err(|e| load_error(path, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(load_error(
            path,
            io::Error::new(ErrorKind::InvalidData, stderr.trim().to_string()),
        ));
    }
    parse_dimensions(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| load_error(path, io::Error::new(ErrorKind::InvalidData, "no video stream")))
}

fn parse_dimensions(probe: &str) -> Option<(u32, u32)> {
    let line = probe.lines().next()?.trim();
    let (width, height) = line.split_once('x')?;
    Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
}

fn load_error(path: &Path, source: io::Error) -> SuperpixelError {
    SuperpixelError::AssetLoad {
        path: path.to_path_buf(),
        source: Box::new(source),
    }
}

/// File name the artifacts of sampled frame `index` are named after.
pub fn frame_file_name(index: u64) -> String {
    format!("img_{index:06}.png")
}

/// Segments sampled frames of `frames` into `output_root` with one engine.
///
/// Settings and dimensions are constant across a video, so the engine is
/// created once. A frame that fails to segment is recorded and sampling goes
/// on; a frame that fails to decode ends the video. A stream without a single
/// frame is a load error.
pub fn segment_frames<F: EngineFactory, S: FrameSource>(
    segmenter: &AssetSegmenter<F>,
    frames: &mut S,
    sampler: FrameSampler,
    video: &Path,
    output_root: &Path,
) -> Result<BatchReport> {
    ensure_dir(output_root)?;

    let (width, height) = frames.dimensions();
    let dims = segmenter
        .policy()
        .normalize(width.into(), height.into())
        .map_err(|e| e.at(video, Stage::Normalize))?;
    let mut engine = segmenter
        .create_engine(dims)
        .map_err(|e| e.at(video, Stage::Segment))?;

    let report = BatchReport::default();
    let spinner = ProgressBar::new_spinner();

    for index in sampler {
        let frame = match frames.frame(index).map_err(|e| e.at(video, Stage::Load))? {
            Some(frame) => frame,
            None if report.total() == 0 => {
                spinner.finish_and_clear();
                let empty = io::Error::new(ErrorKind::InvalidData, "no frames decoded");
                return Err(load_error(video, empty).at(video, Stage::Load));
            }
            None => break,
        };
        let name = frame_file_name(index);
        let asset = PathBuf::from(&name);

        let outcome = segmenter
            .normalize(frame)
            .map_err(|e| e.at(&asset, Stage::Normalize))
            .and_then(|image| segmenter.segment_with(&mut engine, &image, &asset, output_root, &name));
        report.record(&asset, outcome);
        spinner.inc(1);
    }

    spinner.finish_and_clear();
    info!(video = %video.display(), frames = report.total(), "video segmented");
    Ok(report)
}
