use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pipeline stage an asset was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Normalize,
    MarshalIn,
    Segment,
    MarshalOut,
    Encode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Normalize => "normalize",
            Stage::MarshalIn => "marshal-in",
            Stage::Segment => "segment",
            Stage::MarshalOut => "marshal-out",
            Stage::Encode => "encode",
        };
        f.write_str(name)
    }
}

/// Structured error types for the segmentation pipeline.
///
/// Each variant carries the context of its error domain so callers can report
/// the failing asset or setting without parsing strings. `Asset` wraps any of
/// the others once the orchestrator knows which asset and stage failed.
#[derive(Error, Debug)]
pub enum SuperpixelError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Failed to load asset {path:?}")]
    AssetLoad {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Invalid asset geometry {width}x{height}: {reason}")]
    InvalidAsset {
        width: i64,
        height: i64,
        reason: String,
    },

    #[error(
        "Buffer dimension mismatch: expected {}x{}, got {}x{}",
        expected.0, expected.1, actual.0, actual.1
    )]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Asset {path:?} failed during {stage}")]
    Asset {
        path: PathBuf,
        stage: Stage,
        #[source]
        source: Box<SuperpixelError>,
    },
}

pub type Result<T> = std::result::Result<T, SuperpixelError>;

impl SuperpixelError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Attaches asset identity and stage. Already-wrapped errors are returned unchanged.
    pub fn at(self, path: impl Into<PathBuf>, stage: Stage) -> Self {
        match self {
            wrapped @ Self::Asset { .. } => wrapped,
            other => Self::Asset {
                path: path.into(),
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping any `Asset` wrapper.
    pub fn kind(&self) -> &SuperpixelError {
        match self {
            Self::Asset { source, .. } => source.kind(),
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.kind(), Self::Configuration { .. })
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should build `FileSystem` directly.
impl From<std::io::Error> for SuperpixelError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to load errors for an unknown path.
impl From<image::ImageError> for SuperpixelError {
    fn from(err: image::ImageError) -> Self {
        Self::AssetLoad {
            path: PathBuf::from("unknown"),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_wrapping_is_not_nested() {
        let err = SuperpixelError::configuration("bad")
            .at("a.png", Stage::Load)
            .at("b.png", Stage::Encode);

        match &err {
            SuperpixelError::Asset { path, stage, .. } => {
                assert_eq!(path, &PathBuf::from("a.png"));
                assert_eq!(*stage, Stage::Load);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_configuration());
    }

    #[test]
    fn test_display_messages() {
        let err = SuperpixelError::DimensionMismatch {
            expected: (4, 3),
            actual: (2, 3),
        };
        assert_eq!(
            err.to_string(),
            "Buffer dimension mismatch: expected 4x3, got 2x3"
        );
        assert_eq!(Stage::MarshalOut.to_string(), "marshal-out");
    }
}
