use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataError>;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error while {context} ({}): {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("audio error in {}: {message}", path.display())]
    Audio { path: PathBuf, message: String },
    #[error("resampling {src_hz} Hz -> {dst_hz} Hz failed: {message}")]
    Resample {
        src_hz: u32,
        dst_hz: u32,
        message: String,
    },
    #[error("tensor error during {context}: {source}")]
    Tensor {
        context: &'static str,
        #[source]
        source: candle_core::Error,
    },
    #[error("invalid configuration: {message}")]
    Config { message: String },
    #[error("dataset '{name}' has no usable examples")]
    EmptyDataset { name: String },
    #[error("missing cached feature '{feature}' for stem '{stem}' at {}", path.display())]
    MissingFeature {
        stem: String,
        feature: String,
        path: PathBuf,
    },
    /// Produced frame count disagrees with the hop-size frame grid.
    #[error("{context}: expected {expected} frames, got {actual}")]
    FrameMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl DataError {
    pub(crate) fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn audio(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Audio {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub(crate) fn resample(src_hz: u32, dst_hz: u32, err: impl std::fmt::Display) -> Self {
        Self::Resample {
            src_hz,
            dst_hz,
            message: err.to_string(),
        }
    }

    pub(crate) fn tensor(context: &'static str, source: candle_core::Error) -> Self {
        Self::Tensor { context, source }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// True for errors that indicate a broken setup rather than bad input data.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::EmptyDataset { .. }
                | Self::MissingFeature { .. }
                | Self::FrameMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_mentions_path_and_context() {
        let err = DataError::io(
            "read lengths cache",
            Path::new("/tmp/x/lengths.json"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("read lengths cache"));
        assert!(msg.contains("/tmp/x/lengths.json"));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn frame_mismatch_is_configuration_error() {
        let err = DataError::FrameMismatch {
            context: "latent upsampling",
            expected: 10,
            actual: 9,
        };
        assert!(err.is_configuration_error());
        assert_eq!(err.to_string(), "latent upsampling: expected 10 frames, got 9");
    }
}
