//! Error taxonomy shared by every stage of an annotation job.

use thiserror::Error;

use crate::img_dimensions::ImgDimensions;
use crate::job::JobStatus;

pub type Result<T> = std::result::Result<T, AnnotateError>;

#[derive(Error, Debug)]
pub enum AnnotateError {
    /// Unknown preset key. Raised before any job exists.
    #[error("a valid video must be selected (unknown preset `{key}`)")]
    InvalidSelection { key: String },

    #[error("job {id} is still running")]
    JobInProgress { id: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("frame is {actual} but the sink was opened for {expected}")]
    DimensionMismatch {
        expected: ImgDimensions,
        actual: ImgDimensions,
    },

    #[error("detection model error: {0}")]
    Model(String),

    #[error("transcode error: {0}")]
    Transcode(String),

    #[error("annotation produced no frames")]
    EmptyOutput,

    #[error("job was cancelled")]
    Cancelled,

    #[error("invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

impl AnnotateError {
    pub fn io(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Io(format!("{context}: {err}"))
    }

    pub fn transcode(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Transcode(format!("{context}: {err}"))
    }

    pub fn model(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Model(format!("{context}: {err}"))
    }

    /// Dimension mismatches are a kind of I/O failure on the sink.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::DimensionMismatch { .. })
    }

    /// Errors that are the caller's fault and leave no state behind.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSelection { .. } | Self::JobInProgress { .. }
        )
    }
}

impl From<std::io::Error> for AnnotateError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AnnotateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(format!("json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_counts_as_io() {
        let err = AnnotateError::DimensionMismatch {
            expected: ImgDimensions::new(640, 480),
            actual: ImgDimensions::new(320, 240),
        };
        assert!(err.is_io());
        assert!(err.to_string().contains("320x240"));
        assert!(err.to_string().contains("640x480"));
    }

    #[test]
    fn invalid_selection_is_a_client_error() {
        let err = AnnotateError::InvalidSelection {
            key: "video9".to_string(),
        };
        assert!(err.is_client_error());
        assert!(!err.is_io());
        assert!(err.to_string().contains("video9"));
    }

    #[test]
    fn from_std_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.mp4");
        let err: AnnotateError = io_err.into();
        assert!(matches!(err, AnnotateError::Io(msg) if msg.contains("missing.mp4")));
    }
}
