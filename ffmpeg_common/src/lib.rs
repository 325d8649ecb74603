extern crate ffmpeg_next as ffmpeg;

pub mod decoder;
pub mod encoder;

use std::path::Path;

use inference_common::{AnnotateError, Result};
use pipeline_common::{MediaBackend, SinkSpec};

pub use decoder::FfmpegSource;
pub use encoder::FfmpegSink;

/// [`MediaBackend`] decoding and encoding through libav*.
#[derive(Debug, Clone, Copy)]
pub struct FfmpegBackend {
    _init: (),
}

impl FfmpegBackend {
    /// Initializes ffmpeg. Safe to call more than once.
    pub fn new() -> Result<Self> {
        ffmpeg::init().map_err(|e| AnnotateError::io("initializing ffmpeg", e))?;
        Ok(Self { _init: () })
    }
}

impl MediaBackend for FfmpegBackend {
    type Source = FfmpegSource;
    type Sink = FfmpegSink;

    fn open_source(&self, path: &Path) -> Result<FfmpegSource> {
        FfmpegSource::open(path)
    }

    fn open_sink(&self, path: &Path, spec: &SinkSpec) -> Result<FfmpegSink> {
        FfmpegSink::open(path, spec)
    }
}
