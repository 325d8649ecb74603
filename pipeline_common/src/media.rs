//! Seams between the job runner and the media framework doing the work.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use inference_common::frame::Frame;
use inference_common::img_dimensions::ImgDimensions;
use inference_common::{AnnotateError, Result};

use crate::cancel::CancelToken;

/// Stream properties known before the first frame is emitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    /// Declared (or estimated) number of frames. May be inaccurate.
    pub frame_count: u64,
    pub fps: f64,
    pub dims: ImgDimensions,
}

/// Sequential decoder over one input container.
pub trait FrameSource {
    fn info(&self) -> &VideoInfo;

    /// Next frame in presentation order, `None` once the stream is exhausted.
    /// Not restartable.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Parameters a sink is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSpec {
    /// FourCC tag, e.g. `mp4v`.
    pub codec: String,
    pub fps: f64,
    pub dims: ImgDimensions,
}

impl SinkSpec {
    /// Checks everything that does not depend on the backend.
    pub fn validate(&self) -> Result<FourCc> {
        if !self.dims.is_valid() {
            return Err(AnnotateError::Io(format!(
                "invalid sink dimensions {}",
                self.dims
            )));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(AnnotateError::Io(format!("invalid sink fps {}", self.fps)));
        }
        self.codec.parse()
    }
}

/// Sequential encoder. Frames land in the file in `write` call order.
pub trait FrameSink {
    fn spec(&self) -> &SinkSpec;

    /// Fails with [`AnnotateError::DimensionMismatch`] if the frame does not
    /// match the declared dimensions.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flushes and finalizes the file. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;

    fn frames_written(&self) -> u64;

    fn check_dims(&self, frame: &Frame) -> Result<()> {
        let expected = self.spec().dims;
        let actual = frame.dims();
        if expected != actual {
            return Err(AnnotateError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }
}

/// Opens sources and sinks for one media framework.
pub trait MediaBackend: Send + Sync {
    type Source: FrameSource;
    type Sink: FrameSink;

    fn open_source(&self, path: &Path) -> Result<Self::Source>;

    fn open_sink(&self, path: &Path, spec: &SinkSpec) -> Result<Self::Sink>;
}

/// Second pass from the intermediate file to the deliverable.
pub trait Transcoder: Send + Sync {
    fn reencode(
        &self,
        input: &Path,
        output: &Path,
        codecs: &TranscodeCodecs,
        cancel: &CancelToken,
    ) -> Result<()>;
}

/// Codec tags accepted by frame sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FourCc {
    /// MPEG-4 part 2.
    Mp4v,
    /// H.264.
    Avc1,
    /// Motion JPEG.
    Mjpg,
    /// MPEG-4 part 2, Xvid flavour.
    Xvid,
}

impl FromStr for FourCc {
    type Err = AnnotateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp4v" | "fmp4" => Ok(Self::Mp4v),
            "avc1" | "h264" | "x264" => Ok(Self::Avc1),
            "mjpg" => Ok(Self::Mjpg),
            "xvid" | "divx" => Ok(Self::Xvid),
            other => Err(AnnotateError::Io(format!("unsupported codec tag `{other}`"))),
        }
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mp4v => "mp4v",
            Self::Avc1 => "avc1",
            Self::Mjpg => "mjpg",
            Self::Xvid => "xvid",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Mpeg4,
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "libx264" | "avc" => Ok(Self::H264),
            "h265" | "libx265" | "hevc" => Ok(Self::H265),
            "mpeg4" | "mp4v" => Ok(Self::Mpeg4),
            other => Err(format!("unknown video codec `{other}`")),
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Mpeg4 => "mpeg4",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    #[default]
    Aac,
    Mp3,
}

impl FromStr for AudioCodec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aac" => Ok(Self::Aac),
            "mp3" | "libmp3lame" => Ok(Self::Mp3),
            other => Err(format!("unknown audio codec `{other}`")),
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
        })
    }
}

/// Target codecs of the transcode pass. Defaults to H.264 + AAC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeCodecs {
    pub video: VideoCodec,
    pub audio: AudioCodec,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(codec: &str, w: u32, h: u32, fps: f64) -> SinkSpec {
        SinkSpec {
            codec: codec.to_string(),
            fps,
            dims: ImgDimensions::new(w, h),
        }
    }

    #[test]
    fn fourcc_is_case_insensitive() {
        assert_eq!("MP4V".parse::<FourCc>().unwrap(), FourCc::Mp4v);
        assert_eq!("h264".parse::<FourCc>().unwrap(), FourCc::Avc1);
    }

    #[test]
    fn unknown_fourcc_is_an_io_error() {
        let err = "zzzz".parse::<FourCc>().unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn sink_spec_validation() {
        assert_eq!(spec("mp4v", 640, 480, 30.0).validate().unwrap(), FourCc::Mp4v);
        assert!(spec("mp4v", 0, 480, 30.0).validate().unwrap_err().is_io());
        assert!(spec("mp4v", 640, 480, 0.0).validate().unwrap_err().is_io());
        assert!(spec("mp4v", 640, 480, f64::NAN).validate().is_err());
        assert!(spec("bogus", 640, 480, 30.0).validate().unwrap_err().is_io());
    }

    #[test]
    fn codec_names() {
        assert_eq!("libx264".parse::<VideoCodec>().unwrap(), VideoCodec::H264);
        assert_eq!("HEVC".parse::<VideoCodec>().unwrap(), VideoCodec::H265);
        assert!("vp9".parse::<VideoCodec>().is_err());
        assert_eq!("aac".parse::<AudioCodec>().unwrap(), AudioCodec::Aac);
        assert!("flac".parse::<AudioCodec>().is_err());
        assert_eq!(
            TranscodeCodecs::default(),
            TranscodeCodecs {
                video: VideoCodec::H264,
                audio: AudioCodec::Aac
            }
        );
    }
}
