use std::path::Path;
use std::time::Duration;

use gstreamer as gst;
use gstreamer_pbutils as pbutils;
use inference_common::img_dimensions::ImgDimensions;
use inference_common::{AnnotateError, Result};

/// Stream properties of a media file, as reported by the discoverer.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub dims: ImgDimensions,
    /// `None` for variable or unknown frame rates.
    pub fps: Option<f64>,
    pub duration: Option<Duration>,
    pub has_audio: bool,
}

/// Probes `path` without decoding it fully. Requires `gst::init`.
pub fn discover(path: &Path) -> Result<FileInfo> {
    let canonical = path
        .canonicalize()
        .map_err(|e| AnnotateError::io(format!("resolving {path:?}"), e))?;
    let uri = gst::glib::filename_to_uri(&canonical, None)
        .map_err(|e| AnnotateError::io(format!("building uri for {canonical:?}"), e))?;

    let discoverer = pbutils::Discoverer::new(gst::ClockTime::from_seconds(10))
        .map_err(|e| AnnotateError::io("creating discoverer", e))?;
    let info = discoverer
        .discover_uri(&uri)
        .map_err(|e| AnnotateError::io(format!("discovering {uri}"), e))?;

    let video = info
        .video_streams()
        .into_iter()
        .next()
        .ok_or_else(|| AnnotateError::Io(format!("no video stream in {path:?}")))?;
    let framerate = video.framerate();
    let fps = (framerate.numer() > 0 && framerate.denom() > 0)
        .then(|| f64::from(framerate.numer()) / f64::from(framerate.denom()));

    Ok(FileInfo {
        dims: ImgDimensions::new(video.width(), video.height()),
        fps,
        duration: info.duration().map(Duration::from),
        has_audio: !info.audio_streams().is_empty(),
    })
}
