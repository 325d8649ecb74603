//! Second pass: re-encode the annotated file into an MP4 with the requested codecs.

use std::path::Path;

use gstreamer::{self as gst};
use gstreamer::{prelude::*, MessageView};
use inference_common::{AnnotateError, Result};
use pipeline_common::{AudioCodec, CancelToken, TranscodeCodecs, Transcoder, VideoCodec};

use crate::discovery;

/// Encoder and parser element for a video codec.
fn video_elements(codec: VideoCodec) -> (&'static str, &'static str) {
    match codec {
        VideoCodec::H264 => ("x264enc", "h264parse"),
        VideoCodec::H265 => ("x265enc", "h265parse"),
        VideoCodec::Mpeg4 => ("avenc_mpeg4", "mpeg4videoparse"),
    }
}

fn audio_elements(codec: AudioCodec) -> (&'static str, &'static str) {
    match codec {
        AudioCodec::Aac => ("avenc_aac", "aacparse"),
        AudioCodec::Mp3 => ("lamemp3enc", "mpegaudioparse"),
    }
}

/// Every element factory the pipeline for `codecs` instantiates.
pub fn required_elements(codecs: &TranscodeCodecs, has_audio: bool) -> Vec<&'static str> {
    let (venc, vparse) = video_elements(codecs.video);
    let mut elements = vec![
        "filesrc",
        "decodebin",
        "queue",
        "videoconvert",
        venc,
        vparse,
        "mp4mux",
        "filesink",
    ];
    if has_audio {
        let (aenc, aparse) = audio_elements(codecs.audio);
        elements.extend(["audioconvert", "audioresample", aenc, aparse]);
    }
    elements
}

fn quote(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `gst-launch` description of the transcode pipeline.
pub fn pipeline_description(
    input: &Path,
    output: &Path,
    codecs: &TranscodeCodecs,
    has_audio: bool,
) -> String {
    let (venc, vparse) = video_elements(codecs.video);
    let mut desc = format!(
        "filesrc location={} ! decodebin name=dec \
         dec. ! queue ! videoconvert ! {venc} ! {vparse} ! queue ! mp4mux name=mux ! filesink location={}",
        quote(input),
        quote(output)
    );
    if has_audio {
        let (aenc, aparse) = audio_elements(codecs.audio);
        desc.push_str(&format!(
            " dec. ! queue ! audioconvert ! audioresample ! {aenc} ! {aparse} ! queue ! mux."
        ));
    }
    desc
}

/// [`Transcoder`] running a gstreamer `decodebin ! encode ! mp4mux` pipeline.
#[derive(Debug, Clone, Copy)]
pub struct GstTranscoder {
    _init: (),
}

impl GstTranscoder {
    pub fn new() -> Result<Self> {
        gst::init().map_err(|e| AnnotateError::transcode("initializing gstreamer", e))?;
        Ok(Self { _init: () })
    }

    fn run(
        &self,
        input: &Path,
        output: &Path,
        codecs: &TranscodeCodecs,
        cancel: &CancelToken,
    ) -> Result<()> {
        let file_info =
            discovery::discover(input).map_err(|e| AnnotateError::transcode("probing input", e))?;
        if !file_info.dims.is_valid() {
            return Err(AnnotateError::Transcode(format!(
                "{input:?} reports an empty {}x{} video stream",
                file_info.dims.width, file_info.dims.height
            )));
        }
        log::info!(
            "Transcoding {input:?}: {}x{} at {} fps, {}",
            file_info.dims.width,
            file_info.dims.height,
            file_info
                .fps
                .map_or_else(|| "variable".to_string(), |fps| format!("{fps:.2}")),
            file_info
                .duration
                .map_or_else(|| "unknown length".to_string(), |d| format!("{d:.1?}")),
        );
        if !file_info.has_audio {
            log::info!("{input:?} has no audio stream, writing video only");
        }

        if let Some(missing) = required_elements(codecs, file_info.has_audio)
            .into_iter()
            .find(|name| gst::ElementFactory::find(name).is_none())
        {
            return Err(AnnotateError::Transcode(format!(
                "gstreamer element `{missing}` is not available"
            )));
        }

        let desc = pipeline_description(input, output, codecs, file_info.has_audio);
        log::debug!("Transcode pipeline: {desc}");
        let pipeline = gst::parse::launch(&desc)
            .map_err(|e| AnnotateError::transcode("building pipeline", e))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| AnnotateError::Transcode("top-level element is not a pipeline".into()))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| AnnotateError::transcode("starting pipeline", e))?;
        let result = wait_for_eos(&pipeline, cancel);
        if let Err(e) = pipeline.set_state(gst::State::Null) {
            log::warn!("Failed to stop transcode pipeline: {e}");
        }
        result
    }
}

fn wait_for_eos(pipeline: &gst::Pipeline, cancel: &CancelToken) -> Result<()> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| AnnotateError::Transcode("pipeline has no bus".into()))?;
    loop {
        cancel.check()?;
        let Some(msg) = bus.timed_pop(gst::ClockTime::from_mseconds(100)) else {
            continue;
        };
        match msg.view() {
            MessageView::Error(err) => {
                let name = err.src().map(|e| e.name().to_string());
                return Err(AnnotateError::Transcode(format!(
                    "error from element {name:?}: {}",
                    err.error()
                )));
            }
            MessageView::Eos(..) => {
                log::info!("Transcode pipeline reached end of stream.");
                return Ok(());
            }
            _ => (),
        }
    }
}

impl Transcoder for GstTranscoder {
    fn reencode(
        &self,
        input: &Path,
        output: &Path,
        codecs: &TranscodeCodecs,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.check()?;
        if !input.is_file() {
            return Err(AnnotateError::Transcode(format!(
                "cannot read input {input:?}"
            )));
        }

        let result = self.run(input, output, codecs, cancel);
        if result.is_err() && output.exists() {
            log::info!("Removing partial output {output:?}");
            if let Err(e) = std::fs::remove_file(output) {
                log::warn!("Failed to remove {output:?}: {e}");
            }
        }
        result
    }
}
