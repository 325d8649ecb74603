use std::collections::VecDeque;
use std::path::Path;

use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context, flag::Flags};
use ffmpeg::util::frame::video::Video;
use inference_common::frame::Frame;
use inference_common::img_dimensions::ImgDimensions;
use inference_common::{AnnotateError, Result};
use pipeline_common::{FrameSource, VideoInfo};

/// Decodes the best video stream of a container into RGB8 frames.
pub struct FfmpegSource {
    ictx: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: Context,
    info: VideoInfo,
    /// Decoded but not yet converted frames.
    pending: VecDeque<Video>,
    flushed: bool,
    next_index: u64,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self> {
        let ictx = input(&path).map_err(|e| AnnotateError::io(format!("opening {path:?}"), e))?;
        let stream = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| AnnotateError::Io(format!("no video stream in {path:?}")))?;
        let stream_index = stream.index();

        let fps = [stream.avg_frame_rate(), stream.rate()]
            .into_iter()
            .map(f64::from)
            .find(|fps| fps.is_finite() && *fps > 0.0)
            .ok_or_else(|| AnnotateError::Io(format!("no frame rate for {path:?}")))?;

        let frame_count = match u64::try_from(stream.frames()) {
            Ok(n) if n > 0 => n,
            _ => estimate_frame_count(&ictx, &stream, fps),
        };
        if frame_count == 0 {
            return Err(AnnotateError::Io(format!("{path:?} has no frames")));
        }

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| AnnotateError::io("reading codec parameters", e))?;
        let decoder = context_decoder
            .decoder()
            .video()
            .map_err(|e| AnnotateError::io(format!("opening decoder for {path:?}"), e))?;

        let dims = ImgDimensions::new(decoder.width(), decoder.height());
        if !dims.is_valid() {
            return Err(AnnotateError::Io(format!(
                "{path:?} has invalid dimensions {dims}"
            )));
        }

        let scaler = Context::get(
            decoder.format(),
            dims.width,
            dims.height,
            Pixel::RGB24,
            dims.width,
            dims.height,
            Flags::BILINEAR,
        )
        .map_err(|e| AnnotateError::io("creating scaler", e))?;

        Ok(Self {
            ictx,
            stream_index,
            decoder,
            scaler,
            info: VideoInfo {
                frame_count,
                fps,
                dims,
            },
            pending: VecDeque::new(),
            flushed: false,
            next_index: 0,
        })
    }

    /// Reads packets until the decoder yields frames or the input ends.
    fn fill(&mut self) -> Result<()> {
        while self.pending.is_empty() && !self.flushed {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.ictx) {
                Ok(()) if packet.stream() == self.stream_index => {
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| AnnotateError::io("sending packet to decoder", e))?;
                    self.receive_decoded_frames();
                }
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| AnnotateError::io("flushing decoder", e))?;
                    self.receive_decoded_frames();
                    self.flushed = true;
                }
                Err(e) => return Err(AnnotateError::io("reading packet", e)),
            }
        }
        Ok(())
    }

    fn receive_decoded_frames(&mut self) {
        let mut decoded = Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            self.pending.push_back(decoded);
            decoded = Video::empty();
        }
    }

    fn to_frame(&mut self, decoded: &Video) -> Result<Frame> {
        let mut rgb_frame = Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .map_err(|e| AnnotateError::io("converting frame to rgb", e))?;

        let dims = self.info.dims;
        let row_len = dims.width as usize * 3;
        let stride = rgb_frame.stride(0);
        let data = rgb_frame.data(0);
        let mut packed = Vec::with_capacity(dims.rgb_len());
        for row in data.chunks(stride).take(dims.height as usize) {
            packed.extend_from_slice(&row[..row_len]);
        }

        let index = self.next_index;
        self.next_index += 1;
        Frame::from_rgb(index, dims, packed).ok_or_else(|| {
            AnnotateError::Io(format!("decoded frame {index} is smaller than {dims}"))
        })
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.fill()?;
        match self.pending.pop_front() {
            Some(decoded) => self.to_frame(&decoded).map(Some),
            None => Ok(None),
        }
    }
}

/// Containers without a frame count get one from their duration.
fn estimate_frame_count(
    ictx: &ffmpeg::format::context::Input,
    stream: &ffmpeg::format::stream::Stream,
    fps: f64,
) -> u64 {
    let stream_secs = stream.duration() as f64 * f64::from(stream.time_base());
    let secs = if stream_secs.is_finite() && stream_secs > 0.0 {
        stream_secs
    } else {
        ictx.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
    };
    if secs.is_finite() && secs > 0.0 {
        (secs * fps).round() as u64
    } else {
        0
    }
}
