use std::path::{Path, PathBuf};

use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context, flag::Flags};
use ffmpeg::util::frame::video::Video;
use ffmpeg::{codec, encoder, format, Packet, Rational};
use inference_common::frame::Frame;
use inference_common::{AnnotateError, Result};
use pipeline_common::{FourCc, FrameSink, SinkSpec};

/// Encodes RGB8 frames into a container picked from the file extension.
pub struct FfmpegSink {
    spec: SinkSpec,
    path: PathBuf,
    octx: format::context::Output,
    encoder: encoder::video::Encoder,
    scaler: Context,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    written: u64,
    closed: bool,
}

fn codec_for(tag: FourCc) -> (codec::Id, Pixel) {
    match tag {
        FourCc::Mp4v | FourCc::Xvid => (codec::Id::MPEG4, Pixel::YUV420P),
        FourCc::Avc1 => (codec::Id::H264, Pixel::YUV420P),
        FourCc::Mjpg => (codec::Id::MJPEG, Pixel::YUVJ420P),
    }
}

impl FfmpegSink {
    pub fn open(path: &Path, spec: &SinkSpec) -> Result<Self> {
        let tag = spec.validate()?;
        let (codec_id, pix_fmt) = codec_for(tag);
        let codec = encoder::find(codec_id)
            .ok_or_else(|| AnnotateError::Io(format!("no {codec_id:?} encoder for `{tag}`")))?;

        let mut octx = format::output(&path)
            .map_err(|e| AnnotateError::io(format!("creating {path:?}"), e))?;
        let global_header = octx
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        let rate = Rational::from(spec.fps);
        let encoder_time_base = rate.invert();
        let dims = spec.dims;

        let mut ost = octx
            .add_stream(codec)
            .map_err(|e| AnnotateError::io("adding output stream", e))?;
        let stream_index = ost.index();

        let mut video = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| AnnotateError::io("creating encoder", e))?;
        video.set_width(dims.width);
        video.set_height(dims.height);
        video.set_format(pix_fmt);
        video.set_frame_rate(Some(rate));
        video.set_time_base(encoder_time_base);
        if global_header {
            video.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let opened = video
            .open_as(codec)
            .map_err(|e| AnnotateError::io(format!("opening {codec_id:?} encoder"), e))?;
        ost.set_parameters(&opened);
        ost.set_time_base(encoder_time_base);

        octx.write_header()
            .map_err(|e| AnnotateError::io(format!("writing header of {path:?}"), e))?;
        // The muxer may pick its own time base while writing the header.
        let stream_time_base = octx
            .stream(stream_index)
            .map(|s| s.time_base())
            .ok_or_else(|| AnnotateError::Io("output stream disappeared".to_string()))?;

        let scaler = Context::get(
            Pixel::RGB24,
            dims.width,
            dims.height,
            pix_fmt,
            dims.width,
            dims.height,
            Flags::BILINEAR,
        )
        .map_err(|e| AnnotateError::io("creating scaler", e))?;

        log::debug!("Opened {path:?} for {tag} ({codec_id:?}) at {} fps, {dims}", spec.fps);
        Ok(Self {
            spec: spec.clone(),
            path: path.to_path_buf(),
            octx,
            encoder: opened,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            written: 0,
            closed: false,
        })
    }

    fn receive_encoded_packets(&mut self) -> Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.octx)
                .map_err(|e| AnnotateError::io(format!("writing packet to {:?}", self.path), e))?;
        }
        Ok(())
    }
}

impl FrameSink for FfmpegSink {
    fn spec(&self) -> &SinkSpec {
        &self.spec
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(AnnotateError::Io(format!("{:?} is already closed", self.path)));
        }
        self.check_dims(frame)?;

        let dims = self.spec.dims;
        let row_len = dims.width as usize * 3;
        let mut rgb_frame = Video::new(Pixel::RGB24, dims.width, dims.height);
        let stride = rgb_frame.stride(0);
        let dst = rgb_frame.data_mut(0);
        for (row, src) in frame.as_raw().chunks_exact(row_len).enumerate() {
            dst[row * stride..row * stride + row_len].copy_from_slice(src);
        }

        let mut converted = Video::empty();
        self.scaler
            .run(&rgb_frame, &mut converted)
            .map_err(|e| AnnotateError::io("converting frame from rgb", e))?;
        // Timestamps follow write order, in frames.
        converted.set_pts(Some(self.written as i64));

        self.encoder
            .send_frame(&converted)
            .map_err(|e| AnnotateError::io(format!("encoding frame {}", frame.index), e))?;
        self.receive_encoded_packets()?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.encoder
            .send_eof()
            .map_err(|e| AnnotateError::io("flushing encoder", e))?;
        self.receive_encoded_packets()?;
        self.octx
            .write_trailer()
            .map_err(|e| AnnotateError::io(format!("writing trailer of {:?}", self.path), e))?;
        log::debug!("Closed {:?} after {} frames", self.path, self.written);
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::warn!("Failed to finalize {:?}: {e}", self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use inference_common::img_dimensions::ImgDimensions;
    use pipeline_common::FrameSource;

    use super::*;
    use crate::decoder::FfmpegSource;

    fn spec(codec: &str, width: u32, height: u32) -> SinkSpec {
        SinkSpec {
            codec: codec.to_string(),
            fps: 25.0,
            dims: ImgDimensions::new(width, height),
        }
    }

    #[test]
    fn unknown_codec_is_io() {
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = FfmpegSink::open(&dir.path().join("out.mp4"), &spec("bogus", 64, 48))
            .err()
            .unwrap();
        assert!(err.is_io());
    }

    #[test]
    fn zero_dimensions_are_io() {
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = FfmpegSink::open(&dir.path().join("out.mp4"), &spec("mp4v", 0, 48))
            .err()
            .unwrap();
        assert!(err.is_io());
    }

    #[test]
    fn rejects_frames_of_another_size() {
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FfmpegSink::open(&dir.path().join("out.mp4"), &spec("mp4v", 64, 48)).unwrap();

        let err = sink.write(&Frame::new(0, RgbImage::new(32, 48))).unwrap_err();
        assert!(matches!(err, AnnotateError::DimensionMismatch { .. }));
        assert_eq!(sink.frames_written(), 0);
        sink.close().unwrap();
    }

    #[test]
    fn round_trip_keeps_frame_count_and_size() {
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");

        let mut sink = FfmpegSink::open(&path, &spec("mp4v", 64, 48)).unwrap();
        for i in 0..3u8 {
            let image = RgbImage::from_pixel(64, 48, Rgb([i * 80, 40, 200]));
            sink.write(&Frame::new(u64::from(i), image)).unwrap();
        }
        sink.close().unwrap();
        sink.close().unwrap();
        assert_eq!(sink.frames_written(), 3);
        drop(sink);

        let mut source = FfmpegSource::open(&path).unwrap();
        assert_eq!(source.info().dims, ImgDimensions::new(64, 48));
        assert!((source.info().fps - 25.0).abs() < 0.01);

        let mut indices = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.dims(), ImgDimensions::new(64, 48));
            indices.push(frame.index);
        }
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn dropped_sink_finalizes_the_file() {
        ffmpeg::init().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.mp4");
        {
            let mut sink = FfmpegSink::open(&path, &spec("mp4v", 32, 32)).unwrap();
            sink.write(&Frame::new(0, RgbImage::new(32, 32))).unwrap();
        }

        let mut source = FfmpegSource::open(&path).unwrap();
        assert!(source.next_frame().unwrap().is_some());
    }
}
