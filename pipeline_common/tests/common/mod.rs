//! In-memory media backend, transcoder and model for driving jobs in tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};
use inference_common::bbox::{Bbox, Detection};
use inference_common::frame::Frame;
use inference_common::img_dimensions::ImgDimensions;
use inference_common::{AnnotateError, Result};
use pipeline_common::{
    CancelToken, DetectionModel, FrameSink, FrameSource, MediaBackend, ProgressTracker, SinkSpec,
    TranscodeCodecs, Transcoder, VideoInfo,
};

/// What the sink saw, shared with the test body.
#[derive(Debug, Default)]
pub struct SinkLog {
    pub indices: Mutex<Vec<u64>>,
    pub green_pixels: Mutex<Vec<usize>>,
    pub closed: AtomicBool,
}

impl SinkLog {
    pub fn written(&self) -> Vec<u64> {
        self.indices.lock().unwrap().clone()
    }

    pub fn green(&self) -> Vec<usize> {
        self.green_pixels.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct MockBackend {
    pub declared: u64,
    pub emitted: u64,
    pub dims: ImgDimensions,
    /// Emit a frame of the wrong size at this index.
    pub odd_frame_at: Option<u64>,
    /// The sink accepts but stops counting frames past this many.
    pub lossy_after: Option<u64>,
    pub log: Arc<SinkLog>,
}

impl MockBackend {
    pub fn new(frames: u64) -> Self {
        Self {
            declared: frames,
            emitted: frames,
            dims: ImgDimensions::new(64, 48),
            odd_frame_at: None,
            lossy_after: None,
            log: Arc::default(),
        }
    }
}

pub struct MockSource {
    info: VideoInfo,
    emitted: u64,
    next: u64,
    odd_frame_at: Option<u64>,
}

impl FrameSource for MockSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next >= self.emitted {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;
        let dims = if self.odd_frame_at == Some(index) {
            ImgDimensions::new(self.info.dims.width / 2, self.info.dims.height / 2)
        } else {
            self.info.dims
        };
        Ok(Some(Frame::new(index, RgbImage::new(dims.width, dims.height))))
    }
}

pub struct MockSink {
    spec: SinkSpec,
    path: std::path::PathBuf,
    written: u64,
    lossy_after: Option<u64>,
    log: Arc<SinkLog>,
}

impl FrameSink for MockSink {
    fn spec(&self) -> &SinkSpec {
        &self.spec
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        self.check_dims(frame)?;
        let green = frame
            .image
            .pixels()
            .filter(|p| **p == Rgb([0, 255, 0]))
            .count();
        self.log.indices.lock().unwrap().push(frame.index);
        self.log.green_pixels.lock().unwrap().push(green);
        if self.lossy_after.map_or(true, |n| self.written < n) {
            self.written += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.log.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        std::fs::write(&self.path, format!("{} frames", self.written))?;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }
}

impl MediaBackend for MockBackend {
    type Source = MockSource;
    type Sink = MockSink;

    fn open_source(&self, path: &Path) -> Result<MockSource> {
        if path.to_string_lossy().contains("missing") {
            return Err(AnnotateError::Io(format!("cannot open {path:?}")));
        }
        Ok(MockSource {
            info: VideoInfo {
                frame_count: self.declared,
                fps: 25.0,
                dims: self.dims,
            },
            emitted: self.emitted,
            next: 0,
            odd_frame_at: self.odd_frame_at,
        })
    }

    fn open_sink(&self, path: &Path, spec: &SinkSpec) -> Result<MockSink> {
        spec.validate()?;
        Ok(MockSink {
            spec: spec.clone(),
            path: path.to_path_buf(),
            written: 0,
            lossy_after: self.lossy_after,
            log: Arc::clone(&self.log),
        })
    }
}

#[derive(Clone, Default)]
pub struct MockTranscoder {
    pub fail: bool,
    pub calls: Arc<AtomicUsize>,
}

impl MockTranscoder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcoder for MockTranscoder {
    fn reencode(
        &self,
        input: &Path,
        output: &Path,
        _codecs: &TranscodeCodecs,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        cancel.check()?;
        if self.fail {
            return Err(AnnotateError::Transcode("no h264 encoder".to_string()));
        }
        std::fs::copy(input, output)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockModel {
    pub detections: Vec<Detection>,
    pub fail_at: Option<u64>,
    pub panic_at: Option<u64>,
    /// Blocks each call until the test sends a message.
    pub gate: Option<Receiver<()>>,
    /// Reads this tracker on every call.
    pub observe: Option<Arc<ProgressTracker>>,
    pub seen_progress: Arc<Mutex<Vec<u8>>>,
}

impl MockModel {
    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            ..Self::default()
        }
    }
}

impl DetectionModel for MockModel {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if let Some(tracker) = &self.observe {
            self.seen_progress.lock().unwrap().push(tracker.read());
        }
        if self.panic_at == Some(frame.index) {
            panic!("model crashed on frame {}", frame.index);
        }
        if self.fail_at == Some(frame.index) {
            return Err(AnnotateError::Model("session run failed".to_string()));
        }
        Ok(self.detections.clone())
    }
}

pub fn det(xmin: f32, ymin: f32, xmax: f32, ymax: f32, confidence: f32) -> Detection {
    Detection::new(Bbox::new(xmin, ymin, xmax, ymax), confidence, 0)
}
