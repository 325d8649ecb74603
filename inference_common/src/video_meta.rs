use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::frame_meta::FrameMeta;
use crate::Result;

/// Metadata corresponding to an annotated video.
#[derive(Debug, Deserialize, Serialize)]
pub struct VideoMeta {
    /// Path to original input video file.
    pub input_file: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Confidence threshold the overlays were drawn with.
    pub threshold: f32,
    /// Path to the annotated video file.
    pub output_file: PathBuf,
    /// Per-frame accepted detections.
    pub frames: Vec<FrameMeta>,
}

impl VideoMeta {
    pub fn new(
        input_file: PathBuf,
        output_file: PathBuf,
        width: u32,
        height: u32,
        fps: f64,
        threshold: f32,
    ) -> Self {
        Self {
            input_file,
            width,
            height,
            fps,
            threshold,
            output_file,
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: FrameMeta) {
        self.frames.push(frame);
    }

    pub fn total_detections(&self) -> usize {
        self.frames.iter().map(|f| f.detections.len()).sum()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}
