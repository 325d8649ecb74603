//! YOLOv8 detection head on top of an ort session.
//!
//! The export takes a `[1, 3, S, S]` letterboxed RGB tensor in `[0, 1]` and
//! returns `[1, 4 + nc, anchors]`, where each anchor column holds
//! `(cx, cy, w, h)` in input pixels followed by one score per class.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use inference_common::bbox::{Bbox, Detection};
use inference_common::frame::Frame;
use inference_common::img_dimensions::ImgDimensions;
use inference_common::{AnnotateError, Result};
use ndarray::Array4;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::TensorRef;
use pipeline_common::DetectionModel;

use crate::coco_classes;

/// Letterbox fill, the value ultralytics pads with.
const PAD_VALUE: f32 = 144.0 / 255.0;
const CXYWH_OFFSET: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloV8Config {
    /// Anchors scoring below this never leave the model.
    pub conf: f32,
    /// Overlap above which the weaker of two same-class boxes is suppressed.
    pub iou: f32,
    /// Side of the square model input.
    pub input_size: u32,
}

impl Default for YoloV8Config {
    fn default() -> Self {
        Self {
            conf: 0.25,
            iou: 0.7,
            input_size: 640,
        }
    }
}

pub struct YoloV8 {
    session: Session,
    config: YoloV8Config,
}

impl YoloV8 {
    pub fn new(session: Session, config: YoloV8Config) -> Self {
        Self { session, config }
    }

    /// Loads an onnx export with full graph optimizations.
    /// Execution providers must be registered through `ort::init` beforehand.
    pub fn from_file(model: &Path, config: YoloV8Config) -> Result<Self> {
        let session = SessionBuilder::new()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(model))
            .map_err(|e| AnnotateError::model(format!("loading {model:?}"), e))?;
        log::debug!("{session:?}");
        Ok(Self::new(session, config))
    }

    pub fn config(&self) -> &YoloV8Config {
        &self.config
    }
}

impl DetectionModel for YoloV8 {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (input, ratio) = preprocess(&frame.image, self.config.input_size);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())
                .map_err(|e| AnnotateError::model("wrapping input tensor", e))?])
            .map_err(|e| AnnotateError::model("running session", e))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AnnotateError::model("extracting output tensor", e))?;

        let rows = match shape.get(1).map(|&d| usize::try_from(d)) {
            Some(Ok(rows)) if rows > CXYWH_OFFSET => rows,
            _ => {
                return Err(AnnotateError::Model(format!(
                    "unexpected output shape {shape:?}"
                )))
            }
        };
        let detections = postprocess(
            data,
            rows - CXYWH_OFFSET,
            ratio,
            frame.dims(),
            self.config.conf,
        );
        let detections = nms(detections, self.config.iou);
        log::trace!(
            "Frame {}: {:?}",
            frame.index,
            detections
                .iter()
                .map(|d| coco_classes::name(d.class_idx))
                .collect::<Vec<_>>()
        );
        Ok(detections)
    }
}

/// Scale factor mapping source pixels onto the model input.
fn letterbox_ratio(dims: ImgDimensions, input_size: u32) -> f32 {
    let size = input_size as f32;
    (size / dims.width as f32).min(size / dims.height as f32)
}

/// Resizes `image` into the top-left corner of a padded square tensor.
/// Returns the tensor and the ratio used.
pub fn preprocess(image: &RgbImage, input_size: u32) -> (Array4<f32>, f32) {
    let dims = ImgDimensions::new(image.width(), image.height());
    let ratio = letterbox_ratio(dims, input_size);
    let w_new = ((dims.width as f32 * ratio).round() as u32).clamp(1, input_size);
    let h_new = ((dims.height as f32 * ratio).round() as u32).clamp(1, input_size);
    let resized = imageops::resize(image, w_new, h_new, FilterType::Triangle);

    let side = input_size as usize;
    let mut input = Array4::from_elem((1, 3, side, side), PAD_VALUE);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = f32::from(r) / 255.0;
        input[[0, 1, y, x]] = f32::from(g) / 255.0;
        input[[0, 2, y, x]] = f32::from(b) / 255.0;
    }
    (input, ratio)
}

/// Decodes the raw `[4 + nc, anchors]` head output into frame-space detections.
pub fn postprocess(
    output: &[f32],
    nc: usize,
    ratio: f32,
    frame: ImgDimensions,
    conf: f32,
) -> Vec<Detection> {
    let anchors = output.len() / (CXYWH_OFFSET + nc);
    let at = |row: usize, anchor: usize| output[row * anchors + anchor];
    let (max_x, max_y) = (frame.width as f32, frame.height as f32);

    let mut detections = Vec::new();
    for j in 0..anchors {
        let Some((class_idx, confidence)) = (0..nc)
            .map(|c| (c, at(CXYWH_OFFSET + c, j)))
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };
        if !(confidence >= conf) {
            continue;
        }

        let bbox = Bbox::from_cxcywh(at(0, j), at(1, j), at(2, j), at(3, j));
        let bbox = Bbox::new(
            (bbox.xmin / ratio).clamp(0.0, max_x),
            (bbox.ymin / ratio).clamp(0.0, max_y),
            (bbox.xmax / ratio).clamp(0.0, max_x),
            (bbox.ymax / ratio).clamp(0.0, max_y),
        );
        if bbox.area() > 0.0 {
            detections.push(Detection::new(bbox, confidence, class_idx));
        }
    }
    detections
}

/// Greedy per-class non-maximum suppression, highest confidence first.
pub fn nms(mut detections: Vec<Detection>, iou: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_idx == det.class_idx && k.bbox.iou(&det.bbox) > iou);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}
