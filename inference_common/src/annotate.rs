//! Confidence filtering and box overlays.
//!
//! Everything here is pure with respect to job state: a frame goes in, the
//! same frame comes out with outlines drawn for the detections that passed.

use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::bbox::Detection;
use crate::frame::Frame;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// How accepted boxes are drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxStyle {
    pub color: Rgb<u8>,
    pub thickness: u32,
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            color: Rgb([0, 255, 0]),
            thickness: 2,
        }
    }
}

/// Detections with `confidence >= threshold`, in model order.
pub fn accepted(detections: &[Detection], threshold: f32) -> impl Iterator<Item = &Detection> {
    detections.iter().filter(move |d| d.passes(threshold))
}

/// Draws every accepted detection onto `frame` with the default style.
pub fn annotate(mut frame: Frame, detections: &[Detection], threshold: f32) -> Frame {
    BoxStyle::default().draw(&mut frame, detections, threshold);
    frame
}

impl BoxStyle {
    /// Draws accepted detections in place, returning how many were drawn.
    pub fn draw(&self, frame: &mut Frame, detections: &[Detection], threshold: f32) -> usize {
        let (w, h) = (frame.width(), frame.height());
        let mut drawn = 0;
        for det in accepted(detections, threshold) {
            let Some(rect) = pixel_rect(det, w, h) else {
                log::trace!("frame {}: box {:?} lies outside the frame", frame.index, det.bbox);
                continue;
            };
            for inset in 0..self.thickness as i32 {
                let rw = rect.width() as i32 - 2 * inset;
                let rh = rect.height() as i32 - 2 * inset;
                if rw <= 0 || rh <= 0 {
                    break;
                }
                let r = Rect::at(rect.left() + inset, rect.top() + inset).of_size(rw as u32, rh as u32);
                draw_hollow_rect_mut(&mut frame.image, r, self.color);
            }
            drawn += 1;
        }
        drawn
    }
}

/// Integer rectangle covering corners `(xmin, ymin)` and `(xmax, ymax)`
/// inclusively, clamped to the frame. `None` if the box misses the frame.
fn pixel_rect(det: &Detection, width: u32, height: u32) -> Option<Rect> {
    if width == 0 || height == 0 {
        return None;
    }
    let b = &det.bbox;
    let (max_x, max_y) = (width as f32, height as f32);
    if !(b.xmax >= 0.0 && b.ymax >= 0.0 && b.xmin < max_x && b.ymin < max_y) {
        return None;
    }

    let x1 = (b.xmin as i32).clamp(0, width as i32 - 1);
    let y1 = (b.ymin as i32).clamp(0, height as i32 - 1);
    let x2 = (b.xmax as i32).clamp(0, width as i32 - 1);
    let y2 = (b.ymax as i32).clamp(0, height as i32 - 1);
    if x2 < x1 || y2 < y1 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32))
}
