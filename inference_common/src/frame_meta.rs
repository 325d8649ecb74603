use serde::{Deserialize, Serialize};

use crate::bbox::Detection;

#[derive(Debug, Serialize, Deserialize)]
pub struct FrameMeta {
    pub index: u64,
    /// Detections that passed the threshold and were drawn.
    pub detections: Vec<Detection>,
}
