pub mod annotate;
pub mod bbox;
pub mod error;
pub mod frame;
pub mod frame_meta;
pub mod frame_times;
pub mod img_dimensions;
pub mod job;
pub mod video_meta;

pub use error::{AnnotateError, Result};
