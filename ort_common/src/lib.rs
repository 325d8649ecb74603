pub mod coco_classes;
pub mod yolov8;

pub use yolov8::{YoloV8, YoloV8Config};
