use inference_common::bbox::Detection;
use inference_common::frame::Frame;
use inference_common::Result;

/// Object detector consumed as a black box: one frame in, detections out.
/// Called once per frame, never batched.
pub trait DetectionModel: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

impl<M: DetectionModel + ?Sized> DetectionModel for Box<M> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }
}
