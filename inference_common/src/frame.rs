use image::RgbImage;

use crate::img_dimensions::ImgDimensions;

/// A decoded frame in presentation order.
///
/// Owned by exactly one pipeline stage at a time: the source hands it to the
/// filter, which hands it to the sink.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Wraps a packed RGB8 buffer. Returns `None` if the buffer is too small.
    pub fn from_rgb(index: u64, dims: ImgDimensions, data: Vec<u8>) -> Option<Self> {
        RgbImage::from_vec(dims.width, dims.height, data).map(|image| Self { index, image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dims(&self) -> ImgDimensions {
        ImgDimensions::new(self.width(), self.height())
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }
}
