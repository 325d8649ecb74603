pub mod discovery;
pub mod transcode;

pub use transcode::GstTranscoder;
