pub mod cancel;
pub mod manager;
pub mod media;
pub mod model;
pub mod presets;
pub mod progress;
pub mod runner;

pub use cancel::CancelToken;
pub use manager::{JobConfig, JobManager};
pub use media::{
    AudioCodec, FourCc, FrameSink, FrameSource, MediaBackend, SinkSpec, TranscodeCodecs,
    Transcoder, VideoCodec, VideoInfo,
};
pub use model::DetectionModel;
pub use presets::PresetRegistry;
pub use progress::{ProgressReport, ProgressTracker};
pub use runner::{JobRunner, RunnerConfig};
