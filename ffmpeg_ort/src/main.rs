use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ffmpeg_common::FfmpegBackend;
use gstreamed_common::GstTranscoder;
use inference_common::annotate::{BoxStyle, DEFAULT_CONFIDENCE_THRESHOLD};
use inference_common::job::JobStatus;
use ort::execution_providers::CPUExecutionProvider;
use ort::execution_providers::CUDAExecutionProvider;
use ort_common::{YoloV8, YoloV8Config};
use pipeline_common::{
    AudioCodec, JobConfig, JobManager, PresetRegistry, RunnerConfig, TranscodeCodecs, VideoCodec,
};
use serde_json::json;
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
pub struct Args {
    /// Preset key of the video to process, e.g. `video1`.
    preset: String,
    /// Json file mapping preset keys to video paths.
    /// Defaults to `video1`..`video4` under `static/videos/`.
    #[arg(long)]
    presets: Option<PathBuf>,
    /// Directory receiving the annotated and transcoded files.
    #[arg(long, default_value = "static")]
    output_dir: PathBuf,
    /// Yolov8 onnx model file to use.
    #[arg(long, short, default_value = "_models/yolov8s.onnx")]
    model: PathBuf,
    /// Whether to attempt to use `cuda` hw acceleration.
    /// This may silently fail and fallback to cpu acceleration presently.
    #[arg(long, action, default_value = "false")]
    cuda: bool,
    /// Minimum confidence for a box to be drawn.
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
    threshold: f32,
    /// Confidence below which the model drops anchors.
    #[arg(long, default_value_t = 0.25)]
    model_conf: f32,
    /// IoU threshold of the non-maximum suppression.
    #[arg(long, default_value_t = 0.7)]
    iou: f32,
    /// FourCC of the annotated intermediate file.
    #[arg(long, default_value = "mp4v")]
    codec: String,
    #[arg(long, default_value = "h264")]
    video_codec: VideoCodec,
    #[arg(long, default_value = "aac")]
    audio_codec: AudioCodec,
    /// How often progress is reported while the job runs.
    #[arg(long, default_value_t = 500)]
    poll_interval_ms: u64,
    /// Also write per-frame detections as json next to the annotated file.
    #[arg(long, action, default_value = "false")]
    write_meta: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,ffmpeg_ort=info,pipeline_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let presets = match &args.presets {
        Some(path) => PresetRegistry::from_json_file(path)?,
        None => PresetRegistry::default(),
    };
    // Fail fast, before paying for the model load.
    if let Err(e) = presets.resolve(&args.preset) {
        let keys = presets.keys().collect::<Vec<_>>().join(", ");
        eprintln!("{e}, expected one of: {keys}");
        std::process::exit(2);
    }

    // Load model into ort.
    let (ep, ep_name) = if args.cuda {
        (CUDAExecutionProvider::default().build(), "cuda")
    } else {
        (CPUExecutionProvider::default().build(), "cpu")
    };
    ort::init().with_execution_providers([ep]).commit()?;

    let model = YoloV8::from_file(
        &args.model,
        YoloV8Config {
            conf: args.model_conf,
            iou: args.iou,
            ..YoloV8Config::default()
        },
    )?;
    log::info!(
        "Prepared ort {ep_name} session with model: {:?}",
        args.model
    );

    let config = JobConfig {
        output_dir: args.output_dir.clone(),
        runner: RunnerConfig {
            threshold: args.threshold,
            sink_codec: args.codec.clone(),
            codecs: TranscodeCodecs {
                video: args.video_codec,
                audio: args.audio_codec,
            },
            box_style: BoxStyle::default(),
            write_meta: args.write_meta,
        },
    };
    let manager = JobManager::new(
        presets,
        config,
        FfmpegBackend::new()?,
        GstTranscoder::new()?,
        model,
    );

    let job = match manager.submit(&args.preset) {
        Ok(job) => job,
        Err(e) if e.is_client_error() => {
            eprintln!("{e}");
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };
    let span = tracing::info_span!("job", id = %job.id, preset = %job.preset);
    let _enter = span.enter();

    let poll_interval = Duration::from_millis(args.poll_interval_ms);
    loop {
        let busy = manager.is_busy();
        log::info!("{}", serde_json::to_string(&manager.progress())?);
        if !busy {
            break;
        }
        std::thread::sleep(poll_interval);
    }

    let Some(job) = manager.wait() else {
        anyhow::bail!("job {} disappeared", job.id);
    };
    match (job.status, &job.result) {
        (JobStatus::Completed, Some(processed)) => {
            println!(
                "{}",
                json!({ "original": job.paths.source, "processed": processed })
            );
            Ok(())
        }
        _ => {
            eprintln!(
                "{}",
                json!({ "error": job.error.as_deref().unwrap_or("unknown error") })
            );
            std::process::exit(1);
        }
    }
}
