//! One end-to-end pass: decode, detect, draw, encode, then transcode.

use std::path::Path;
use std::time::Instant;

use inference_common::annotate::{accepted, BoxStyle, DEFAULT_CONFIDENCE_THRESHOLD};
use inference_common::frame_meta::FrameMeta;
use inference_common::frame_times::{AggregatedTimes, FrameTimes};
use inference_common::job::{JobPaths, JobStatus, VideoJob};
use inference_common::video_meta::VideoMeta;
use inference_common::{AnnotateError, Result};
use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::media::{FrameSink, FrameSource, MediaBackend, SinkSpec, TranscodeCodecs, Transcoder, VideoInfo};
use crate::model::DetectionModel;
use crate::progress::ProgressTracker;

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Minimum confidence for a box to be drawn, inclusive.
    pub threshold: f32,
    /// FourCC of the intermediate file.
    pub sink_codec: String,
    pub codecs: TranscodeCodecs,
    pub box_style: BoxStyle,
    /// Write per-frame detections next to the annotated file.
    pub write_meta: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            sink_codec: "mp4v".to_string(),
            codecs: TranscodeCodecs::default(),
            box_style: BoxStyle::default(),
            write_meta: false,
        }
    }
}

/// Drives a single [`VideoJob`] from `Pending` to `Completed` or `Failed`.
pub struct JobRunner<'a, B, T, M: ?Sized> {
    backend: &'a B,
    transcoder: &'a T,
    model: &'a mut M,
    progress: &'a ProgressTracker,
    cancel: CancelToken,
    config: &'a RunnerConfig,
}

impl<'a, B, T, M> JobRunner<'a, B, T, M>
where
    B: MediaBackend,
    T: Transcoder,
    M: DetectionModel + ?Sized,
{
    pub fn new(
        backend: &'a B,
        transcoder: &'a T,
        model: &'a mut M,
        progress: &'a ProgressTracker,
        cancel: CancelToken,
        config: &'a RunnerConfig,
    ) -> Self {
        Self {
            backend,
            transcoder,
            model,
            progress,
            cancel,
            config,
        }
    }

    /// Runs the job to a terminal state and returns its final snapshot.
    pub fn execute(&mut self, job: &Mutex<VideoJob>) -> VideoJob {
        let (id, paths) = {
            let job = job.lock();
            (job.id, job.paths.clone())
        };

        match self.run(job, &paths) {
            Ok(()) => log::info!("Job {id} completed: {:?}", paths.output),
            Err(err) => {
                log::error!("Job {id} failed: {err}");
                if paths.annotated.exists() {
                    log::info!("Annotated file left at {:?}", paths.annotated);
                }
                // Phase goes out before the status, under the record lock.
                let mut record = job.lock();
                self.progress.set_phase(JobStatus::Failed);
                if let Err(e) = record.fail(&err) {
                    log::warn!("Job {id}: {e}");
                }
            }
        }

        let mut snapshot = job.lock().clone();
        snapshot.progress = self.progress.read();
        snapshot
    }

    fn run(&mut self, job: &Mutex<VideoJob>, paths: &JobPaths) -> Result<()> {
        self.progress.reset();
        self.transition(job, JobStatus::Annotating)?;

        let written = self.annotate(paths)?;
        if written == 0 {
            return Err(AnnotateError::EmptyOutput);
        }

        self.cancel.check()?;
        self.transition(job, JobStatus::Transcoding)?;
        log::info!(
            "Transcoding {:?} -> {:?} ({}/{})",
            paths.annotated,
            paths.output,
            self.config.codecs.video,
            self.config.codecs.audio
        );
        self.transcoder.reencode(
            &paths.annotated,
            &paths.output,
            &self.config.codecs,
            &self.cancel,
        )?;

        let mut record = job.lock();
        self.progress.set_phase(JobStatus::Completed);
        record.complete()?;
        Ok(())
    }

    fn transition(&self, job: &Mutex<VideoJob>, next: JobStatus) -> Result<()> {
        let mut record = job.lock();
        record.advance(next)?;
        self.progress.set_phase(next);
        Ok(())
    }

    /// First pass. Returns the number of frames written.
    fn annotate(&mut self, paths: &JobPaths) -> Result<u64> {
        let mut source = self.backend.open_source(&paths.source)?;
        let info = *source.info();
        log::info!(
            "Opened {:?}: {} frames, {:.2} fps, {}",
            paths.source,
            info.frame_count,
            info.fps,
            info.dims
        );

        ensure_parent(&paths.annotated)?;
        let spec = SinkSpec {
            codec: self.config.sink_codec.clone(),
            fps: info.fps,
            dims: info.dims,
        };
        let mut sink = self.backend.open_sink(&paths.annotated, &spec)?;

        let mut meta = self.config.write_meta.then(|| {
            VideoMeta::new(
                paths.source.clone(),
                paths.annotated.clone(),
                info.dims.width,
                info.dims.height,
                info.fps,
                self.config.threshold,
            )
        });

        let looped = self.annotate_frames(&mut source, &mut sink, &info, meta.as_mut());
        let closed = sink.close();
        drop(source);
        let processed = looped?;
        closed?;

        let written = sink.frames_written();
        if written != processed {
            return Err(AnnotateError::Io(format!(
                "sink {:?} holds {written} frames, {processed} were annotated",
                paths.annotated
            )));
        }

        if let Some(meta) = meta {
            let meta_path = paths.metadata();
            log::info!(
                "Writing output json file, {} frames, {} detections: {meta_path:?}",
                meta.frames.len(),
                meta.total_detections()
            );
            meta.write_json(&meta_path)?;
        }
        Ok(written)
    }

    fn annotate_frames(
        &mut self,
        source: &mut B::Source,
        sink: &mut B::Sink,
        info: &VideoInfo,
        mut meta: Option<&mut VideoMeta>,
    ) -> Result<u64> {
        let mut agg_times = AggregatedTimes::default();
        let mut processed = 0u64;

        loop {
            self.cancel.check()?;
            let mut frame_times = FrameTimes::default();

            let start = Instant::now();
            let Some(mut frame) = source.next_frame()? else {
                break;
            };
            frame_times.decode = start.elapsed();

            let start = Instant::now();
            let detections = self.model.detect(&frame)?;
            frame_times.detect = start.elapsed();

            let start = Instant::now();
            let drawn = self
                .config
                .box_style
                .draw(&mut frame, &detections, self.config.threshold);
            frame_times.annotate = start.elapsed();

            if let Some(meta) = meta.as_deref_mut() {
                meta.push(FrameMeta {
                    index: frame.index,
                    detections: accepted(&detections, self.config.threshold)
                        .copied()
                        .collect(),
                });
            }

            let start = Instant::now();
            sink.write(&frame)?;
            frame_times.encode = start.elapsed();

            processed += 1;
            self.progress.update(processed, info.frame_count);
            log::debug!(
                "Frame {}: {} detections, {drawn} drawn, {frame_times:?}",
                frame.index,
                detections.len()
            );
            agg_times.push(frame_times);
        }

        if processed > 0 {
            self.progress.finish_annotation();
        }
        if processed != info.frame_count {
            log::warn!(
                "Source declared {} frames but {processed} were decoded",
                info.frame_count
            );
        }

        // Ignore the first (outlier) frame.
        log::info!("Average frame times: {:?}", agg_times.avg(true));
        log::info!("Min frame times: {:?}", agg_times.min(true));
        log::info!("Max frame times: {:?}", agg_times.max(true));

        Ok(processed)
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| AnnotateError::io(format!("creating {parent:?}"), e)),
        _ => Ok(()),
    }
}
