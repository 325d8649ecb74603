//! Owns the single tracked job and the progress it reports.
//!
//! The pipeline blocks for as long as the video takes, so each job runs on
//! its own worker thread while callers poll [`JobManager::progress`].

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use inference_common::job::{JobPaths, JobStatus, VideoJob};
use inference_common::{AnnotateError, Result};
use parking_lot::{Mutex, MutexGuard};

use crate::cancel::CancelToken;
use crate::media::{MediaBackend, Transcoder};
use crate::model::DetectionModel;
use crate::presets::PresetRegistry;
use crate::progress::{ProgressReport, ProgressTracker};
use crate::runner::{JobRunner, RunnerConfig};

#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Directory receiving the annotated and transcoded files.
    pub output_dir: PathBuf,
    pub runner: RunnerConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("static"),
            runner: RunnerConfig::default(),
        }
    }
}

struct ActiveJob {
    record: Arc<Mutex<VideoJob>>,
    cancel: CancelToken,
    worker: Option<JoinHandle<VideoJob>>,
}

pub struct JobManager<B, T, M> {
    presets: PresetRegistry,
    config: Arc<JobConfig>,
    backend: Arc<B>,
    transcoder: Arc<T>,
    // FIXME the model is only ever used by one worker at a time, the lock is never contested.
    model: Arc<Mutex<M>>,
    progress: Arc<ProgressTracker>,
    current: Mutex<Option<ActiveJob>>,
}

impl<B, T, M> JobManager<B, T, M>
where
    B: MediaBackend + 'static,
    T: Transcoder + 'static,
    M: DetectionModel + 'static,
{
    pub fn new(
        presets: PresetRegistry,
        config: JobConfig,
        backend: B,
        transcoder: T,
        model: M,
    ) -> Self {
        Self {
            presets,
            config: Arc::new(config),
            backend: Arc::new(backend),
            transcoder: Arc::new(transcoder),
            model: Arc::new(Mutex::new(model)),
            progress: Arc::new(ProgressTracker::new()),
            current: Mutex::new(None),
        }
    }

    pub fn presets(&self) -> &PresetRegistry {
        &self.presets
    }

    /// Starts a job for `preset` on a worker thread.
    ///
    /// Unknown keys fail with `InvalidSelection` and a job still in flight
    /// fails the call with `JobInProgress`; neither touches the tracked job or
    /// the progress.
    pub fn submit(&self, preset: &str) -> Result<VideoJob> {
        let source = self.presets.resolve(preset)?.to_path_buf();

        let mut current = self.lock_current();
        if let Some(active) = current.as_ref() {
            let job = active.record.lock();
            if job.is_active() {
                return Err(AnnotateError::JobInProgress {
                    id: job.id.to_string(),
                });
            }
        }
        if let Some(mut previous) = current.take() {
            if let Some(worker) = previous.worker.take() {
                if worker.join().is_err() {
                    mark_crashed(&previous.record, &self.progress);
                }
            }
        }

        let job = VideoJob::new(preset, JobPaths::derive(&self.config.output_dir, source));
        let snapshot = job.clone();
        let record = Arc::new(Mutex::new(job));
        let cancel = CancelToken::new();
        self.progress.reset();

        let worker = {
            let record = Arc::clone(&record);
            let cancel = cancel.clone();
            let config = Arc::clone(&self.config);
            let backend = Arc::clone(&self.backend);
            let transcoder = Arc::clone(&self.transcoder);
            let model = Arc::clone(&self.model);
            let progress = Arc::clone(&self.progress);
            thread::Builder::new()
                .name(format!("job-{}", snapshot.id))
                .spawn(move || {
                    let mut model = model.lock();
                    JobRunner::new(
                        &*backend,
                        &*transcoder,
                        &mut *model,
                        &progress,
                        cancel,
                        &config.runner,
                    )
                    .execute(&record)
                })
                .map_err(|e| AnnotateError::io("spawning job worker", e))?
        };

        log::info!(
            "Started job {} for preset `{preset}`: {:?}",
            snapshot.id,
            snapshot.paths.source
        );
        *current = Some(ActiveJob {
            record,
            cancel,
            worker: Some(worker),
        });
        Ok(snapshot)
    }

    /// Progress of the active, or most recently finished, job.
    pub fn progress(&self) -> ProgressReport {
        self.progress.snapshot()
    }

    pub fn current_job(&self) -> Option<VideoJob> {
        let current = self.lock_current();
        current.as_ref().map(|active| {
            let mut job = active.record.lock().clone();
            job.progress = self.progress.read();
            job
        })
    }

    pub fn is_busy(&self) -> bool {
        self.lock_current()
            .as_ref()
            .is_some_and(|active| active.record.lock().is_active())
    }

    /// Asks the active job to stop at its next frame boundary.
    /// Returns `false` if there is nothing to cancel.
    pub fn cancel(&self) -> bool {
        let current = self.lock_current();
        match current.as_ref() {
            Some(active) if active.record.lock().is_active() => {
                active.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// The tracked job slot, with a panicked worker already marked failed.
    fn lock_current(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        let mut current = self.current.lock();
        if let Some(active) = current.as_mut() {
            reap_crashed_worker(active, &self.progress);
        }
        current
    }

    /// Blocks until the worker of the current job exits.
    pub fn wait(&self) -> Option<VideoJob> {
        let (worker, record) = {
            let mut current = self.current.lock();
            let active = current.as_mut()?;
            (active.worker.take(), Arc::clone(&active.record))
        };

        if let Some(worker) = worker {
            if worker.join().is_err() {
                mark_crashed(&record, &self.progress);
            }
        }
        let mut job = record.lock().clone();
        job.progress = self.progress.read();
        Some(job)
    }
}

/// A worker that panicked never reaches a terminal state on its own.
fn reap_crashed_worker(active: &mut ActiveJob, progress: &ProgressTracker) {
    let finished = active.worker.as_ref().is_some_and(JoinHandle::is_finished);
    if finished {
        if let Some(worker) = active.worker.take() {
            if worker.join().is_err() {
                mark_crashed(&active.record, progress);
            }
        }
    }
}

fn mark_crashed(record: &Mutex<VideoJob>, progress: &ProgressTracker) {
    let mut job = record.lock();
    log::error!("Job {} worker panicked", job.id);
    if job.is_active() {
        progress.set_phase(JobStatus::Failed);
        let err = AnnotateError::Io("job worker panicked".to_string());
        if let Err(e) = job.fail(&err) {
            log::warn!("Job {}: {e}", job.id);
        }
    }
}
