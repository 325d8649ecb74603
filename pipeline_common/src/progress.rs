//! Completion percentage of the active job, readable from any thread.

use std::sync::atomic::{AtomicU8, Ordering};

use inference_common::job::JobStatus;
use serde::{Deserialize, Serialize};

/// Body of a progress query: `{"progress": 40, "phase": "annotating"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub progress: u8,
    pub phase: JobStatus,
}

/// Percentage of source frames annotated, plus the job phase.
///
/// Only the annotation pass moves the percentage; transcoding is visible
/// through the phase alone.
#[derive(Debug)]
pub struct ProgressTracker {
    percent: AtomicU8,
    phase: AtomicU8,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self {
            percent: AtomicU8::new(0),
            phase: AtomicU8::new(JobStatus::Pending as u8),
        }
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to 0% at the start of a job.
    pub fn reset(&self) {
        self.percent.store(0, Ordering::Release);
        self.phase.store(JobStatus::Pending as u8, Ordering::Release);
    }

    /// Records `floor(frame_index / total_frames * 100)`, capped at 99.
    /// Never lowers the stored value.
    ///
    /// The declared total can be short of the real count, so only
    /// [`finish_annotation`](Self::finish_annotation) reports 100.
    pub fn update(&self, frame_index: u64, total_frames: u64) {
        if total_frames == 0 {
            return;
        }
        let pct = (frame_index.saturating_mul(100) / total_frames).min(99) as u8;
        self.percent.fetch_max(pct, Ordering::AcqRel);
    }

    /// The source is exhausted, so every frame has been processed even if
    /// the declared count was too high.
    pub fn finish_annotation(&self) {
        self.percent.store(100, Ordering::Release);
    }

    pub fn set_phase(&self, phase: JobStatus) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn read(&self) -> u8 {
        self.percent.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> JobStatus {
        JobStatus::from_u8(self.phase.load(Ordering::Acquire)).unwrap_or(JobStatus::Pending)
    }

    pub fn snapshot(&self) -> ProgressReport {
        ProgressReport {
            progress: self.read(),
            phase: self.phase(),
        }
    }
}
