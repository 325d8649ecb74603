use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AnnotateError, Result};

/// Lifecycle of a job. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum JobStatus {
    Pending = 0,
    Annotating = 1,
    Transcoding = 2,
    Completed = 3,
    Failed = 4,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Annotating)
                | (Annotating, Transcoding)
                | (Transcoding, Completed)
                | (Pending | Annotating | Transcoding, Failed)
        )
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Pending),
            1 => Some(Self::Annotating),
            2 => Some(Self::Transcoding),
            3 => Some(Self::Completed),
            4 => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Annotating => "annotating",
            Self::Transcoding => "transcoding",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where a job reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPaths {
    pub source: PathBuf,
    /// Intermediate file written frame by frame.
    pub annotated: PathBuf,
    /// Transcoded deliverable.
    pub output: PathBuf,
}

impl JobPaths {
    /// `<dir>/<stem>_output.mp4` and `<dir>/<stem>_output_reencoded.mp4`.
    pub fn derive(output_dir: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let source = source.into();
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        Self {
            annotated: output_dir.join(format!("{stem}_output.mp4")),
            output: output_dir.join(format!("{stem}_output_reencoded.mp4")),
            source,
        }
    }

    /// Sidecar json for per-frame detections, next to the annotated file.
    pub fn metadata(&self) -> PathBuf {
        self.annotated.with_extension("json")
    }
}

/// One end-to-end processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoJob {
    pub id: Uuid,
    pub preset: String,
    pub paths: JobPaths,
    pub status: JobStatus,
    pub progress: u8,
    pub error: Option<String>,
    /// Final output location, set only once the job has completed.
    pub result: Option<PathBuf>,
}

impl VideoJob {
    pub fn new(preset: impl Into<String>, paths: JobPaths) -> Self {
        Self {
            id: Uuid::new_v4(),
            preset: preset.into(),
            paths,
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            result: None,
        }
    }

    pub fn advance(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AnnotateError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        log::debug!("job {}: {} -> {}", self.id, self.status, next);
        self.status = next;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.advance(JobStatus::Completed)?;
        self.result = Some(self.paths.output.clone());
        Ok(())
    }

    pub fn fail(&mut self, err: &AnnotateError) -> Result<()> {
        self.advance(JobStatus::Failed)?;
        self.error = Some(err.to_string());
        self.result = None;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> VideoJob {
        VideoJob::new("video1", JobPaths::derive("static", "static/videos/video1.mp4"))
    }

    #[test]
    fn derives_output_names_from_source_stem() {
        let paths = JobPaths::derive("static", "static/videos/video1.mp4");
        assert_eq!(paths.annotated, PathBuf::from("static/video1_output.mp4"));
        assert_eq!(
            paths.output,
            PathBuf::from("static/video1_output_reencoded.mp4")
        );
        assert_eq!(paths.metadata(), PathBuf::from("static/video1_output.json"));
    }

    #[test]
    fn happy_path_transitions() {
        let mut job = job();
        job.advance(JobStatus::Annotating).unwrap();
        job.advance(JobStatus::Transcoding).unwrap();
        job.complete().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(job.paths.output.clone()));
        assert!(!job.is_active());
    }

    #[test]
    fn transitions_never_go_backwards() {
        let mut job = job();
        job.advance(JobStatus::Annotating).unwrap();
        job.advance(JobStatus::Transcoding).unwrap();
        let err = job.advance(JobStatus::Annotating).unwrap_err();
        assert!(matches!(err, AnnotateError::InvalidTransition { .. }));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = job();
        job.fail(&AnnotateError::Cancelled).unwrap();
        assert_eq!(job.error.as_deref(), Some("job was cancelled"));
        assert!(job.advance(JobStatus::Annotating).is_err());
        assert!(job.complete().is_err());
        assert!(job.result.is_none());
    }

    #[test]
    fn cannot_skip_annotation() {
        let mut job = job();
        assert!(job.advance(JobStatus::Transcoding).is_err());
        assert!(job.complete().is_err());
    }

    #[test]
    fn status_round_trips_through_u8() {
        for status in [
            JobStatus::Pending,
            JobStatus::Annotating,
            JobStatus::Transcoding,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_u8(status as u8), Some(status));
        }
        assert_eq!(JobStatus::from_u8(9), None);
    }
}
