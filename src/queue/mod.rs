//! Download queue view-model.
//!
//! Holds every [`DownloadJob`] the user has started, buckets them by status
//! and keeps a live ETA for jobs that are transferring. Jobs move forward
//! only:
//!
//! ```text
//! Downloading ──► Converting ──► Completed
//!      │               │
//!      └───────┬───────┴──► Error
//!              └──────────► Cancelled
//! ```
//!
//! Retry is the only way back out of `Error` or `Cancelled`.

mod eta;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::download::{AudioFormat, DownloadOutcome, Phase, ProgressEvent};
use crate::model::Track;

pub use eta::{EtaTracker, format_eta};

/// Identifies a job for its whole life, across retries.
pub type JobId = u64;

/// Counts the runs of one job; bumped by every retry.
pub type Attempt = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Downloading,
    Converting,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Downloading | JobStatus::Converting)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Downloading => "downloading",
            JobStatus::Converting => "converting",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// One user-requested download.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: JobId,
    /// Name the job was created with; the progress key
    pub requested_filename: String,
    /// Name shown to the user; replaced by the final name on completion
    pub filename: String,
    pub dest_dir: PathBuf,
    pub track_id: u64,
    pub format: AudioFormat,
    /// Run that results are currently accepted from
    pub attempt: Attempt,
    /// 0 - 100
    pub progress: u8,
    pub status: JobStatus,
    pub error: Option<String>,
    pub final_path: Option<PathBuf>,
    pub created_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("No download job with id {0}")]
    UnknownJob(JobId),

    #[error("{0} is already downloading")]
    Duplicate(String),

    #[error("Job {0} is still running")]
    NotRetryable(JobId),

    #[error("Job {0} has already finished")]
    NotActive(JobId),

    #[error("source not found")]
    SourceNotFound,
}

#[derive(Debug, Default)]
pub struct DownloadQueue {
    jobs: Vec<DownloadJob>,
    eta: HashMap<JobId, EtaTracker>,
    next_id: JobId,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a downloading job for `track`.
    ///
    /// Rejected while another active job uses the same filename, since
    /// progress is routed by filename.
    pub fn add(
        &mut self,
        track: &Track,
        dest_dir: PathBuf,
        format: AudioFormat,
    ) -> Result<JobId, QueueError> {
        let requested_filename = track.filename(format.extension());
        if self.active_by_key(&requested_filename).is_some() {
            return Err(QueueError::Duplicate(requested_filename));
        }

        self.next_id += 1;
        let id = self.next_id;
        self.jobs.push(DownloadJob {
            id,
            filename: requested_filename.clone(),
            requested_filename,
            dest_dir,
            track_id: track.id,
            format,
            attempt: 1,
            progress: 0,
            status: JobStatus::Downloading,
            error: None,
            final_path: None,
            created_at: Local::now(),
        });
        Ok(id)
    }

    pub fn get(&self, id: JobId) -> Option<&DownloadJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Whether `attempt` is the job's current run.
    pub fn is_current(&self, id: JobId, attempt: Attempt) -> bool {
        self.get(id).is_some_and(|j| j.attempt == attempt)
    }

    /// All jobs, oldest first.
    pub fn jobs(&self) -> &[DownloadJob] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// The active job using `key`, if any.
    pub fn active_by_key(&self, key: &str) -> Option<&DownloadJob> {
        self.jobs
            .iter()
            .find(|j| j.status.is_active() && j.requested_filename == key)
    }

    pub fn active(&self) -> impl Iterator<Item = &DownloadJob> {
        self.jobs.iter().filter(|j| j.status.is_active())
    }

    pub fn completed(&self) -> impl Iterator<Item = &DownloadJob> {
        self.with_status(JobStatus::Completed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &DownloadJob> {
        self.with_status(JobStatus::Error)
    }

    pub fn cancelled(&self) -> impl Iterator<Item = &DownloadJob> {
        self.with_status(JobStatus::Cancelled)
    }

    fn with_status(&self, status: JobStatus) -> impl Iterator<Item = &DownloadJob> {
        self.jobs.iter().filter(move |j| j.status == status)
    }

    /// Apply a progress event to the active job with the event's key.
    ///
    /// Returns the id of the job that changed. Events for unknown keys or
    /// terminal jobs are dropped.
    pub fn apply_progress(&mut self, event: &ProgressEvent, now: Instant) -> Option<JobId> {
        let job = self
            .jobs
            .iter_mut()
            .find(|j| j.status.is_active() && j.requested_filename == event.key)?;

        match event.phase {
            Phase::Converting => {
                job.status = JobStatus::Converting;
                job.progress = 0;
                self.eta.remove(&job.id);
            }
            Phase::Transferring => {
                if job.status != JobStatus::Downloading || event.percentage <= job.progress {
                    return None;
                }
                job.progress = event.percentage.min(100);
                self.eta.entry(job.id).or_default().record(job.progress, now);
            }
        }
        Some(job.id)
    }

    /// Remaining time for a transferring job.
    pub fn eta(&self, id: JobId) -> Option<Duration> {
        self.eta.get(&id)?.estimate()
    }

    /// Mark an active job finished and adopt the name it ended up with.
    pub fn complete(&mut self, id: JobId, outcome: &DownloadOutcome) -> Result<(), QueueError> {
        let job = self.active_job_mut(id)?;
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.filename = outcome.filename.clone();
        job.final_path = Some(outcome.path.clone());
        self.eta.remove(&id);
        Ok(())
    }

    /// Mark an active job failed.
    pub fn fail(&mut self, id: JobId, message: impl Into<String>) -> Result<(), QueueError> {
        let job = self.active_job_mut(id)?;
        job.status = JobStatus::Error;
        job.error = Some(message.into());
        self.eta.remove(&id);
        Ok(())
    }

    /// Cancel a job. Returns the key to abort when it was active.
    pub fn cancel(&mut self, id: JobId) -> Result<Option<String>, QueueError> {
        let job = self.job_mut(id)?;
        if job.status.is_terminal() {
            return Ok(None);
        }
        job.status = JobStatus::Cancelled;
        let key = job.requested_filename.clone();
        self.eta.remove(&id);
        Ok(Some(key))
    }

    /// Drop a job. Returns the key to abort when it was active.
    pub fn remove(&mut self, id: JobId) -> Result<Option<String>, QueueError> {
        let key = self.cancel(id)?;
        self.jobs.retain(|j| j.id != id);
        Ok(key)
    }

    pub fn clear_completed(&mut self) {
        self.jobs.retain(|j| j.status != JobStatus::Completed);
    }

    /// Drop every job. Returns the keys of the ones still running.
    pub fn clear_all(&mut self) -> Vec<String> {
        let keys = self
            .active()
            .map(|j| j.requested_filename.clone())
            .collect();
        self.jobs.clear();
        self.eta.clear();
        keys
    }

    /// Put a failed or cancelled job back to downloading.
    ///
    /// Starts a new attempt; results of earlier ones no longer apply.
    /// The originating track is found by matching the job's filename
    /// against `candidates` (the currently loaded search and album
    /// results). Without a match the job returns to `Error` with
    /// "source not found".
    pub fn begin_retry(&mut self, id: JobId, candidates: &[Track]) -> Result<Track, QueueError> {
        let job = self.get(id).ok_or(QueueError::UnknownJob(id))?;
        if job.status.is_active() || job.status == JobStatus::Completed {
            return Err(QueueError::NotRetryable(id));
        }
        if self.active_by_key(&job.requested_filename).is_some() {
            return Err(QueueError::Duplicate(job.requested_filename.clone()));
        }

        let extension = job.format.extension();
        let matched = candidates
            .iter()
            .find(|t| t.filename(extension) == job.requested_filename)
            .cloned();

        let job = self.job_mut(id)?;
        job.attempt += 1;
        job.status = JobStatus::Downloading;
        job.progress = 0;
        job.error = None;
        job.final_path = None;
        job.filename = job.requested_filename.clone();

        match matched {
            Some(track) => {
                job.track_id = track.id;
                Ok(track)
            }
            None => {
                job.status = JobStatus::Error;
                job.error = Some(QueueError::SourceNotFound.to_string());
                Err(QueueError::SourceNotFound)
            }
        }
    }

    fn job_mut(&mut self, id: JobId) -> Result<&mut DownloadJob, QueueError> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(QueueError::UnknownJob(id))
    }

    fn active_job_mut(&mut self, id: JobId) -> Result<&mut DownloadJob, QueueError> {
        let job = self.job_mut(id)?;
        if job.status.is_terminal() {
            return Err(QueueError::NotActive(id));
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_track;

    fn progress(key: &str, percentage: u8) -> ProgressEvent {
        ProgressEvent {
            key: key.to_string(),
            percentage,
            phase: Phase::Transferring,
        }
    }

    fn queue_with_job() -> (DownloadQueue, JobId, String) {
        let mut queue = DownloadQueue::new();
        let track = mock_track(1, "Band", "Song");
        let id = queue
            .add(&track, PathBuf::from("/dl"), AudioFormat::Flac)
            .unwrap();
        (queue, id, "Band - Song.flac".to_string())
    }

    #[test]
    fn test_add_uses_track_filename() {
        let (queue, id, key) = queue_with_job();
        let job = queue.get(id).unwrap();
        assert_eq!(job.requested_filename, key);
        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(queue.active().count(), 1);
    }

    #[test]
    fn test_duplicate_active_key_is_rejected() {
        let (mut queue, _, key) = queue_with_job();
        let track = mock_track(1, "Band", "Song");
        assert_eq!(
            queue.add(&track, PathBuf::from("/dl"), AudioFormat::Flac),
            Err(QueueError::Duplicate(key))
        );
        // Different format, different key.
        assert!(queue.add(&track, PathBuf::from("/dl"), AudioFormat::Mp3).is_ok());
    }

    #[test]
    fn test_progress_is_monotonic_and_routed_by_key() {
        let (mut queue, id, key) = queue_with_job();
        let now = Instant::now();

        assert_eq!(queue.apply_progress(&progress(&key, 40), now), Some(id));
        assert_eq!(queue.apply_progress(&progress(&key, 30), now), None);
        assert_eq!(queue.apply_progress(&progress("other.flac", 90), now), None);
        assert_eq!(queue.get(id).unwrap().progress, 40);
    }

    #[test]
    fn test_converting_resets_progress_and_eta() {
        let (mut queue, id, key) = queue_with_job();
        let start = Instant::now();
        queue.apply_progress(&progress(&key, 50), start);
        queue.apply_progress(&progress(&key, 100), start + Duration::from_secs(5));
        assert!(queue.eta(id).is_some());

        let event = ProgressEvent {
            key: key.clone(),
            percentage: 0,
            phase: Phase::Converting,
        };
        queue.apply_progress(&event, start + Duration::from_secs(6));

        let job = queue.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Converting);
        assert_eq!(job.progress, 0);
        assert_eq!(queue.eta(id), None);

        // Late transfer events do not move a converting job backwards.
        assert_eq!(queue.apply_progress(&progress(&key, 100), start), None);
        assert_eq!(queue.get(id).unwrap().status, JobStatus::Converting);
    }

    #[test]
    fn test_eta_from_progress() {
        let (mut queue, id, key) = queue_with_job();
        let start = Instant::now();
        queue.apply_progress(&progress(&key, 10), start);
        assert_eq!(queue.eta(id), None);
        queue.apply_progress(&progress(&key, 30), start + Duration::from_secs(4));
        // 5%/s, 70% left
        assert_eq!(queue.eta(id), Some(Duration::from_secs(14)));
    }

    #[test]
    fn test_complete_adopts_final_name() {
        let (mut queue, id, _) = queue_with_job();
        let outcome = DownloadOutcome {
            path: PathBuf::from("/dl/Band - Song - 2.flac"),
            filename: "Band - Song - 2.flac".to_string(),
        };
        queue.complete(id, &outcome).unwrap();

        let job = queue.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.filename, "Band - Song - 2.flac");
        assert_eq!(job.requested_filename, "Band - Song.flac");
        assert_eq!(queue.completed().count(), 1);
        assert_eq!(queue.active().count(), 0);
    }

    #[test]
    fn test_terminal_jobs_ignore_progress_and_outcomes() {
        let (mut queue, id, key) = queue_with_job();
        assert_eq!(queue.cancel(id), Ok(Some(key.clone())));

        assert_eq!(queue.apply_progress(&progress(&key, 80), Instant::now()), None);
        assert_eq!(queue.fail(id, "late"), Err(QueueError::NotActive(id)));
        assert_eq!(queue.get(id).unwrap().status, JobStatus::Cancelled);
        assert_eq!(queue.cancel(id), Ok(None));
    }

    #[test]
    fn test_completed_job_is_final() {
        let (mut queue, id, key) = queue_with_job();
        let outcome = DownloadOutcome {
            path: PathBuf::from("/dl/Band - Song - 2.flac"),
            filename: "Band - Song - 2.flac".to_string(),
        };
        queue.complete(id, &outcome).unwrap();

        assert_eq!(queue.cancel(id), Ok(None));
        assert_eq!(queue.apply_progress(&progress(&key, 50), Instant::now()), None);
        assert_eq!(queue.fail(id, "late"), Err(QueueError::NotActive(id)));
        assert_eq!(queue.complete(id, &outcome), Err(QueueError::NotActive(id)));

        let job = queue.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.filename, "Band - Song - 2.flac");
        assert_eq!(job.final_path, Some(outcome.path));
        assert_eq!(job.error, None);
    }

    #[test]
    fn test_remove_active_returns_key() {
        let (mut queue, id, key) = queue_with_job();
        assert_eq!(queue.remove(id), Ok(Some(key)));
        assert!(queue.is_empty());
        assert_eq!(queue.remove(id), Err(QueueError::UnknownJob(id)));
    }

    #[test]
    fn test_clear_completed_and_all() {
        let (mut queue, done, _) = queue_with_job();
        queue
            .complete(
                done,
                &DownloadOutcome {
                    path: PathBuf::from("/dl/x.flac"),
                    filename: "x.flac".to_string(),
                },
            )
            .unwrap();
        let running = queue
            .add(&mock_track(2, "Other", "Tune"), PathBuf::from("/dl"), AudioFormat::Flac)
            .unwrap();

        queue.clear_completed();
        assert!(queue.get(done).is_none());
        assert!(queue.get(running).is_some());

        assert_eq!(queue.clear_all(), vec!["Other - Tune.flac".to_string()]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_retry_reuses_job_and_matches_by_filename() {
        let (mut queue, id, _) = queue_with_job();
        queue.fail(id, "Network error: reset").unwrap();

        let candidates = vec![mock_track(9, "Else", "Other"), mock_track(1, "Band", "Song")];
        let track = queue.begin_retry(id, &candidates).unwrap();

        assert_eq!(track.id, 1);
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_current(id, 1));
        assert!(queue.is_current(id, 2));
        let job = queue.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(job.progress, 0);
        assert_eq!(job.error, None);
    }

    #[test]
    fn test_retry_without_match_returns_to_error() {
        let (mut queue, id, _) = queue_with_job();
        queue.cancel(id).unwrap();

        assert_eq!(queue.begin_retry(id, &[]), Err(QueueError::SourceNotFound));

        let job = queue.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("source not found"));
    }

    #[test]
    fn test_retry_of_active_job_is_rejected() {
        let (mut queue, id, _) = queue_with_job();
        assert_eq!(
            queue.begin_retry(id, &[mock_track(1, "Band", "Song")]),
            Err(QueueError::NotRetryable(id))
        );
    }
}
