//! Download job handlers.
//!
//! A job is added to the queue first and its key reserved with the
//! download manager, so a cancel aborts it from then on. One task then
//! resolves the source through the quality fallback chain and runs the
//! download pipeline. Every run of a job is a new attempt; results of
//! older attempts are dropped. Album tracks go one at a time with a
//! pause after each finished job.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::catalog::resolve_with_fallback;
use crate::download::{AudioFormat, DownloadError, DownloadOutcome, clean_folder_name};
use crate::model::Track;
use crate::queue::{Attempt, JobId, QueueError};

use super::{AlbumRun, App, Message};

/// Folder under the download directory that holds album folders.
const ALBUMS_DIR: &str = "albums";

pub(super) fn handle_downloads(app: &mut App, msg: Message) {
    match msg {
        Message::DownloadTrack(track_id) => {
            let Some(track) = app.find_loaded(track_id) else {
                app.status = format!("Track {} is not in the loaded results", track_id);
                return;
            };
            let dest_dir = app.config.download.directory.clone();
            if let Err(e) = add_job(app, &track, dest_dir) {
                app.report_error("Could not queue download", &e.to_string());
            }
        }

        Message::DownloadAlbum => start_album(app),

        Message::AlbumStepDue => advance_album(app),

        Message::Progress(event) => {
            if app.queue.apply_progress(&event, Instant::now()).is_none() {
                debug!(target: "download", key = %event.key, "Progress for no active job");
            }
        }

        Message::DownloadFinished {
            job_id,
            attempt,
            result,
        } => {
            app.running = app.running.saturating_sub(1);
            let stale = app.queue.get(job_id).is_some_and(|j| j.attempt != attempt);
            if stale {
                debug!(target: "download", job_id, attempt, "Result of a superseded attempt ignored");
                return;
            }
            finish_job(app, job_id, result);
            if app
                .album_run
                .as_ref()
                .is_some_and(|run| run.current == Some(job_id))
            {
                schedule_album_step(app);
            }
        }

        Message::CancelJob(job_id) => match app.queue.cancel(job_id) {
            Ok(Some(key)) => {
                app.downloads.cancel(&key);
                app.status = format!("Cancelled {}", key);
            }
            Ok(None) => {}
            Err(e) => app.report_error("Cancel failed", &e.to_string()),
        },

        Message::RemoveJob(job_id) => match app.queue.remove(job_id) {
            Ok(Some(key)) => {
                app.downloads.cancel(&key);
            }
            Ok(None) => {}
            Err(e) => app.report_error("Remove failed", &e.to_string()),
        },

        Message::RetryJob(job_id) => retry_job(app, job_id),

        Message::ClearCompleted => app.queue.clear_completed(),

        Message::ClearAll => {
            app.album_run = None;
            for key in app.queue.clear_all() {
                app.downloads.cancel(&key);
            }
        }

        _ => {}
    }
}

/// Queue a job for `track` and start it.
fn add_job(app: &mut App, track: &Track, dest_dir: PathBuf) -> Result<JobId, QueueError> {
    let format = app.config.download.preferred_format;
    let job_id = app.queue.add(track, dest_dir.clone(), format)?;
    info!(target: "download", job_id, track = %track.display_name(), %format, "Queued download");
    app.status = format!("Downloading {}", track.display_name());
    start_attempt(app, job_id, 1, track, dest_dir, format);
    Ok(job_id)
}

/// Start one attempt of a job, failing the job when its key is taken.
fn start_attempt(
    app: &mut App,
    job_id: JobId,
    attempt: Attempt,
    track: &Track,
    dest_dir: PathBuf,
    format: AudioFormat,
) {
    if let Err(e) = spawn_job(app, job_id, attempt, track, dest_dir, format) {
        app.report_error("Could not start download", &e.to_string());
        if let Err(e) = app.queue.fail(job_id, e.to_string()) {
            debug!(target: "download", job_id, error = %e, "Job already settled");
        }
    }
}

/// Reserve the job's key, then resolve the source and run the pipeline.
fn spawn_job(
    app: &mut App,
    job_id: JobId,
    attempt: Attempt,
    track: &Track,
    dest_dir: PathBuf,
    format: AudioFormat,
) -> Result<(), DownloadError> {
    let reservation = app.downloads.reserve(&track.filename(format.extension()))?;
    let catalog = Arc::clone(&app.catalog);
    let downloads = app.downloads.clone();
    let track_id = track.id;
    let quality = track.best_quality();

    app.running += 1;
    app.spawn(async move {
        let resolve = async move {
            resolve_with_fallback(catalog.as_ref(), track_id, quality)
                .await
                .map(|source| source.url)
                .map_err(DownloadError::from)
        };
        let result = downloads
            .download_resolving(reservation, dest_dir, format, resolve)
            .await;
        Message::DownloadFinished {
            job_id,
            attempt,
            result,
        }
    });
    Ok(())
}

fn finish_job(app: &mut App, job_id: JobId, result: Result<DownloadOutcome, DownloadError>) {
    let outcome = match result {
        Ok(outcome) => app.queue.complete(job_id, &outcome).map(|()| {
            app.status = format!("Saved {}", outcome.path.display());
        }),
        // The queue already moved the job when the user cancelled it.
        Err(DownloadError::Cancelled) => Ok(()),
        Err(e) => {
            app.status = format!("Download failed: {}", e);
            app.queue.fail(job_id, e.to_string())
        }
    };

    if let Err(e) = outcome {
        debug!(target: "download", job_id, error = %e, "Late result for job ignored");
    }
}

fn retry_job(app: &mut App, job_id: JobId) {
    let candidates = app.loaded_tracks();
    match app.queue.begin_retry(job_id, &candidates) {
        Ok(track) => {
            let Some(job) = app.queue.get(job_id) else {
                return;
            };
            let (dest_dir, format, attempt) = (job.dest_dir.clone(), job.format, job.attempt);
            info!(target: "download", job_id, attempt, track = %track.display_name(), "Retrying download");
            app.status = format!("Retrying {}", track.display_name());
            start_attempt(app, job_id, attempt, &track, dest_dir, format);
        }
        Err(QueueError::SourceNotFound) => {
            warn!(target: "download", job_id, "Retry found no matching track in loaded results");
            app.status = format!("Retry failed: {}", QueueError::SourceNotFound);
        }
        Err(e) => app.report_error("Retry failed", &e.to_string()),
    }
}

fn start_album(app: &mut App) {
    let Some(album) = app.album.clone() else {
        app.status = "No album loaded".to_string();
        return;
    };
    if app.album_run.is_some() {
        app.status = "An album download is already running".to_string();
        return;
    }
    if album.tracks.is_empty() {
        app.status = format!("{} has no tracks", album.album.title);
        return;
    }

    let dest_dir = app
        .config
        .download
        .directory
        .join(ALBUMS_DIR)
        .join(clean_folder_name(&album.album.title));
    info!(
        target: "download",
        album = %album.album.title,
        tracks = album.tracks.len(),
        dir = %dest_dir.display(),
        "Starting album download"
    );

    app.album_run = Some(AlbumRun {
        pending: album.tracks.into_iter().collect(),
        dest_dir,
        current: None,
    });
    advance_album(app);
}

/// Start the next waiting album track, skipping ones that cannot be queued.
fn advance_album(app: &mut App) {
    loop {
        let Some(run) = app.album_run.as_mut() else {
            return;
        };
        let Some(track) = run.pending.pop_front() else {
            info!(target: "download", "Album download finished");
            app.album_run = None;
            return;
        };
        let dest_dir = run.dest_dir.clone();

        match add_job(app, &track, dest_dir) {
            Ok(job_id) => {
                if app.queue.get(job_id).is_some_and(|j| j.status.is_terminal()) {
                    // Failed before a task was spawned; nothing will report back.
                    schedule_album_step(app);
                } else if let Some(run) = app.album_run.as_mut() {
                    run.current = Some(job_id);
                }
                return;
            }
            Err(e) => {
                warn!(target: "download", track = %track.display_name(), error = %e, "Skipping album track");
            }
        }
    }
}

fn schedule_album_step(app: &mut App) {
    if let Some(run) = app.album_run.as_mut() {
        run.current = None;
    }
    let delay = Duration::from_millis(app.config.download.album_delay_ms);
    app.spawn(async move {
        tokio::time::sleep(delay).await;
        Message::AlbumStepDue
    });
}
