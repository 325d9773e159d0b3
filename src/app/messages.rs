//! Message types for the update loop.

use crate::download::{DownloadError, DownloadOutcome, ProgressEvent};
use crate::model::{Album, AlbumDetail, Track};
use crate::queue::{Attempt, JobId};

/// Everything that can change application state.
#[derive(Debug, Clone)]
pub enum Message {
    // Catalog
    SearchTracks(String),
    SearchAlbums(String),
    TracksLoaded(Result<Vec<Track>, String>),
    AlbumsLoaded(Result<Vec<Album>, String>),
    LoadAlbum(u64),
    AlbumLoaded(Result<AlbumDetail, String>),

    // Downloads
    DownloadTrack(u64),   // Track id from the loaded results
    DownloadAlbum,        // Every track of the loaded album
    AlbumStepDue,         // Inter-job delay elapsed
    Progress(ProgressEvent),
    DownloadFinished {
        job_id: JobId,
        attempt: Attempt,
        result: Result<DownloadOutcome, DownloadError>,
    },
    CancelJob(JobId),
    RemoveJob(JobId),
    RetryJob(JobId),
    ClearCompleted,
    ClearAll,

    // Playback
    PlayTrack(u64),       // Track id from the loaded results
    PlayAlbumTrack(usize), // Index into the loaded album
    NavigationResolved {
        generation: u64,
        result: Result<String, String>,
    },
    PlayerToggle,
    PlayerNext,
    PlayerPrevious,
    PlayerSeek(f64),
    PlayerVolume(u8),
    PlayerToggleMute,
    PlayerStop,
    PlayerTick, // Drain media backend events

    Quit,
}
