//! The update loop.
//!
//! All state lives in [`App`] and changes only inside [`App::update`], one
//! [`Message`] at a time. Catalog lookups, transfers and source resolution
//! run in spawned tasks that report back by sending a message.
//!
//! Handlers are split by concern:
//! - `downloads`: job lifecycle, album sequencing, retry
//! - `playback`: track selection, navigation, transport controls

mod downloads;
mod messages;
mod playback;

pub use messages::Message;

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::catalog::CatalogApi;
use crate::config::Config;
use crate::download::{DownloadManager, Encoder, Fetcher, ProgressEvent};
use crate::model::{Album, AlbumDetail, Track};
use crate::player::{MediaEngine, PlaybackEngine, PlaybackSession};
use crate::queue::{DownloadQueue, JobId};

/// Receiving side of the loop: commands and task results plus the
/// download progress stream.
pub struct Inbox {
    messages: UnboundedReceiver<Message>,
    progress: UnboundedReceiver<ProgressEvent>,
}

impl Inbox {
    /// Next message, progress events included.
    pub async fn recv(&mut self) -> Option<Message> {
        tokio::select! {
            Some(msg) = self.messages.recv() => Some(msg),
            Some(event) = self.progress.recv() => Some(Message::Progress(event)),
            else => None,
        }
    }
}

/// Tracks of an album download still waiting for their turn.
#[derive(Debug, Default)]
pub(crate) struct AlbumRun {
    pending: VecDeque<Track>,
    dest_dir: std::path::PathBuf,
    current: Option<JobId>,
}

/// Application state.
pub struct App {
    config: Config,
    catalog: Arc<dyn CatalogApi>,
    downloads: DownloadManager,
    queue: DownloadQueue,
    player: PlaybackEngine,
    tracks: Vec<Track>,
    albums: Vec<Album>,
    album: Option<AlbumDetail>,
    album_run: Option<AlbumRun>,
    /// Job tasks spawned but not yet reported back
    running: usize,
    status: String,
    quit: bool,
    tx: UnboundedSender<Message>,
}

impl App {
    pub fn new(
        config: Config,
        catalog: Arc<dyn CatalogApi>,
        fetcher: Arc<dyn Fetcher>,
        encoder: Arc<dyn Encoder>,
        media: Box<dyn MediaEngine>,
    ) -> (Self, Inbox) {
        let (tx, messages) = mpsc::unbounded_channel();
        let (progress_tx, progress) = mpsc::unbounded_channel();

        let player = PlaybackEngine::new(media, config.playback.volume)
            .with_preferred_quality(config.playback.preferred_quality);

        let app = Self {
            downloads: DownloadManager::new(fetcher, encoder, progress_tx),
            catalog,
            queue: DownloadQueue::new(),
            player,
            tracks: Vec::new(),
            albums: Vec::new(),
            album: None,
            album_run: None,
            running: 0,
            status: String::new(),
            quit: false,
            tx,
            config,
        };
        (app, Inbox { messages, progress })
    }

    /// Sender for feeding commands into the loop.
    pub fn sender(&self) -> UnboundedSender<Message> {
        self.tx.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &DownloadQueue {
        &self.queue
    }

    pub fn session(&self) -> &PlaybackSession {
        self.player.session()
    }

    /// Track search results currently loaded.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn albums(&self) -> &[Album] {
        &self.albums
    }

    pub fn album(&self) -> Option<&AlbumDetail> {
        self.album.as_ref()
    }

    /// Last user-facing status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Nothing downloading, no album tracks waiting and every job task
    /// (cancelled ones included) has reported back.
    pub fn downloads_idle(&self) -> bool {
        self.queue.active().next().is_none() && self.album_run.is_none() && self.running == 0
    }

    /// Apply one message.
    pub fn update(&mut self, msg: Message) {
        match msg {
            Message::SearchTracks(query) => {
                let catalog = Arc::clone(&self.catalog);
                self.spawn(async move {
                    Message::TracksLoaded(
                        catalog.search_tracks(&query).await.map_err(|e| e.to_string()),
                    )
                });
            }
            Message::SearchAlbums(query) => {
                let catalog = Arc::clone(&self.catalog);
                self.spawn(async move {
                    Message::AlbumsLoaded(
                        catalog.search_albums(&query).await.map_err(|e| e.to_string()),
                    )
                });
            }
            Message::TracksLoaded(result) => match result {
                Ok(tracks) => {
                    self.status = format!("{} tracks found", tracks.len());
                    self.tracks = tracks;
                }
                Err(e) => self.report_error("Search failed", &e),
            },
            Message::AlbumsLoaded(result) => match result {
                Ok(albums) => {
                    self.status = format!("{} albums found", albums.len());
                    self.albums = albums;
                }
                Err(e) => self.report_error("Album search failed", &e),
            },
            Message::LoadAlbum(album_id) => {
                let catalog = Arc::clone(&self.catalog);
                self.spawn(async move {
                    Message::AlbumLoaded(
                        catalog.album_detail(album_id).await.map_err(|e| e.to_string()),
                    )
                });
            }
            Message::AlbumLoaded(result) => match result {
                Ok(detail) => {
                    self.status = format!(
                        "{} ({} tracks)",
                        detail.album.title,
                        detail.tracks.len()
                    );
                    self.album = Some(detail);
                }
                Err(e) => self.report_error("Album lookup failed", &e),
            },

            Message::DownloadTrack(_)
            | Message::DownloadAlbum
            | Message::AlbumStepDue
            | Message::Progress(_)
            | Message::DownloadFinished { .. }
            | Message::CancelJob(_)
            | Message::RemoveJob(_)
            | Message::RetryJob(_)
            | Message::ClearCompleted
            | Message::ClearAll => downloads::handle_downloads(self, msg),

            Message::PlayTrack(_)
            | Message::PlayAlbumTrack(_)
            | Message::NavigationResolved { .. }
            | Message::PlayerToggle
            | Message::PlayerNext
            | Message::PlayerPrevious
            | Message::PlayerSeek(_)
            | Message::PlayerVolume(_)
            | Message::PlayerToggleMute
            | Message::PlayerStop
            | Message::PlayerTick => playback::handle_playback(self, msg),

            Message::Quit => {
                debug!("Quit requested");
                self.player.stop();
                self.quit = true;
            }
        }
    }

    /// Drive the loop until `observer` breaks, the app quits or every
    /// sender is gone. `observer` sees the state after each message.
    pub async fn run(
        &mut self,
        inbox: &mut Inbox,
        mut observer: impl FnMut(&App, &Message) -> ControlFlow<()>,
    ) {
        while !self.quit {
            let Some(msg) = inbox.recv().await else {
                break;
            };
            let seen = msg.clone();
            self.update(msg);
            if observer(self, &seen).is_break() {
                break;
            }
        }
    }

    /// Tracks a retry or a command may refer to: search results, then the
    /// loaded album.
    fn loaded_tracks(&self) -> Vec<Track> {
        let mut tracks = self.tracks.clone();
        if let Some(album) = &self.album {
            tracks.extend(album.tracks.iter().cloned());
        }
        tracks
    }

    fn find_loaded(&self, track_id: u64) -> Option<Track> {
        self.tracks
            .iter()
            .chain(self.album.iter().flat_map(|a| a.tracks.iter()))
            .find(|t| t.id == track_id)
            .cloned()
    }

    fn report_error(&mut self, context: &str, error: &str) {
        warn!(error = %error, "{}", context);
        self.status = format!("{}: {}", context, error);
    }

    /// Run `task` in the background and feed its message back into the loop.
    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = Message> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            // Receiver gone means the loop has shut down.
            let _ = tx.send(task.await);
        });
    }
}

#[cfg(test)]
mod tests;
