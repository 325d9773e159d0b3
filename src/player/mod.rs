//! Streaming preview player.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  PlaybackEngine (update loop)                   │
//! │   Session state machine, playlist navigation, load supersession │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ MediaEngine trait
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              StreamingEngine (loader + audio thread)            │
//! │  Streams the source, decodes with symphonia as it arrives,      │
//! │  resamples                                                      │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ cpal callback
//!                              ▼
//!                         Output device
//! ```
//!
//! Navigation is two-phase: `next()`/`previous()` select the target track
//! right away (status `Loading`) and hand back a [`NavigationRequest`]; the
//! caller resolves a URL off-loop and reports it through
//! [`PlaybackEngine::source_resolved`]. Any later navigation or `play()`
//! makes earlier requests stale.

mod audio;
mod decoder;
mod engine;
mod resampler;
mod state;
mod stream;

pub use audio::StreamingEngine;
pub use decoder::AudioDecoder;
pub use engine::{LoadId, MediaEngine, MediaEvent, NullEngine};
pub use state::{PlaySource, PlaybackSession, PlaybackStatus, Playlist, format_duration};

#[cfg(test)]
pub use engine::mocks;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::catalog::QualityTier;
use crate::model::Track;

/// A track whose source must be resolved before it can play.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationRequest {
    /// Matches the engine's navigation generation while still current
    pub generation: u64,
    pub track_id: u64,
    /// First tier to try
    pub quality: QualityTier,
}

/// Playback state machine over one media backend.
pub struct PlaybackEngine {
    session: PlaybackSession,
    media: Box<dyn MediaEngine>,
    load_id: LoadId,
    generation: u64,
    preferred_quality: Option<QualityTier>,
}

impl PlaybackEngine {
    pub fn new(media: Box<dyn MediaEngine>, volume: u8) -> Self {
        let mut engine = Self {
            session: PlaybackSession {
                volume: volume.min(100),
                ..Default::default()
            },
            media,
            load_id: 0,
            generation: 0,
            preferred_quality: None,
        };
        engine.apply_gain();
        engine
    }

    /// Request this tier first instead of each track's best advertised one.
    pub fn with_preferred_quality(mut self, quality: Option<QualityTier>) -> Self {
        self.preferred_quality = quality;
        self
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    /// Select `track` and start playing `url`.
    ///
    /// The session is updated even when `url` is empty; playback then waits
    /// in `Loading` for a later call with a real URL. Supersedes any pending
    /// navigation and any earlier load.
    pub fn play(&mut self, track: Track, url: &str, source: PlaySource, playlist: Option<Playlist>) {
        self.generation += 1;
        self.load_id += 1;

        let (tracks, index) = match playlist {
            Some(p) if p.index < p.tracks.len() => (p.tracks, Some(p.index)),
            _ => (Vec::new(), None),
        };

        debug!(target: "playback", track_id = track.id, empty_url = url.is_empty(), ?source, "play");
        self.session.current_track = Some(track);
        self.session.source = source;
        self.session.playlist = tracks;
        self.session.current_index = index;
        self.session.progress = 0.0;
        self.session.position = Duration::ZERO;
        self.session.error = None;
        self.session.status = PlaybackStatus::Loading;

        // An empty URL only selects; the media keeps whatever it has.
        if !url.is_empty() {
            self.media.stop();
            self.media.load(self.load_id, url);
        }
    }

    /// Select `track` and return the request that resolves its source.
    pub fn begin(
        &mut self,
        track: Track,
        source: PlaySource,
        playlist: Option<Playlist>,
    ) -> NavigationRequest {
        let quality = self.preferred_quality.unwrap_or_else(|| track.best_quality());
        let track_id = track.id;
        self.play(track, "", source, playlist);
        NavigationRequest {
            generation: self.generation,
            track_id,
            quality,
        }
    }

    pub fn pause(&mut self) {
        if self.session.status == PlaybackStatus::Playing {
            self.media.pause();
            self.session.status = PlaybackStatus::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.session.status == PlaybackStatus::Paused {
            self.media.play();
            self.session.status = PlaybackStatus::Playing;
        }
    }

    /// Toggle between playing and paused.
    pub fn toggle(&mut self) {
        match self.session.status {
            PlaybackStatus::Playing => self.pause(),
            PlaybackStatus::Paused => self.resume(),
            _ => {}
        }
    }

    /// Jump to `seconds` into the current track.
    pub fn seek(&mut self, seconds: f64) {
        if self.session.current_track.is_none() {
            return;
        }
        let position = Duration::from_secs_f64(seconds.max(0.0));
        self.session.position = position;
        self.session.progress = self.session.progress_at(position);
        self.media.seek(position);
    }

    pub fn next(&mut self) -> Option<NavigationRequest> {
        let index = self.navigable_index()?;
        if index + 1 >= self.session.playlist.len() {
            debug!(target: "playback", "next: already at last track");
            return None;
        }
        Some(self.navigate_to(index + 1))
    }

    pub fn previous(&mut self) -> Option<NavigationRequest> {
        let index = self.navigable_index()?;
        if index == 0 {
            debug!(target: "playback", "previous: already at first track");
            return None;
        }
        Some(self.navigate_to(index - 1))
    }

    fn navigable_index(&self) -> Option<usize> {
        if !self.session.source.has_playlist() || self.session.playlist.is_empty() {
            return None;
        }
        self.session.current_index
    }

    fn navigate_to(&mut self, index: usize) -> NavigationRequest {
        let tracks = self.session.playlist.clone();
        let track = tracks[index].clone();
        info!(target: "playback", index, title = %track.title, "Navigating");
        self.begin(track, self.session.source, Some(Playlist { tracks, index }))
    }

    /// Deliver the outcome of a [`NavigationRequest`].
    ///
    /// Returns `false` when the request was superseded and ignored.
    pub fn source_resolved(&mut self, generation: u64, result: Result<String, String>) -> bool {
        if generation != self.generation {
            debug!(target: "playback", generation, current = self.generation, "Dropping stale resolution");
            return false;
        }

        match result {
            Ok(url) => {
                let Some(track) = self.session.current_track.clone() else {
                    return false;
                };
                let playlist = self.session.current_index.map(|index| Playlist {
                    tracks: self.session.playlist.clone(),
                    index,
                });
                self.play(track, &url, self.session.source, playlist);
            }
            Err(message) => {
                warn!(target: "playback", error = %message, "No playable source");
                self.media.stop();
                self.session.status = PlaybackStatus::Failed;
                self.session.error = Some(message);
            }
        }
        true
    }

    /// Drain backend events into the session. Returns whether any applied.
    pub fn poll_media(&mut self) -> bool {
        let mut changed = false;
        for event in self.media.poll_events() {
            changed |= self.on_media_event(event);
        }
        changed
    }

    /// Apply one backend event. Events from superseded loads are ignored.
    pub fn on_media_event(&mut self, event: MediaEvent) -> bool {
        if event.load_id() != self.load_id {
            return false;
        }

        match event {
            MediaEvent::Ready { .. } => {
                if self.session.status != PlaybackStatus::Loading {
                    return false;
                }
                self.media.play();
                self.session.status = PlaybackStatus::Playing;
                info!(target: "playback", "Playback started");
            }
            MediaEvent::Position { position, .. } => {
                self.session.position = position;
                self.session.progress = self.session.progress_at(position);
            }
            MediaEvent::Ended { .. } => {
                self.session.status = PlaybackStatus::Ended;
                self.session.progress = 0.0;
                self.session.position = Duration::ZERO;
            }
            MediaEvent::Failed { message, .. } => {
                warn!(target: "playback", error = %message, "Media failed to load");
                self.session.status = PlaybackStatus::Failed;
                self.session.error = Some(message);
            }
        }
        true
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.session.volume = volume.min(100);
        self.apply_gain();
    }

    pub fn toggle_mute(&mut self) {
        self.session.muted = !self.session.muted;
        self.apply_gain();
    }

    /// Stop playback and release the source.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.load_id += 1;
        self.media.stop();
        if self.session.current_track.is_some() {
            self.session.status = PlaybackStatus::Ended;
            self.session.progress = 0.0;
            self.session.position = Duration::ZERO;
        }
    }

    fn apply_gain(&mut self) {
        let gain = self.session.effective_gain();
        self.media.set_gain(gain);
    }
}

/// List available audio output devices.
pub fn list_audio_devices() -> Vec<String> {
    use cpal::traits::{DeviceTrait, HostTrait};
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Player errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlayerError {
    #[error("Audio output initialization failed: {0}")]
    AudioInit(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Failed to fetch audio: {0}")]
    Fetch(String),

    #[error("Audio channel closed")]
    ChannelClosed,

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
}
