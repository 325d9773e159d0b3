//! Playback session state.

use std::time::Duration;

use crate::model::Track;

/// Current playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    /// A track is selected but its source is not playing yet
    Loading,
    Playing,
    Paused,
    /// Media played to the end; the track stays selected
    Ended,
    /// Source resolution or loading failed
    Failed,
}

impl PlaybackStatus {
    pub fn label(self) -> &'static str {
        match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Ended => "ended",
            PlaybackStatus::Failed => "failed",
        }
    }
}

/// Where playback was started from. Only playlist-bearing sources allow
/// next/previous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaySource {
    TrackDetail,
    AlbumDetail,
    #[default]
    Other,
}

impl PlaySource {
    pub fn has_playlist(self) -> bool {
        matches!(self, PlaySource::AlbumDetail | PlaySource::Other)
    }
}

/// Ordered tracks plus the index of the one playing.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub tracks: Vec<Track>,
    pub index: usize,
}

/// Everything the user sees about playback.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub current_track: Option<Track>,
    pub playlist: Vec<Track>,
    /// Always within `playlist` bounds when set
    pub current_index: Option<usize>,
    pub status: PlaybackStatus,
    pub source: PlaySource,
    /// 0.0 - 100.0
    pub progress: f32,
    pub position: Duration,
    /// 0 - 100
    pub volume: u8,
    pub muted: bool,
    pub error: Option<String>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            current_track: None,
            playlist: Vec::new(),
            current_index: None,
            status: PlaybackStatus::Idle,
            source: PlaySource::Other,
            progress: 0.0,
            position: Duration::ZERO,
            volume: 50,
            muted: false,
            error: None,
        }
    }
}

impl PlaybackSession {
    /// Output gain (0.0 - 1.0) after mute.
    pub fn effective_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            f32::from(self.volume) / 100.0
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    pub fn is_loading(&self) -> bool {
        self.status == PlaybackStatus::Loading
    }

    /// Progress for `position` into the current track.
    pub(crate) fn progress_at(&self, position: Duration) -> f32 {
        match &self.current_track {
            Some(track) if track.duration > 0 => {
                ((position.as_secs_f32() / track.duration as f32) * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        }
    }

    /// Format position as M:SS.
    pub fn position_str(&self) -> String {
        format_duration(self.position)
    }

    /// Format the current track's length as M:SS.
    pub fn duration_str(&self) -> String {
        let secs = self.current_track.as_ref().map_or(0, |t| t.duration);
        format_duration(Duration::from_secs(u64::from(secs)))
    }
}

/// Format a duration as MM:SS or HH:MM:SS.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}
