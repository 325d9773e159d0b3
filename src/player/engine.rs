//! Media backend seam.
//!
//! The playback state machine drives a [`MediaEngine`] and consumes the
//! [`MediaEvent`]s it reports. Every load carries a [`LoadId`]; events from
//! an older load are stale and get ignored.

use std::time::Duration;

/// Identifies one `load` call.
pub type LoadId = u64;

/// Something the media backend observed.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Enough data is buffered to start playing
    Ready {
        load_id: LoadId,
        duration: Option<Duration>,
    },
    Position { load_id: LoadId, position: Duration },
    Ended { load_id: LoadId },
    Failed { load_id: LoadId, message: String },
}

impl MediaEvent {
    pub fn load_id(&self) -> LoadId {
        match self {
            MediaEvent::Ready { load_id, .. }
            | MediaEvent::Position { load_id, .. }
            | MediaEvent::Ended { load_id }
            | MediaEvent::Failed { load_id, .. } => *load_id,
        }
    }
}

/// One playable output.
pub trait MediaEngine {
    /// Start buffering `url`. Replaces whatever was loaded.
    fn load(&mut self, load_id: LoadId, url: &str);
    fn play(&mut self);
    fn pause(&mut self);
    /// Stop and drop the current source.
    fn stop(&mut self);
    fn seek(&mut self, position: Duration);
    /// 0.0 - 1.0
    fn set_gain(&mut self, gain: f32);
    /// Events since the last poll.
    fn poll_events(&mut self) -> Vec<MediaEvent>;
}

/// Backend that never produces sound, for when no output device exists.
#[derive(Debug, Default)]
pub struct NullEngine {
    events: Vec<MediaEvent>,
}

impl MediaEngine for NullEngine {
    fn load(&mut self, load_id: LoadId, _url: &str) {
        self.events.push(MediaEvent::Failed {
            load_id,
            message: "no audio output device".to_string(),
        });
    }
    fn play(&mut self) {}
    fn pause(&mut self) {}
    fn stop(&mut self) {}
    fn seek(&mut self, _position: Duration) {}
    fn set_gain(&mut self, _gain: f32) {}
    fn poll_events(&mut self) -> Vec<MediaEvent> {
        std::mem::take(&mut self.events)
    }
}
