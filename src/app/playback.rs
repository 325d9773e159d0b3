//! Playback handlers.
//!
//! Selecting a track updates the session right away; its source is then
//! resolved in the background and delivered as `NavigationResolved`.

use std::sync::Arc;

use tracing::info;

use crate::catalog::resolve_with_fallback;
use crate::player::{NavigationRequest, PlaySource, Playlist};

use super::{App, Message};

pub(super) fn handle_playback(app: &mut App, msg: Message) {
    match msg {
        Message::PlayTrack(track_id) => {
            let Some(track) = app.find_loaded(track_id) else {
                app.status = format!("Track {} is not in the loaded results", track_id);
                return;
            };
            info!(target: "playback", track = %track.display_name(), "Play requested");
            let request = app.player.begin(track, PlaySource::TrackDetail, None);
            resolve(app, request);
        }

        Message::PlayAlbumTrack(index) => {
            let Some(album) = app.album.as_ref() else {
                app.status = "No album loaded".to_string();
                return;
            };
            let Some(track) = album.tracks.get(index).cloned() else {
                app.status = format!("Album has no track {}", index + 1);
                return;
            };
            let playlist = Playlist {
                tracks: album.tracks.clone(),
                index,
            };
            let request = app
                .player
                .begin(track, PlaySource::AlbumDetail, Some(playlist));
            resolve(app, request);
        }

        Message::NavigationResolved { generation, result } => {
            if let Err(e) = &result {
                app.status = format!("Playback failed: {}", e);
            }
            app.player.source_resolved(generation, result);
        }

        Message::PlayerToggle => app.player.toggle(),

        Message::PlayerNext => {
            if let Some(request) = app.player.next() {
                resolve(app, request);
            }
        }

        Message::PlayerPrevious => {
            if let Some(request) = app.player.previous() {
                resolve(app, request);
            }
        }

        Message::PlayerSeek(seconds) => app.player.seek(seconds),
        Message::PlayerVolume(volume) => app.player.set_volume(volume),
        Message::PlayerToggleMute => app.player.toggle_mute(),
        Message::PlayerStop => app.player.stop(),

        Message::PlayerTick => {
            app.player.poll_media();
        }

        _ => {}
    }
}

/// Resolve a navigation request's source off-loop.
fn resolve(app: &App, request: NavigationRequest) {
    let catalog = Arc::clone(&app.catalog);
    app.spawn(async move {
        let result = resolve_with_fallback(catalog.as_ref(), request.track_id, request.quality)
            .await
            .map(|source| source.url)
            .map_err(|e| e.to_string());
        Message::NavigationResolved {
            generation: request.generation,
            result,
        }
    });
}
