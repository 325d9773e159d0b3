//! Catalog search command.

use tokio::runtime::Runtime;

use crate::app::Message;
use crate::config::Config;
use crate::player::{NullEngine, format_duration};

use super::{await_reply, build_app};

/// Search tracks or albums and print the hits with their ids
pub fn cmd_search(rt: &Runtime, config: Config, query: &str, albums: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let (mut app, mut inbox) = build_app(config, Box::new(NullEngine::default()))?;

        if albums {
            app.update(Message::SearchAlbums(query.to_string()));
            await_reply(&mut app, &mut inbox, |m| matches!(m, Message::AlbumsLoaded(_))).await;

            if app.albums().is_empty() {
                println!("{}", app.status());
                return Ok(());
            }
            for album in app.albums() {
                let artist = album
                    .artists
                    .first()
                    .map(|a| a.name.as_str())
                    .unwrap_or("Unknown Artist");
                println!(
                    "{:>10}  {} - {} ({} tracks, {})",
                    album.id, artist, album.title, album.number_of_tracks, album.audio_quality
                );
            }
        } else {
            app.update(Message::SearchTracks(query.to_string()));
            await_reply(&mut app, &mut inbox, |m| matches!(m, Message::TracksLoaded(_))).await;

            if app.tracks().is_empty() {
                println!("{}", app.status());
                return Ok(());
            }
            for track in app.tracks() {
                println!(
                    "{:>10}  {}  [{}] {}",
                    track.id,
                    track.display_name(),
                    format_duration(std::time::Duration::from_secs(u64::from(track.duration))),
                    track.best_quality()
                );
            }
        }
        Ok(())
    })
}
