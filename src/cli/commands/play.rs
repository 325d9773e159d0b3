//! Interactive streaming playback.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::app::{App, Message};
use crate::config::Config;
use crate::player::{MediaEngine, NullEngine, PlaybackStatus, StreamingEngine};

use super::{await_reply, build_app};

/// How often backend events are drained into the session
const TICK: Duration = Duration::from_millis(250);

const HELP: &str = "Commands: [p]ause/resume, [n]ext, [b]ack, seek <secs>, vol <0-100>, \
                    [m]ute, <number> album track, stop, [q]uit";

/// Stream the first match for `query` and read controls from stdin
pub fn cmd_play(
    rt: &Runtime,
    mut config: Config,
    query: &str,
    album: bool,
    device: Option<&str>,
) -> anyhow::Result<()> {
    if let Some(device) = device {
        config.playback.output_device = device.to_string();
    }

    rt.block_on(async {
        let media: Box<dyn MediaEngine> = match StreamingEngine::new(&config.playback.output_device) {
            Ok(engine) => Box::new(engine),
            Err(e) => {
                warn!(target: "playback", error = %e, "No audio output, playback disabled");
                Box::new(NullEngine::default())
            }
        };
        let (mut app, mut inbox) = build_app(config, media)?;

        if album {
            app.update(Message::SearchAlbums(query.to_string()));
            await_reply(&mut app, &mut inbox, |m| matches!(m, Message::AlbumsLoaded(_))).await;
            let album_id = app
                .albums()
                .first()
                .map(|a| a.id)
                .ok_or_else(|| anyhow::anyhow!("No matching album for '{}'", query))?;

            app.update(Message::LoadAlbum(album_id));
            await_reply(&mut app, &mut inbox, |m| matches!(m, Message::AlbumLoaded(_))).await;
            let Some(detail) = app.album() else {
                anyhow::bail!("{}", app.status());
            };
            for (i, track) in detail.tracks.iter().enumerate() {
                println!("{:>3}. {}", i + 1, track.display_name());
            }
            app.update(Message::PlayAlbumTrack(0));
        } else {
            app.update(Message::SearchTracks(query.to_string()));
            await_reply(&mut app, &mut inbox, |m| matches!(m, Message::TracksLoaded(_))).await;
            let track_id = app
                .tracks()
                .first()
                .map(|t| t.id)
                .ok_or_else(|| anyhow::anyhow!("No matching track for '{}'", query))?;
            app.update(Message::PlayTrack(track_id));
        }

        println!("{}", HELP);
        let input = spawn_input(app.sender());
        let ticker = spawn_ticker(app.sender());

        let mut last = (PlaybackStatus::Idle, None);
        app.run(&mut inbox, |app, msg| {
            if matches!(msg, Message::Quit) {
                return ControlFlow::Break(());
            }
            let session = app.session();
            let now = (session.status, session.current_track.as_ref().map(|t| t.id));
            if now != last || matches!(msg, Message::NavigationResolved { result: Err(_), .. }) {
                print_status(app);
                last = now;
            }
            ControlFlow::Continue(())
        })
        .await;

        input.abort();
        ticker.abort();
        Ok(())
    })
}

fn print_status(app: &App) {
    let session = app.session();
    let title = session
        .current_track
        .as_ref()
        .map(|t| t.display_name())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "[{}] {} {}/{}",
        session.status.label(),
        title,
        session.position_str(),
        session.duration_str()
    );
    if let Some(index) = session.current_index {
        line.push_str(&format!(" (track {}/{})", index + 1, session.playlist.len()));
    }
    if let Some(error) = &session.error {
        line.push_str(&format!(" - {}", error));
    }
    println!("{}", line);
}

/// Forward stdin commands into the loop.
fn spawn_input(tx: UnboundedSender<Message>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_command(&line) {
                Some(msg) => {
                    if tx.send(msg).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => println!("{}", HELP),
            }
        }
        // stdin closed
        let _ = tx.send(Message::Quit);
    })
}

fn spawn_ticker(tx: UnboundedSender<Message>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        loop {
            interval.tick().await;
            if tx.send(Message::PlayerTick).is_err() {
                break;
            }
        }
    })
}

/// Map one line of user input to a message.
fn parse_command(line: &str) -> Option<Message> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?.to_ascii_lowercase();
    let argument = parts.next();

    let msg = match command.as_str() {
        "p" | "pause" | "resume" | "toggle" => Message::PlayerToggle,
        "n" | "next" => Message::PlayerNext,
        "b" | "back" | "prev" | "previous" => Message::PlayerPrevious,
        "seek" => Message::PlayerSeek(argument?.parse().ok()?),
        "v" | "vol" | "volume" => Message::PlayerVolume(argument?.parse().ok()?),
        "m" | "mute" => Message::PlayerToggleMute,
        "stop" => Message::PlayerStop,
        "q" | "quit" | "exit" => Message::Quit,
        number => {
            let n: usize = number.parse().ok()?;
            Message::PlayAlbumTrack(n.checked_sub(1)?)
        }
    };
    Some(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport_commands() {
        assert!(matches!(parse_command("p"), Some(Message::PlayerToggle)));
        assert!(matches!(parse_command("  NEXT "), Some(Message::PlayerNext)));
        assert!(matches!(parse_command("b"), Some(Message::PlayerPrevious)));
        assert!(matches!(parse_command("mute"), Some(Message::PlayerToggleMute)));
        assert!(matches!(parse_command("q"), Some(Message::Quit)));
    }

    #[test]
    fn test_parse_commands_with_arguments() {
        assert!(matches!(parse_command("seek 42.5"), Some(Message::PlayerSeek(s)) if s == 42.5));
        assert!(matches!(parse_command("vol 30"), Some(Message::PlayerVolume(30))));
        assert!(parse_command("vol loud").is_none());
        assert!(parse_command("seek").is_none());
    }

    #[test]
    fn test_parse_album_track_number() {
        assert!(matches!(parse_command("3"), Some(Message::PlayAlbumTrack(2))));
        assert!(parse_command("0").is_none());
        assert!(parse_command("").is_none());
        assert!(parse_command("dance").is_none());
    }
}
