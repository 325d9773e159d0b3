//! Track and album download commands.

use std::io::Write;
use std::ops::ControlFlow;

use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::app::{App, Inbox, Message};
use crate::config::Config;
use crate::download::{AudioFormat, is_ffmpeg_available};
use crate::player::NullEngine;
use crate::queue::format_eta;

use super::{await_reply, build_app, print_ffmpeg_install_instructions};

/// Download one track found by `query`
pub fn cmd_download(
    rt: &Runtime,
    config: Config,
    query: &str,
    id: Option<u64>,
) -> anyhow::Result<()> {
    check_encoder(&config)?;

    rt.block_on(async {
        let (mut app, mut inbox) = build_app(config, Box::new(NullEngine::default()))?;

        app.update(Message::SearchTracks(query.to_string()));
        await_reply(&mut app, &mut inbox, |m| matches!(m, Message::TracksLoaded(_))).await;

        let track = app
            .tracks()
            .iter()
            .find(|t| id.is_none_or(|id| t.id == id))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No matching track for '{}'", query))?;

        println!("Downloading {}", track.display_name());
        app.update(Message::DownloadTrack(track.id));
        let interrupted = drive_downloads(&mut app, &mut inbox).await;
        print_summary(&app, interrupted)
    })
}

/// Download every track of the album found by `query`
pub fn cmd_album(
    rt: &Runtime,
    config: Config,
    query: &str,
    id: Option<u64>,
) -> anyhow::Result<()> {
    check_encoder(&config)?;

    rt.block_on(async {
        let (mut app, mut inbox) = build_app(config, Box::new(NullEngine::default()))?;

        let album_id = match id {
            Some(id) => id,
            None => {
                app.update(Message::SearchAlbums(query.to_string()));
                await_reply(&mut app, &mut inbox, |m| matches!(m, Message::AlbumsLoaded(_))).await;
                app.albums()
                    .first()
                    .map(|a| a.id)
                    .ok_or_else(|| anyhow::anyhow!("No matching album for '{}'", query))?
            }
        };

        app.update(Message::LoadAlbum(album_id));
        await_reply(&mut app, &mut inbox, |m| matches!(m, Message::AlbumLoaded(_))).await;
        let Some(album) = app.album() else {
            anyhow::bail!("{}", app.status());
        };
        println!("Downloading {} ({} tracks)", album.album.title, album.tracks.len());

        app.update(Message::DownloadAlbum);
        let interrupted = drive_downloads(&mut app, &mut inbox).await;
        print_summary(&app, interrupted)
    })
}

/// MP3 output needs the encoder; fail before any transfer starts.
fn check_encoder(config: &Config) -> anyhow::Result<()> {
    if config.download.preferred_format == AudioFormat::Mp3
        && !is_ffmpeg_available(config.encoder.ffmpeg_path.as_deref())
    {
        print_ffmpeg_install_instructions();
        anyhow::bail!("ffmpeg is required for mp3 output");
    }
    Ok(())
}

/// Run the loop until every download has settled. Ctrl-C cancels them all;
/// the loop still waits for the cancelled jobs to clean up after themselves.
///
/// Returns whether the run was interrupted.
async fn drive_downloads(app: &mut App, inbox: &mut Inbox) -> bool {
    let tx = app.sender();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling downloads");
            let _ = tx.send(Message::ClearAll);
        }
    });

    let mut interrupted = false;
    if !app.downloads_idle() {
        app.run(inbox, |app, msg| {
            interrupted |= matches!(msg, Message::ClearAll);
            render(app, msg);
            if app.downloads_idle() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await;
    }
    interrupt.abort();
    println!();
    interrupted
}

fn render(app: &App, msg: &Message) {
    match msg {
        Message::Progress(event) => {
            let Some(job) = app.queue().active_by_key(&event.key) else {
                return;
            };
            let eta = app
                .queue()
                .eta(job.id)
                .map(|d| format!(" ETA {}", format_eta(d)))
                .unwrap_or_default();
            print!(
                "\r{} {:>3}% {}{}    ",
                job.filename,
                job.progress,
                job.status.label(),
                eta
            );
            let _ = std::io::stdout().flush();
        }
        Message::DownloadFinished { job_id, .. } => {
            if let Some(job) = app.queue().get(*job_id) {
                match &job.error {
                    Some(error) => println!("\r{} failed: {}", job.filename, error),
                    None => println!("\r{} {}", job.filename, job.status.label()),
                }
            }
        }
        _ => {}
    }
}

fn print_summary(app: &App, interrupted: bool) -> anyhow::Result<()> {
    let queue = app.queue();
    let completed = queue.completed().count();
    let failed = queue.failed().count();
    let cancelled = queue.cancelled().count();
    info!(completed, failed, cancelled, "Downloads settled");

    for job in queue.completed() {
        if let Some(path) = &job.final_path {
            println!("Saved: {}", path.display());
        }
    }
    println!(
        "{} completed, {} failed, {} cancelled",
        completed, failed, cancelled
    );

    if interrupted {
        anyhow::bail!("Interrupted, unfinished downloads were cancelled");
    }
    if failed > 0 {
        anyhow::bail!("{} download(s) failed", failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::catalog::mocks::MockCatalog;
    use crate::download::convert::mocks::MockEncoder;
    use crate::download::fetch::mocks::MockFetcher;
    use crate::test_utils::mock_track;

    #[tokio::test]
    async fn test_interrupt_waits_for_cleanup_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.download.directory = dir.path().to_path_buf();
        config.download.preferred_format = AudioFormat::Flac;

        let (mut app, mut inbox) = App::new(
            config,
            Arc::new(MockCatalog::new().with_source(1, "https://cdn.example/1.flac")),
            Arc::new(
                MockFetcher::with_chunks(vec![vec![0; 10]])
                    .content_length(Some(100))
                    .hang_after_chunks(),
            ),
            Arc::new(MockEncoder::succeeding()),
            Box::new(NullEngine::default()),
        );
        app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
        app.update(Message::DownloadTrack(1));

        // First chunk is on disk once progress shows up.
        while !matches!(inbox.recv().await, Some(Message::Progress(_))) {}
        assert!(dir.path().join("Band - Song.flac").exists());

        app.sender().send(Message::ClearAll).unwrap();
        let interrupted = tokio::time::timeout(
            Duration::from_secs(5),
            drive_downloads(&mut app, &mut inbox),
        )
        .await
        .unwrap();

        assert!(interrupted);
        assert!(app.downloads_idle());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(print_summary(&app, interrupted).is_err());
    }
}
