use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::catalog::mocks::MockCatalog;
use crate::download::AudioFormat;
use crate::download::convert::mocks::MockEncoder;
use crate::download::fetch::mocks::MockFetcher;
use crate::player::mocks::{MediaLog, MockMedia};
use crate::player::{MediaEvent, PlaybackStatus};
use crate::queue::JobStatus;
use crate::test_utils::{mock_album, mock_track};

fn app_with(catalog: MockCatalog, fetcher: MockFetcher, dir: &Path) -> (App, Inbox, MediaLog) {
    let mut config = Config::default();
    config.download.directory = dir.to_path_buf();
    config.download.preferred_format = AudioFormat::Flac;
    config.download.album_delay_ms = 1;

    let (media, log) = MockMedia::new();
    let (app, inbox) = App::new(
        config,
        Arc::new(catalog),
        Arc::new(fetcher),
        Arc::new(MockEncoder::succeeding()),
        Box::new(media),
    );
    (app, inbox, log)
}

fn audio() -> MockFetcher {
    MockFetcher::with_chunks(vec![b"fLaC".to_vec(), vec![0u8; 64]])
}

/// Run the loop until `done` holds after a message.
async fn run_until(app: &mut App, inbox: &mut Inbox, mut done: impl FnMut(&App, &Message) -> bool) {
    let run = app.run(inbox, |app, msg| {
        if done(app, msg) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("update loop did not reach the expected state");
}

fn is_finished(msg: &Message) -> bool {
    matches!(msg, Message::DownloadFinished { .. })
}

#[tokio::test]
async fn test_search_loads_results() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = MockCatalog::new()
        .with_track(mock_track(1, "Band", "Song"))
        .with_track(mock_track(2, "Other", "Tune"));
    let (mut app, mut inbox, _log) = app_with(catalog, audio(), dir.path());

    app.update(Message::SearchTracks("band".to_string()));
    run_until(&mut app, &mut inbox, |_, msg| matches!(msg, Message::TracksLoaded(_))).await;

    assert_eq!(app.tracks().len(), 1);
    assert_eq!(app.tracks()[0].id, 1);
}

#[tokio::test]
async fn test_download_track_completes() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = MockCatalog::new().with_source(1, "https://cdn.example/1.flac");
    let (mut app, mut inbox, _log) = app_with(catalog, audio(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::DownloadTrack(1));
    assert_eq!(app.queue().active().count(), 1);

    run_until(&mut app, &mut inbox, |_, msg| is_finished(msg)).await;

    let job = &app.queue().jobs()[0];
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.filename, "Band - Song.flac");
    assert!(dir.path().join("Band - Song.flac").exists());
    assert!(app.downloads_idle());
}

#[tokio::test]
async fn test_duplicate_download_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = MockCatalog::new().with_source(1, "https://cdn.example/1.flac");
    let (mut app, _inbox, _log) = app_with(catalog, audio().hang_after_chunks(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::DownloadTrack(1));
    app.update(Message::DownloadTrack(1));

    assert_eq!(app.queue().len(), 1);
    assert!(app.status().contains("already downloading"));
}

#[tokio::test]
async fn test_unresolvable_track_fails_job() {
    let dir = tempfile::tempdir().unwrap();
    let (mut app, mut inbox, _log) = app_with(MockCatalog::new(), audio(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::DownloadTrack(1));
    run_until(&mut app, &mut inbox, |_, msg| is_finished(msg)).await;

    let job = &app.queue().jobs()[0];
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.as_deref().unwrap().contains("Could not resolve source"));
}

#[tokio::test]
async fn test_retry_restarts_same_job() {
    let dir = tempfile::tempdir().unwrap();
    let (mut app, mut inbox, _log) = app_with(MockCatalog::new(), audio(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::DownloadTrack(1));
    run_until(&mut app, &mut inbox, |_, msg| is_finished(msg)).await;
    let id = app.queue().jobs()[0].id;

    app.update(Message::RetryJob(id));
    assert_eq!(app.queue().len(), 1);
    assert_eq!(app.queue().get(id).unwrap().status, JobStatus::Downloading);

    run_until(&mut app, &mut inbox, |_, msg| is_finished(msg)).await;
    assert_eq!(app.queue().get(id).unwrap().status, JobStatus::Error);
}

#[tokio::test]
async fn test_retry_without_loaded_track_reports_source_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (mut app, mut inbox, _log) = app_with(MockCatalog::new(), audio(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::DownloadTrack(1));
    run_until(&mut app, &mut inbox, |_, msg| is_finished(msg)).await;
    let id = app.queue().jobs()[0].id;

    app.update(Message::TracksLoaded(Ok(Vec::new())));
    app.update(Message::RetryJob(id));

    let job = app.queue().get(id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error.as_deref(), Some("source not found"));
}

#[tokio::test]
async fn test_cancel_stops_transfer_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = MockCatalog::new().with_source(1, "https://cdn.example/1.flac");
    let (mut app, mut inbox, _log) = app_with(catalog, audio().hang_after_chunks(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::DownloadTrack(1));
    run_until(&mut app, &mut inbox, |_, msg| matches!(msg, Message::Progress(_))).await;
    let id = app.queue().jobs()[0].id;

    app.update(Message::CancelJob(id));
    assert_eq!(app.queue().get(id).unwrap().status, JobStatus::Cancelled);

    run_until(&mut app, &mut inbox, |_, msg| is_finished(msg)).await;
    assert_eq!(app.queue().get(id).unwrap().status, JobStatus::Cancelled);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_album_downloads_run_one_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let album = mock_album(
        10,
        "Live: Tour?",
        vec![mock_track(1, "Band", "One"), mock_track(2, "Band", "Two")],
    );
    let catalog = MockCatalog::new()
        .with_source(1, "https://cdn.example/1.flac")
        .with_source(2, "https://cdn.example/2.flac");
    let (mut app, mut inbox, _log) = app_with(catalog, audio(), dir.path());

    app.update(Message::AlbumLoaded(Ok(album)));
    app.update(Message::DownloadAlbum);
    assert_eq!(app.queue().len(), 1);
    assert!(!app.downloads_idle());

    run_until(&mut app, &mut inbox, |app, _| {
        app.downloads_idle() && app.queue().len() == 2
    })
    .await;

    assert_eq!(app.queue().completed().count(), 2);
    let folder = dir.path().join("albums").join("Live- Tour-");
    assert!(folder.join("Band - One.flac").exists());
    assert!(folder.join("Band - Two.flac").exists());
}

#[tokio::test]
async fn test_clear_all_drops_pending_album_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let album = mock_album(
        10,
        "Record",
        vec![mock_track(1, "Band", "One"), mock_track(2, "Band", "Two")],
    );
    let catalog = MockCatalog::new().with_source(1, "https://cdn.example/1.flac");
    let (mut app, mut inbox, _log) = app_with(catalog, audio().hang_after_chunks(), dir.path());

    app.update(Message::AlbumLoaded(Ok(album)));
    app.update(Message::DownloadAlbum);
    app.update(Message::ClearAll);

    assert!(app.queue().is_empty());
    // The aborted first track still has to report back.
    assert!(!app.downloads_idle());

    run_until(&mut app, &mut inbox, |app, _| app.downloads_idle()).await;
    assert!(app.queue().is_empty());
    assert!(!dir.path().join("albums").join("Record").join("Band - One.flac").exists());
}

#[tokio::test]
async fn test_cancel_while_resolving_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = MockCatalog::new().with_source(1, "https://cdn.example/1.flac");
    let (mut app, mut inbox, _log) = app_with(catalog, audio(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::DownloadTrack(1));
    let id = app.queue().jobs()[0].id;
    app.update(Message::CancelJob(id));
    assert_eq!(app.queue().get(id).unwrap().status, JobStatus::Cancelled);

    run_until(&mut app, &mut inbox, |_, msg| is_finished(msg)).await;

    assert_eq!(app.queue().get(id).unwrap().status, JobStatus::Cancelled);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert!(app.downloads_idle());
}

#[tokio::test]
async fn test_retry_after_cancel_downloads_once() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = MockCatalog::new().with_source(1, "https://cdn.example/1.flac");
    let (mut app, mut inbox, _log) = app_with(catalog, audio(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::DownloadTrack(1));
    let id = app.queue().jobs()[0].id;
    app.update(Message::CancelJob(id));
    app.update(Message::RetryJob(id));
    assert_eq!(app.queue().get(id).unwrap().attempt, 2);

    run_until(&mut app, &mut inbox, |app, _| app.downloads_idle()).await;

    let job = app.queue().get(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.filename, "Band - Song.flac");
    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(files, vec![std::ffi::OsString::from("Band - Song.flac")]);
}

#[tokio::test]
async fn test_result_of_superseded_attempt_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = MockCatalog::new().with_source(1, "https://cdn.example/1.flac");
    let (mut app, _inbox, _log) = app_with(catalog, audio().hang_after_chunks(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::DownloadTrack(1));
    let id = app.queue().jobs()[0].id;
    app.update(Message::CancelJob(id));
    app.update(Message::RetryJob(id));

    app.update(Message::DownloadFinished {
        job_id: id,
        attempt: 1,
        result: Ok(crate::download::DownloadOutcome {
            path: dir.path().join("Band - Song.flac"),
            filename: "Band - Song.flac".to_string(),
        }),
    });

    let job = app.queue().get(id).unwrap();
    assert_eq!(job.status, JobStatus::Downloading);
    assert_eq!(job.final_path, None);
}

#[tokio::test]
async fn test_cancel_completed_job_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = MockCatalog::new().with_source(1, "https://cdn.example/1.flac");
    let (mut app, mut inbox, _log) = app_with(catalog, audio(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::DownloadTrack(1));
    run_until(&mut app, &mut inbox, |_, msg| is_finished(msg)).await;
    let id = app.queue().jobs()[0].id;

    app.update(Message::CancelJob(id));

    let job = app.queue().get(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.filename, "Band - Song.flac");
    assert_eq!(job.final_path, Some(dir.path().join("Band - Song.flac")));
    assert!(dir.path().join("Band - Song.flac").exists());
}

#[tokio::test]
async fn test_play_resolves_then_plays_on_ready() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = MockCatalog::new().with_source(1, "https://cdn.example/1.flac");
    let (mut app, mut inbox, log) = app_with(catalog, audio(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::PlayTrack(1));
    assert_eq!(app.session().status, PlaybackStatus::Loading);

    run_until(&mut app, &mut inbox, |_, msg| {
        matches!(msg, Message::NavigationResolved { .. })
    })
    .await;

    let loads = log.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].1, "https://cdn.example/1.flac");

    log.emit(MediaEvent::Ready {
        load_id: loads[0].0,
        duration: Some(Duration::from_secs(200)),
    });
    app.update(Message::PlayerTick);
    assert_eq!(app.session().status, PlaybackStatus::Playing);

    app.update(Message::PlayerToggle);
    assert_eq!(app.session().status, PlaybackStatus::Paused);
}

#[tokio::test]
async fn test_album_navigation_loads_next_track() {
    let dir = tempfile::tempdir().unwrap();
    let album = mock_album(
        10,
        "Record",
        vec![mock_track(1, "Band", "One"), mock_track(2, "Band", "Two")],
    );
    let catalog = MockCatalog::new()
        .with_source(1, "https://cdn.example/1.flac")
        .with_source(2, "https://cdn.example/2.flac");
    let (mut app, mut inbox, log) = app_with(catalog, audio(), dir.path());

    app.update(Message::AlbumLoaded(Ok(album)));
    app.update(Message::PlayAlbumTrack(0));
    run_until(&mut app, &mut inbox, |_, msg| {
        matches!(msg, Message::NavigationResolved { .. })
    })
    .await;

    app.update(Message::PlayerNext);
    assert_eq!(app.session().current_index, Some(1));
    run_until(&mut app, &mut inbox, |_, msg| {
        matches!(msg, Message::NavigationResolved { .. })
    })
    .await;

    assert_eq!(
        log.loads().last().map(|(_, url)| url.as_str()),
        Some("https://cdn.example/2.flac")
    );

    // Already at the last track.
    app.update(Message::PlayerNext);
    assert_eq!(app.session().current_index, Some(1));
}

#[tokio::test]
async fn test_unplayable_track_fails_session() {
    let dir = tempfile::tempdir().unwrap();
    let (mut app, mut inbox, log) = app_with(MockCatalog::new(), audio(), dir.path());

    app.update(Message::TracksLoaded(Ok(vec![mock_track(1, "Band", "Song")])));
    app.update(Message::PlayTrack(1));
    run_until(&mut app, &mut inbox, |_, msg| {
        matches!(msg, Message::NavigationResolved { .. })
    })
    .await;

    assert_eq!(app.session().status, PlaybackStatus::Failed);
    assert!(log.loads().is_empty());
    assert!(app.status().starts_with("Playback failed"));
}

#[tokio::test]
async fn test_quit_ends_run() {
    let dir = tempfile::tempdir().unwrap();
    let (mut app, mut inbox, _log) = app_with(MockCatalog::new(), audio(), dir.path());

    app.sender().send(Message::Quit).unwrap();
    run_until(&mut app, &mut inbox, |_, _| false).await;
    assert!(app.should_quit());
}
