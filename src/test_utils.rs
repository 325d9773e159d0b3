//! Test utilities and fixtures for music-courier tests.
//!
//! # Example
//!
//! ```ignore
//! use music_courier::test_utils::{mock_track, mock_album};
//!
//! let track = mock_track(1, "Band", "Song");
//! let album = mock_album(10, "Record", vec![track]);
//! ```

use crate::model::{Album, AlbumDetail, AlbumRef, ArtistRef, Track};

/// Creates a catalog track with sensible defaults.
///
/// Use struct update syntax to customize further:
///
/// ```ignore
/// let track = Track { duration: 300, ..mock_track(1, "Band", "Song") };
/// ```
pub fn mock_track(id: u64, artist: &str, title: &str) -> Track {
    let artist = ArtistRef {
        id: 100 + id,
        name: artist.to_string(),
        kind: "MAIN".to_string(),
        picture: None,
    };
    Track {
        id,
        title: title.to_string(),
        duration: 200,
        artists: vec![artist.clone()],
        artist,
        album: AlbumRef {
            id: 1000,
            title: "Record".to_string(),
            cover: "aa-bb-cc".to_string(),
            vibrant_color: None,
        },
        audio_quality: "LOSSLESS".to_string(),
        ..Default::default()
    }
}

/// Creates an album detail holding `tracks`.
pub fn mock_album(id: u64, title: &str, tracks: Vec<Track>) -> AlbumDetail {
    AlbumDetail {
        album: Album {
            id,
            title: title.to_string(),
            number_of_tracks: tracks.len() as u32,
            ..Default::default()
        },
        tracks,
    }
}
