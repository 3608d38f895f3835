mod support;

use std::path::PathBuf;
use std::sync::Arc;

use column_press::imaging;
use column_press::models::AudioTrackRecord;
use column_press::tagging::{inspect_state, AudioTagger, TagState, TagWriteError};
use column_press::CoverCache;
use id3::{Tag, TagLike};
use tempfile::TempDir;

use crate::support::{fake_mp3, png, tracing_init, MockCoverFetcher};

const COVER_URL: &str = "https://img.example.com/audio-cover.jpg";

fn record(file_path: PathBuf, track_number: u32) -> AudioTrackRecord {
    AudioTrackRecord {
        file_path,
        title: format!("Lecture {}", track_number),
        album: "History - Ten Lectures".to_string(),
        artist: "Author".to_string(),
        track_number,
        recording_date: "2021-09".to_string(),
        cover_url: COVER_URL.to_string(),
    }
}

fn jpeg_cover() -> Vec<u8> {
    imaging::encode_jpeg(&png(64, 64)).unwrap().data
}

#[tokio::test]
async fn test_batch_shares_one_cover_download() {
    tracing_init();
    let dir = TempDir::new().unwrap();
    let cover = jpeg_cover();
    let fetcher = Arc::new(MockCoverFetcher::new().with_cover(COVER_URL, cover.clone()));
    let cache = CoverCache::new(fetcher.clone());

    let tracks: Vec<AudioTrackRecord> = (1..=10)
        .map(|n| record(fake_mp3(dir.path(), &format!("{:02}.mp3", n)), n))
        .collect();

    let outcomes = AudioTagger::new(4).tag_all(&tracks, &cache).await;

    assert_eq!(fetcher.calls(), 1);
    for (n, (outcome, track)) in outcomes.iter().zip(&tracks).enumerate() {
        assert_eq!(outcome.file_path, track.file_path);
        assert!(matches!(outcome.result, Ok(TagState::Saved)));

        let tag = Tag::read_from_path(&track.file_path).unwrap();
        assert_eq!(tag.track(), Some(n as u32 + 1));
        let picture = tag.pictures().next().unwrap();
        // JPEG covers are embedded as fetched
        assert_eq!(picture.data, cover);
    }
}

#[tokio::test]
async fn test_failed_cover_then_retry() {
    tracing_init();
    let dir = TempDir::new().unwrap();
    let path = fake_mp3(dir.path(), "01.mp3");
    let fetcher = Arc::new(MockCoverFetcher::new().with_cover(COVER_URL, jpeg_cover()));
    let tagger = AudioTagger::default();

    fetcher.fail_all(true);
    let cache = CoverCache::new(fetcher.clone());
    let result = tagger.tag(&record(path.clone(), 1), &cache).await;
    assert!(matches!(result, Err(TagWriteError::CoverFetch { .. })));
    assert_eq!(inspect_state(&path).unwrap(), TagState::HasBaseTag);

    fetcher.fail_all(false);
    let state = tagger.tag(&record(path.clone(), 1), &cache).await.unwrap();
    assert_eq!(state, TagState::Saved);
    assert_eq!(inspect_state(&path).unwrap(), TagState::Saved);

    let tag = Tag::read_from_path(&path).unwrap();
    assert_eq!(tag.title(), Some("Lecture 1"));
    assert_eq!(tag.pictures().count(), 1);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_missing_audio_file() {
    tracing_init();
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(MockCoverFetcher::new().with_cover(COVER_URL, jpeg_cover()));
    let cache = CoverCache::new(fetcher.clone());

    let result = AudioTagger::default()
        .tag(&record(dir.path().join("gone.mp3"), 1), &cache)
        .await;

    assert!(matches!(result, Err(TagWriteError::MissingFile(_))));
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn test_invalid_record_fails_alone() {
    tracing_init();
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(MockCoverFetcher::new().with_cover(COVER_URL, jpeg_cover()));
    let cache = CoverCache::new(fetcher.clone());

    let good = record(fake_mp3(dir.path(), "01.mp3"), 1);
    let mut bad = record(fake_mp3(dir.path(), "02.mp3"), 2);
    bad.recording_date = "April 5".to_string();

    let outcomes = AudioTagger::default()
        .tag_all(&[good.clone(), bad.clone()], &cache)
        .await;

    assert!(matches!(outcomes[0].result, Ok(TagState::Saved)));
    assert!(matches!(outcomes[1].result, Err(TagWriteError::Invalid(_))));
    assert_eq!(inspect_state(&good.file_path).unwrap(), TagState::Saved);
    assert_eq!(inspect_state(&bad.file_path).unwrap(), TagState::Untagged);
}
