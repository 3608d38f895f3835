use crate::cover_cache::CoverCache;
use crate::imaging;
use crate::models::{AudioTrackRecord, ValidationError};
use crate::network::FetchError;
use futures::stream::{self, StreamExt};
use id3::frame::{Picture, PictureType};
use id3::{Tag, TagLike, Version};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const COVER_MIME_TYPE: &str = "image/jpeg";
pub const COVER_DESCRIPTION: &str = "Cover";
pub const TAG_VERSION: Version = Version::Id3v24;

pub const DEFAULT_TAG_CONCURRENCY: usize = 4;

#[derive(Error, Debug)]
pub enum TagWriteError {
    #[error("Invalid track record: {0}")]
    Invalid(#[from] ValidationError),
    #[error("Audio file not found: {0}")]
    MissingFile(PathBuf),
    #[error("ID3 error on {path}: {source}")]
    Id3 { path: PathBuf, source: id3::Error },
    #[error("Cover fetch failed for {url}: {source}")]
    CoverFetch { url: String, source: FetchError },
    #[error("Cover image unusable: {0}")]
    CoverImage(String),
    #[error("Tagging task failed: {0}")]
    Task(String),
}

/// How far along a file is in the tagging sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TagState {
    Untagged,
    /// Text frames written and saved, no cover yet
    HasBaseTag,
    /// Cover attached in memory, not yet saved
    HasCover,
    Saved,
}

/// Result of tagging one track in a batch
#[derive(Debug)]
pub struct TagOutcome {
    pub file_path: PathBuf,
    pub result: Result<TagState, TagWriteError>,
}

/// Writes ID3v2.4 metadata and a front cover into downloaded audio files
#[derive(Debug, Clone)]
pub struct AudioTagger {
    concurrency: usize,
}

impl Default for AudioTagger {
    fn default() -> Self {
        AudioTagger::new(DEFAULT_TAG_CONCURRENCY)
    }
}

impl AudioTagger {
    pub fn new(concurrency: usize) -> Self {
        AudioTagger {
            concurrency: concurrency.max(1),
        }
    }

    /// Tag one file in place
    ///
    /// The text frames are saved before the cover is fetched, so a cover
    /// failure leaves the file in `HasBaseTag`. Every write overwrites, so
    /// calling this again after any failure is safe.
    pub async fn tag(
        &self,
        track: &AudioTrackRecord,
        cache: &CoverCache,
    ) -> Result<TagState, TagWriteError> {
        track.validate()?;
        if !track.file_path.is_file() {
            return Err(TagWriteError::MissingFile(track.file_path.clone()));
        }

        let path = track.file_path.clone();
        let record = track.clone();
        let state = run_blocking(move || write_base_tag(&path, &record)).await?;
        debug!("{}: {:?}", track.file_path.display(), state);

        let cover = cache
            .fetch(&track.cover_url)
            .await
            .map_err(|source| TagWriteError::CoverFetch {
                url: track.cover_url.clone(),
                source,
            })?;
        let jpeg = cover_as_jpeg(&cover)?;

        let path = track.file_path.clone();
        let state = run_blocking(move || embed_cover(&path, jpeg)).await?;
        debug!("{}: {:?}", track.file_path.display(), state);

        Ok(state)
    }

    /// Tag a batch of tracks, up to `concurrency` at a time
    ///
    /// Outcomes come back in input order. One track failing does not stop
    /// the others.
    pub async fn tag_all(&self, tracks: &[AudioTrackRecord], cache: &CoverCache) -> Vec<TagOutcome> {
        info!(
            "Tagging {} tracks ({} at a time)",
            tracks.len(),
            self.concurrency
        );

        let outcomes: Vec<TagOutcome> = stream::iter(tracks)
            .map(|track| async move {
                let result = self.tag(track, cache).await;
                if let Err(e) = &result {
                    warn!("Failed to tag {}: {}", track.file_path.display(), e);
                }
                TagOutcome {
                    file_path: track.file_path.clone(),
                    result,
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let saved = outcomes
            .iter()
            .filter(|outcome| matches!(outcome.result, Ok(TagState::Saved)))
            .count();
        info!("Tagged {}/{} tracks", saved, outcomes.len());

        outcomes
    }
}

/// Read the tagging state a file is currently in
pub fn inspect_state(path: &Path) -> Result<TagState, TagWriteError> {
    if !path.is_file() {
        return Err(TagWriteError::MissingFile(path.to_path_buf()));
    }
    let Some(tag) = read_tag(path)? else {
        return Ok(TagState::Untagged);
    };

    let has_base = tag.title().is_some()
        && tag.album().is_some()
        && tag.artist().is_some()
        && tag.track().is_some()
        && tag.date_recorded().is_some();
    if !has_base {
        return Ok(TagState::Untagged);
    }

    let has_cover = tag
        .pictures()
        .any(|picture| picture.picture_type == PictureType::CoverFront);
    Ok(if has_cover {
        TagState::Saved
    } else {
        TagState::HasBaseTag
    })
}

/// Existing tag of a file, or `None` when it has none
fn read_tag(path: &Path) -> Result<Option<Tag>, TagWriteError> {
    match Tag::read_from_path(path) {
        Ok(tag) => Ok(Some(tag)),
        Err(id3::Error {
            kind: id3::ErrorKind::NoTag,
            ..
        }) => Ok(None),
        Err(source) => Err(TagWriteError::Id3 {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn save_tag(tag: &Tag, path: &Path) -> Result<(), TagWriteError> {
    tag.write_to_path(path, TAG_VERSION)
        .map_err(|source| TagWriteError::Id3 {
            path: path.to_path_buf(),
            source,
        })
}

fn write_base_tag(path: &Path, track: &AudioTrackRecord) -> Result<TagState, TagWriteError> {
    let recorded = track.recording_timestamp()?;
    let mut tag = read_tag(path)?.unwrap_or_else(|| Tag::with_version(TAG_VERSION));

    tag.set_title(track.title.as_str());
    tag.set_album(track.album.as_str());
    tag.set_artist(track.artist.as_str());
    tag.set_track(track.track_number);
    tag.set_date_recorded(recorded);

    save_tag(&tag, path)?;
    Ok(TagState::HasBaseTag)
}

fn embed_cover(path: &Path, jpeg: Vec<u8>) -> Result<TagState, TagWriteError> {
    let mut tag = read_tag(path)?.unwrap_or_else(|| Tag::with_version(TAG_VERSION));

    tag.remove_picture_by_type(PictureType::CoverFront);
    tag.add_frame(Picture {
        mime_type: COVER_MIME_TYPE.to_string(),
        picture_type: PictureType::CoverFront,
        description: COVER_DESCRIPTION.to_string(),
        data: jpeg,
    });
    debug!("{}: {:?}", path.display(), TagState::HasCover);

    save_tag(&tag, path)?;
    Ok(TagState::Saved)
}

/// Cover bytes as JPEG, transcoding other raster formats
fn cover_as_jpeg(bytes: &[u8]) -> Result<Vec<u8>, TagWriteError> {
    if imaging::is_jpeg(bytes) {
        return Ok(bytes.to_vec());
    }
    imaging::encode_jpeg(bytes)
        .map(|jpeg| jpeg.data)
        .map_err(|e| TagWriteError::CoverImage(e.to_string()))
}

async fn run_blocking<F>(work: F) -> Result<TagState, TagWriteError>
where
    F: FnOnce() -> Result<TagState, TagWriteError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| TagWriteError::Task(e.to_string()))?
}
