//! JSON manifests describing one column or one audio collection
//!
//! Manifests are written by the API client that downloads and renders a
//! collection. Relative file paths inside a manifest are resolved against the
//! directory the manifest lives in.

use crate::models::{display_title, AssemblyRequest, AudioTrackRecord, ChapterUnit, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid manifest entry: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub url: String,
    pub title: String,
    /// Rendered chapter PDF
    pub file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnManifest {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub cover_url: String,
    pub chapters: Vec<ChapterEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEntry {
    pub file: PathBuf,
    pub title: String,
    pub track_number: u32,
    pub recording_date: String,
    pub cover_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioManifest {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub artist: String,
    pub tracks: Vec<TrackEntry>,
}

/// Read and parse a manifest file
pub fn load<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Directory that relative paths in the manifest at `path` resolve against
pub fn base_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn resolve(base_dir: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        base_dir.join(file)
    }
}

impl ColumnManifest {
    pub fn display_title(&self) -> String {
        display_title(&self.title, self.subtitle.as_deref())
    }

    /// Read every chapter file and build the assembly request
    ///
    /// A chapter file that cannot be read is passed on with empty content,
    /// which the assembler skips like any other unusable chapter.
    pub fn into_request(self, base_dir: &Path) -> Result<AssemblyRequest, ManifestError> {
        let collection_title = self.display_title();
        let mut chapters = Vec::with_capacity(self.chapters.len());

        for entry in self.chapters {
            let path = resolve(base_dir, &entry.file);
            let content = match std::fs::read(&path) {
                Ok(bytes) => {
                    debug!("Read chapter '{}' ({} bytes)", entry.title, bytes.len());
                    bytes
                }
                Err(e) => {
                    warn!(
                        "Could not read chapter '{}' from {}: {}",
                        entry.title,
                        path.display(),
                        e
                    );
                    Vec::new()
                }
            };
            match ChapterUnit::new(entry.url, entry.title, content) {
                Ok(chapter) => chapters.push(chapter),
                Err(e) => warn!("Skipping chapter from {}: {}", path.display(), e),
            }
        }

        Ok(AssemblyRequest::new(
            collection_title,
            self.cover_url,
            chapters,
        )?)
    }
}

impl AudioManifest {
    pub fn display_title(&self) -> String {
        display_title(&self.title, self.subtitle.as_deref())
    }

    /// Track records with the collection display title as album
    ///
    /// Records are not validated here; the tagger rejects an invalid record
    /// on its own without holding up the rest of the batch.
    pub fn into_tracks(self, base_dir: &Path) -> Vec<AudioTrackRecord> {
        let album = self.display_title();
        self.tracks
            .into_iter()
            .map(|entry| AudioTrackRecord {
                file_path: resolve(base_dir, &entry.file),
                title: entry.title,
                album: album.clone(),
                artist: self.artist.clone(),
                track_number: entry.track_number,
                recording_date: entry.recording_date,
                cover_url: entry.cover_url,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_column_manifest_resolves_relative_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("01.pdf"), b"%PDF-1.5 stub").unwrap();
        let manifest_path = dir.path().join("column.json");
        std::fs::write(
            &manifest_path,
            r#"{
                "title": "读懂历史！",
                "subtitle": "十讲",
                "cover_url": "https://img/cover.jpg",
                "chapters": [
                    {"url": "https://a/1", "title": "开篇", "file": "01.pdf"},
                    {"url": "https://a/2", "title": "失败", "file": "missing.pdf"}
                ]
            }"#,
        )
        .unwrap();

        let manifest: ColumnManifest = load(&manifest_path).unwrap();
        let request = manifest.into_request(&base_dir(&manifest_path)).unwrap();

        assert_eq!(request.collection_title, "读懂历史！十讲");
        assert_eq!(request.chapters.len(), 2);
        assert_eq!(request.chapters[0].content, b"%PDF-1.5 stub");
        assert!(request.chapters[1].content.is_empty());
    }

    #[test]
    fn test_audio_manifest_builds_records() {
        let manifest: AudioManifest = serde_json::from_str(
            r#"{
                "title": "History",
                "subtitle": "Ten Lectures",
                "artist": "Author",
                "tracks": [{
                    "file": "01.mp3",
                    "title": "Opening",
                    "track_number": 1,
                    "recording_date": "2023-04-05",
                    "cover_url": "https://img/cover.jpg"
                }]
            }"#,
        )
        .unwrap();

        let tracks = manifest.into_tracks(Path::new("/data/audio"));
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].album, "History - Ten Lectures");
        assert_eq!(tracks[0].file_path, PathBuf::from("/data/audio/01.mp3"));
    }

    #[test]
    fn test_invalid_track_is_passed_through() {
        let manifest = AudioManifest {
            title: "History".to_string(),
            subtitle: None,
            artist: "Author".to_string(),
            tracks: vec![
                TrackEntry {
                    file: PathBuf::from("01.mp3"),
                    title: "Opening".to_string(),
                    track_number: 1,
                    recording_date: "2023".to_string(),
                    cover_url: "https://img/cover.jpg".to_string(),
                },
                TrackEntry {
                    file: PathBuf::from("02.mp3"),
                    title: "Second".to_string(),
                    track_number: 2,
                    recording_date: "April 5".to_string(),
                    cover_url: "https://img/cover.jpg".to_string(),
                },
            ],
        };

        let tracks = manifest.into_tracks(Path::new("."));
        assert_eq!(tracks.len(), 2);
        assert!(tracks[0].validate().is_ok());
        assert!(matches!(
            tracks[1].validate(),
            Err(ValidationError::RecordingDate(_))
        ));
    }

    #[test]
    fn test_blank_chapter_title_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("01.pdf"), b"%PDF-1.5 stub").unwrap();
        let manifest = ColumnManifest {
            title: "Column".to_string(),
            subtitle: None,
            cover_url: "https://img/cover.jpg".to_string(),
            chapters: vec![
                ChapterEntry {
                    url: "https://a/1".to_string(),
                    title: "Intro".to_string(),
                    file: PathBuf::from("01.pdf"),
                },
                ChapterEntry {
                    url: "https://a/2".to_string(),
                    title: "   ".to_string(),
                    file: PathBuf::from("01.pdf"),
                },
            ],
        };

        let request = manifest.into_request(dir.path()).unwrap();
        assert_eq!(request.chapters.len(), 1);
        assert_eq!(request.chapters[0].title, "Intro");
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load::<ColumnManifest>(&path),
            Err(ManifestError::Parse { .. })
        ));
    }
}
