use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("Track number must start at 1")]
    TrackNumber,
    #[error("Invalid recording date '{0}', expected YYYY, YYYY-MM or YYYY-MM-DD")]
    RecordingDate(String),
}

/// One rendered chapter of a collection
///
/// `content` is the renderer's paginated document; the assembler only counts
/// and copies its pages.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterUnit {
    pub source_url: String,
    pub title: String,
    pub content: Vec<u8>,
}

impl ChapterUnit {
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        content: Vec<u8>,
    ) -> Result<Self, ValidationError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ValidationError::Empty("Chapter title"));
        }
        Ok(ChapterUnit {
            source_url: source_url.into(),
            title,
            content,
        })
    }
}

/// Everything needed to assemble one collection document.
/// Chapter order is the final reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyRequest {
    pub collection_title: String,
    pub cover_url: String,
    pub chapters: Vec<ChapterUnit>,
}

impl AssemblyRequest {
    pub fn new(
        collection_title: impl Into<String>,
        cover_url: impl Into<String>,
        chapters: Vec<ChapterUnit>,
    ) -> Result<Self, ValidationError> {
        let collection_title = collection_title.into();
        let cover_url = cover_url.into();
        if collection_title.trim().is_empty() {
            return Err(ValidationError::Empty("Collection title"));
        }
        if cover_url.trim().is_empty() {
            return Err(ValidationError::Empty("Cover URL"));
        }
        Ok(AssemblyRequest {
            collection_title,
            cover_url,
            chapters,
        })
    }
}

/// Metadata to write into one downloaded audio file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrackRecord {
    pub file_path: PathBuf,
    pub title: String,
    /// Collection display title
    pub album: String,
    pub artist: String,
    pub track_number: u32,
    pub recording_date: String,
    pub cover_url: String,
}

impl AudioTrackRecord {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::Empty("Track title"));
        }
        if self.album.trim().is_empty() {
            return Err(ValidationError::Empty("Album"));
        }
        if self.cover_url.trim().is_empty() {
            return Err(ValidationError::Empty("Cover URL"));
        }
        if self.track_number == 0 {
            return Err(ValidationError::TrackNumber);
        }
        self.recording_timestamp()?;
        Ok(())
    }

    pub fn recording_timestamp(&self) -> Result<id3::Timestamp, ValidationError> {
        self.recording_date
            .trim()
            .parse::<id3::Timestamp>()
            .map_err(|_| ValidationError::RecordingDate(self.recording_date.clone()))
    }
}

/// Build the display title of a collection from its title and subtitle.
///
/// Titles that already end a sentence run straight into the subtitle,
/// anything else gets a " - " separator.
pub fn display_title(title: &str, subtitle: Option<&str>) -> String {
    let title = title.trim();
    match subtitle.map(str::trim).filter(|s| !s.is_empty()) {
        None => title.to_string(),
        Some(subtitle) => {
            if title.ends_with(['。', '？', '！']) {
                format!("{}{}", title, subtitle)
            } else {
                format!("{} - {}", title, subtitle)
            }
        }
    }
}

/// Make a display title usable as a single path component
pub fn safe_file_stem(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}
