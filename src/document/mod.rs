//! Collection document assembly
//!
//! A collection document is a cover page, a table of contents and the
//! rendered chapters, in that order, with one outline entry per chapter.
//! Chapters whose content is not a usable PDF are left out of the document,
//! the table of contents and the outline alike, so numbering stays gapless.

pub mod assembler;
pub mod cover_page;
pub mod outline;
pub mod pdf;
pub mod toc;

pub use assembler::{
    AssembledDocument, AssemblyReport, BookmarkEntry, DocumentAssembler, SkippedChapter,
};
pub use cover_page::CoverPageBuilder;
pub use pdf::PdfFragment;
pub use toc::{TableOfContentsBuilder, TocFont, TocRow, TocStyle};

use crate::network::FetchError;
use thiserror::Error;

/// Failure to draw the cover or the table of contents
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Cover image could not be decoded: {0}")]
    UndecodableImage(String),
    #[error("Cover image could not be encoded: {0}")]
    ImageEncode(String),
    #[error("Font resource not available: {0}")]
    MissingFont(String),
    #[error("Character {ch:?} cannot be encoded with font {font}")]
    Unencodable { ch: char, font: &'static str },
    #[error("Table row for '{0}' does not fit on a page")]
    RowTooTall(String),
    #[error("PDF content error: {0}")]
    Content(String),
}

/// A chapter whose content cannot be used as a page sequence
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChapterParseError {
    #[error("Chapter content is empty")]
    Empty,
    #[error("Not a valid PDF document: {0}")]
    Malformed(String),
    #[error("Document is encrypted")]
    Encrypted,
    #[error("Document has no pages")]
    NoPages,
}

/// Anything that aborts a whole assembly
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Cover fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),
    #[error("Bookmark '{title}' points at page {page} of a {page_count}-page document")]
    BookmarkOutOfRange {
        title: String,
        page: usize,
        page_count: usize,
    },
    #[error("Failed to serialize document: {0}")]
    Pdf(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
