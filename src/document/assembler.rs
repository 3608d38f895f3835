use super::cover_page::CoverPageBuilder;
use super::outline;
use super::pdf::{text_string, PageTreeBuilder, PdfFragment};
use super::toc::TableOfContentsBuilder;
use super::{AssemblyError, ChapterParseError};
use crate::cover_cache::CoverCache;
use crate::models::{AssemblyRequest, ChapterUnit};
use lopdf::{dictionary, Document, Object};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outline entry: a chapter title and the zero-based page it opens on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkEntry {
    pub title: String,
    pub target_page: usize,
}

/// A chapter left out of the document
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedChapter {
    /// Position in the original request
    pub index: usize,
    pub title: String,
    pub reason: ChapterParseError,
}

/// Summary of an assembled document written to disk
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyReport {
    pub output_path: PathBuf,
    pub page_count: usize,
    pub cover_pages: usize,
    pub toc_pages: usize,
    pub bookmarks: Vec<BookmarkEntry>,
    pub skipped: Vec<SkippedChapter>,
}

/// Merged collection document, held in memory until written
#[derive(Debug)]
pub struct AssembledDocument {
    document: Document,
    page_count: usize,
    cover_pages: usize,
    toc_pages: usize,
    bookmarks: Vec<BookmarkEntry>,
    skipped: Vec<SkippedChapter>,
}

impl AssembledDocument {
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn cover_pages(&self) -> usize {
        self.cover_pages
    }

    pub fn toc_pages(&self) -> usize {
        self.toc_pages
    }

    pub fn bookmarks(&self) -> &[BookmarkEntry] {
        &self.bookmarks
    }

    pub fn skipped(&self) -> &[SkippedChapter] {
        &self.skipped
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>, AssemblyError> {
        let mut bytes = Vec::new();
        self.document
            .save_to(&mut bytes)
            .map_err(|e| AssemblyError::Pdf(e.to_string()))?;
        Ok(bytes)
    }

    /// Write the document to `path` as a whole or not at all
    ///
    /// The bytes go to a temporary file next to the destination, which is
    /// synced and then renamed over it. A failure at any point removes the
    /// temporary file and leaves the destination untouched.
    pub fn write_to_path(&mut self, path: &Path) -> Result<(), AssemblyError> {
        let bytes = self.to_bytes()?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut temp = tempfile::Builder::new()
            .prefix(".column-press-")
            .suffix(".part")
            .tempfile_in(dir)?;
        temp.write_all(&bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| AssemblyError::Io(e.error))?;

        info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn report(&self, output_path: &Path) -> AssemblyReport {
        AssemblyReport {
            output_path: output_path.to_path_buf(),
            page_count: self.page_count,
            cover_pages: self.cover_pages,
            toc_pages: self.toc_pages,
            bookmarks: self.bookmarks.clone(),
            skipped: self.skipped.clone(),
        }
    }
}

/// Merges cover, table of contents and chapters into one document
#[derive(Debug, Clone, Default)]
pub struct DocumentAssembler {
    cover: CoverPageBuilder,
    toc: TableOfContentsBuilder,
}

impl DocumentAssembler {
    pub fn new(cover: CoverPageBuilder, toc: TableOfContentsBuilder) -> Self {
        DocumentAssembler { cover, toc }
    }

    /// Assemble a request and write it to `output_path`
    pub async fn assemble_to_path(
        &self,
        request: &AssemblyRequest,
        cache: &CoverCache,
        output_path: &Path,
    ) -> Result<AssemblyReport, AssemblyError> {
        let mut assembled = self.assemble(request, cache).await?;
        assembled.write_to_path(output_path)?;
        Ok(assembled.report(output_path))
    }

    /// Assemble a request in memory, fetching its cover through the cache
    pub async fn assemble(
        &self,
        request: &AssemblyRequest,
        cache: &CoverCache,
    ) -> Result<AssembledDocument, AssemblyError> {
        info!(
            "Assembling '{}' from {} chapters",
            request.collection_title,
            request.chapters.len()
        );
        let cover = self.cover.build(cache, &request.cover_url).await?;
        self.assemble_with_cover(request, cover)
    }

    /// Merge an already rendered cover with the request's chapters
    pub fn assemble_with_cover(
        &self,
        request: &AssemblyRequest,
        cover: PdfFragment,
    ) -> Result<AssembledDocument, AssemblyError> {
        let (included, skipped) = partition_chapters(&request.chapters);

        let titles: Vec<&str> = included
            .iter()
            .map(|(chapter, _)| chapter.title.as_str())
            .collect();
        let toc = self.toc.build(&titles)?;

        let mut pages = PageTreeBuilder::new();
        let cover_pages = pages.append(cover);
        let toc_pages = pages.append(toc);

        let mut offset = cover_pages + toc_pages;
        let mut bookmarks = Vec::with_capacity(included.len());
        for (chapter, fragment) in included {
            let added = pages.append(fragment);
            debug!("Chapter '{}' at page {} ({} pages)", chapter.title, offset, added);
            bookmarks.push(BookmarkEntry {
                title: chapter.title.clone(),
                target_page: offset,
            });
            offset += added;
        }

        let page_count = pages.page_count();
        let (mut document, catalog_id, page_ids) = pages.finish();

        if let Some(outline_id) = outline::write_outline(&mut document, &page_ids, &bookmarks)? {
            if let Ok(catalog) = document.get_dictionary_mut(catalog_id) {
                catalog.set("Outlines", outline_id);
                catalog.set("PageMode", "UseOutlines");
            }
        }
        let info_id = document.add_object(dictionary! {
            "Title" => text_string(&request.collection_title),
            "Producer" => Object::string_literal("column-press"),
        });
        document.trailer.set("Info", info_id);

        info!(
            "Assembled '{}': {} pages, {} chapters, {} skipped",
            request.collection_title,
            page_count,
            bookmarks.len(),
            skipped.len()
        );

        Ok(AssembledDocument {
            document,
            page_count,
            cover_pages,
            toc_pages,
            bookmarks,
            skipped,
        })
    }
}

/// Parse every chapter, then split them into those that go into the
/// document (in request order) and those that are skipped
fn partition_chapters(
    chapters: &[ChapterUnit],
) -> (Vec<(&ChapterUnit, PdfFragment)>, Vec<SkippedChapter>) {
    let parsed: Vec<(usize, &ChapterUnit, Result<PdfFragment, ChapterParseError>)> = chapters
        .iter()
        .enumerate()
        .map(|(index, chapter)| (index, chapter, PdfFragment::parse(&chapter.content)))
        .collect();

    let mut included = Vec::new();
    let mut skipped = Vec::new();
    for (index, chapter, result) in parsed {
        match result {
            Ok(fragment) => included.push((chapter, fragment)),
            Err(reason) => {
                warn!(
                    "Skipping chapter {} '{}' ({}): {}",
                    index + 1,
                    chapter.title,
                    chapter.source_url,
                    reason
                );
                skipped.push(SkippedChapter {
                    index,
                    title: chapter.title.clone(),
                    reason,
                });
            }
        }
    }
    (included, skipped)
}
