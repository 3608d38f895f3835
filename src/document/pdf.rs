use super::{ChapterParseError, RenderError};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};

pub const POINTS_PER_INCH: f32 = 72.0;

/// Page dimensions in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

pub const A4: PageSize = PageSize {
    width: 595.2756,
    height: 841.8898,
};

pub const LETTER: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Page-tree nodes deeper than this are treated as a cycle
const MAX_TREE_DEPTH: usize = 64;

/// A parsed, paginated document ready to be merged
#[derive(Debug, Clone)]
pub struct PdfFragment {
    document: Document,
    page_count: usize,
}

impl PdfFragment {
    /// Parse rendered bytes into a fragment, counting its pages
    pub fn parse(bytes: &[u8]) -> Result<Self, ChapterParseError> {
        if bytes.is_empty() {
            return Err(ChapterParseError::Empty);
        }
        let document = Document::load_mem(bytes)
            .map_err(|e| ChapterParseError::Malformed(e.to_string()))?;
        if document.is_encrypted() {
            return Err(ChapterParseError::Encrypted);
        }
        Self::from_document(document)
    }

    pub fn from_document(document: Document) -> Result<Self, ChapterParseError> {
        let page_count = document.get_pages().len();
        if page_count == 0 {
            return Err(ChapterParseError::NoPages);
        }
        Ok(PdfFragment {
            document,
            page_count,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RenderError> {
        let mut document = self.document.clone();
        let mut bytes = Vec::new();
        document
            .save_to(&mut bytes)
            .map_err(|e| RenderError::Content(e.to_string()))?;
        Ok(bytes)
    }
}

/// Writes freshly drawn pages into a new single-purpose document
pub(crate) struct FragmentWriter {
    document: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl FragmentWriter {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        FragmentWriter {
            document,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn add_object<T: Into<Object>>(&mut self, object: T) -> ObjectId {
        self.document.add_object(object)
    }

    pub fn add_page(
        &mut self,
        size: PageSize,
        resources_id: ObjectId,
        operations: Vec<Operation>,
    ) -> Result<(), RenderError> {
        let content = Content { operations }
            .encode()
            .map_err(|e| RenderError::Content(e.to_string()))?;
        let content_id = self
            .document
            .add_object(lopdf::Stream::new(dictionary! {}, content));
        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => media_box(size),
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    pub fn finish(mut self) -> Result<PdfFragment, RenderError> {
        let count = self.kids.len() as i64;
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);

        PdfFragment::from_document(self.document)
            .map_err(|e| RenderError::Content(format!("Rendered fragment is unusable: {}", e)))
    }
}

/// Concatenates the pages of several fragments under one page tree
///
/// Pages are copied as-is; only their `Parent` link changes, after the
/// attributes they used to inherit have been pinned onto the page itself.
pub(crate) struct PageTreeBuilder {
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl PageTreeBuilder {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        PageTreeBuilder {
            document,
            pages_id,
            page_ids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Append every page of a fragment, returning how many were added
    pub fn append(&mut self, fragment: PdfFragment) -> usize {
        let mut source = fragment.into_document();
        source.renumber_objects_with(self.document.max_id + 1);

        let pages: Vec<(ObjectId, Dictionary)> = source
            .get_pages()
            .into_values()
            .filter_map(|page_id| flattened_page(&source, page_id).map(|page| (page_id, page)))
            .collect();

        self.document.max_id = self.document.max_id.max(source.max_id);
        for (object_id, object) in source.objects {
            if !is_structural(&object) {
                self.document.objects.insert(object_id, object);
            }
        }

        let added = pages.len();
        for (page_id, mut page) in pages {
            page.set("Parent", self.pages_id);
            self.document
                .objects
                .insert(page_id, Object::Dictionary(page));
            self.page_ids.push(page_id);
        }
        added
    }

    /// Close the page tree and hand the document back with its catalog id
    pub fn finish(mut self) -> (Document, ObjectId, Vec<ObjectId>) {
        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::Reference(*id)).collect();
        let count = kids.len() as i64;
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);
        (self.document, catalog_id, self.page_ids)
    }
}

/// Copy of a page dictionary with inherited attributes made explicit
fn flattened_page(document: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let mut page = document.get_dictionary(page_id).ok()?.clone();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = document.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Some(page)
}

/// Catalog, page-tree and outline nodes are rebuilt for the merged document
fn is_structural(object: &Object) -> bool {
    let Object::Dictionary(dict) = object else {
        return false;
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Catalog") | Ok(b"Pages") | Ok(b"Outlines")
    )
}

pub(crate) fn media_box(size: PageSize) -> Vec<Object> {
    vec![0.into(), 0.into(), size.width.into(), size.height.into()]
}

/// Encode text as a PDF text string: printable ASCII stays literal,
/// anything else becomes UTF-16BE with a byte order mark
pub fn text_string(text: &str) -> Object {
    if text.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        Object::string_literal(text)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

/// Decode a PDF text string written as UTF-16BE (with BOM) or single bytes
pub fn decode_text_string(bytes: &[u8]) -> String {
    match bytes.strip_prefix(&[0xFE, 0xFF]) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_fragment(pages: usize) -> PdfFragment {
        let mut writer = FragmentWriter::new();
        let resources_id = writer.add_object(dictionary! {});
        for _ in 0..pages {
            writer.add_page(LETTER, resources_id, vec![]).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(PdfFragment::parse(b"").unwrap_err(), ChapterParseError::Empty);
        assert!(matches!(
            PdfFragment::parse(b"<html>not a pdf</html>"),
            Err(ChapterParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_counts_pages() {
        let bytes = blank_fragment(3).to_bytes().unwrap();
        let fragment = PdfFragment::parse(&bytes).unwrap();
        assert_eq!(fragment.page_count(), 3);
    }

    #[test]
    fn test_page_tree_builder_keeps_order() {
        let mut builder = PageTreeBuilder::new();
        assert_eq!(builder.append(blank_fragment(2)), 2);
        assert_eq!(builder.append(blank_fragment(1)), 1);
        assert_eq!(builder.page_count(), 3);

        let (document, _, page_ids) = builder.finish();
        let pages: Vec<ObjectId> = document.get_pages().into_values().collect();
        assert_eq!(pages, page_ids);
    }

    #[test]
    fn test_inherited_media_box_is_pinned_on_page() {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let content_id = document.add_object(lopdf::Stream::new(dictionary! {}, vec![]));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => media_box(A4),
                "Resources" => dictionary! {},
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        let mut builder = PageTreeBuilder::new();
        builder.append(PdfFragment::from_document(document).unwrap());
        let (merged, _, page_ids) = builder.finish();

        let page = merged.get_dictionary(page_ids[0]).unwrap();
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
    }

    #[test]
    fn test_text_string_round_trip() {
        for text in ["Intro", "第1章 开篇", "Café"] {
            let Object::String(bytes, _) = text_string(text) else {
                panic!("expected a string object");
            };
            assert_eq!(decode_text_string(&bytes), text);
        }
    }
}
