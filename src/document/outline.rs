use super::assembler::BookmarkEntry;
use super::pdf::{decode_text_string, text_string};
use super::AssemblyError;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::{HashMap, HashSet};

/// Write a flat outline with one item per entry, each opening its target
/// page fitted to the window. Returns the outline root, if any.
pub(crate) fn write_outline(
    document: &mut Document,
    page_ids: &[ObjectId],
    entries: &[BookmarkEntry],
) -> Result<Option<ObjectId>, AssemblyError> {
    if entries.is_empty() {
        return Ok(None);
    }

    let root_id = document.new_object_id();
    let item_ids: Vec<ObjectId> = entries.iter().map(|_| document.new_object_id()).collect();

    for (i, entry) in entries.iter().enumerate() {
        let page_id = page_ids
            .get(entry.target_page)
            .ok_or_else(|| AssemblyError::BookmarkOutOfRange {
                title: entry.title.clone(),
                page: entry.target_page,
                page_count: page_ids.len(),
            })?;

        let mut item = dictionary! {
            "Title" => text_string(&entry.title),
            "Parent" => root_id,
            "Dest" => vec![Object::Reference(*page_id), "Fit".into()],
        };
        if i > 0 {
            item.set("Prev", item_ids[i - 1]);
        }
        if let Some(next) = item_ids.get(i + 1) {
            item.set("Next", *next);
        }
        document.objects.insert(item_ids[i], Object::Dictionary(item));
    }

    let first = item_ids[0];
    let last = item_ids[item_ids.len() - 1];
    document.objects.insert(
        root_id,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => first,
            "Last" => last,
            "Count" => item_ids.len() as i64,
        }),
    );

    Ok(Some(root_id))
}

/// Read the top level of a document's outline as (title, page index) pairs.
/// Items whose destination cannot be resolved to a page are left out.
pub fn read_outline(document: &Document) -> Vec<BookmarkEntry> {
    let page_index: HashMap<ObjectId, usize> = document
        .get_pages()
        .into_values()
        .enumerate()
        .map(|(index, id)| (id, index))
        .collect();

    let Some(root) = document
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"Outlines").ok())
        .and_then(|outlines| resolve_dictionary(document, outlines))
    else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    let mut next = root.get(b"First").and_then(Object::as_reference).ok();

    while let Some(item_id) = next {
        if !visited.insert(item_id) {
            break;
        }
        let Ok(item) = document.get_dictionary(item_id) else {
            break;
        };

        let title = match item.get(b"Title") {
            Ok(Object::String(bytes, _)) => decode_text_string(bytes),
            _ => String::new(),
        };
        if let Some(target_page) = destination_page(document, item)
            .and_then(|page_id| page_index.get(&page_id).copied())
        {
            entries.push(BookmarkEntry { title, target_page });
        }

        next = item.get(b"Next").and_then(Object::as_reference).ok();
    }

    entries
}

/// Page targeted by an item's `/Dest`, or by a GoTo action's `/D`
fn destination_page(document: &Document, item: &Dictionary) -> Option<ObjectId> {
    let dest = item.get(b"Dest").ok().or_else(|| {
        item.get(b"A")
            .ok()
            .and_then(|action| resolve_dictionary(document, action))
            .and_then(|action| action.get(b"D").ok())
    })?;

    let dest = match dest {
        Object::Reference(id) => document.get_object(*id).ok()?,
        other => other,
    };
    dest.as_array().ok()?.first()?.as_reference().ok()
}

fn resolve_dictionary<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Reference(id) => document.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}
