//! PDF document model.
//!
//! [`Document`] owns an [`ObjectStore`] plus the handful of ids that tie it
//! together (catalog, page tree root, Info dictionary). A document is either
//! built from scratch with [`Document::new`] or opened from bytes with
//! [`Document::open`], in which case every object is carried over verbatim
//! at its original number and the original bytes are kept for incremental
//! saves.

use crate::config::{ParserOptions, WriterConfig};
use crate::editor::incremental::{self, IncrementalRequest};
use crate::editor::patch;
use crate::error::{Error, Result};
use crate::lexer;
use crate::parser::{self, ParsedDocument};
use crate::store::gc::{self, GcMode};
use crate::store::{
    Annotation, Catalog, ContentStream, DocObject, DocumentInfo, EmbeddedFile, FileSpec, Font,
    ImportedObject, MediaBox, NameTree, ObjectStore, Page, PageTree, Serializable,
};
use crate::writer::{DocumentWriter, ObjectSerializer, TrailerRefs};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

/// Where an opened document came from.
#[derive(Debug, Clone)]
struct Source {
    bytes: Vec<u8>,
    id: Option<String>,
}

/// Page tree as found in the store: leaves in reading order and the parent
/// of every node and leaf.
#[derive(Debug, Default)]
struct PageTreeIndex {
    pages: Vec<u32>,
    parents: HashMap<u32, u32>,
}

/// PDF document.
///
/// # Example
///
/// ```
/// use pdf_forge::document::Document;
/// use pdf_forge::store::MediaBox;
///
/// let mut doc = Document::new();
/// let page = doc.add_page(MediaBox::LETTER)?;
/// let font = doc.add_font("Helvetica");
/// doc.use_font(page, "F1", font)?;
/// doc.append_content(page, "BT /F1 24 Tf 72 720 Td (Hello) Tj ET")?;
///
/// let bytes = doc.to_bytes()?;
/// let reopened = Document::open(&bytes)?;
/// assert_eq!(reopened.page_count(), 1);
/// # Ok::<(), pdf_forge::error::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Document {
    store: ObjectStore,
    config: WriterConfig,
    options: ParserOptions,
    catalog: u32,
    pages: u32,
    info: Option<u32>,
    source: Option<Source>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Highest object number `open` will allocate slots for.
///
/// The larger of the trailer `/Size` and twice the object count, capped at
/// the input length.
fn slot_ceiling(parsed: &ParsedDocument, input_len: usize) -> usize {
    let declared = parsed.trailer.size.unwrap_or(0) as usize;
    let observed = parsed.objects.len().saturating_mul(2).saturating_add(16);
    declared.max(observed).min(input_len)
}

impl Document {
    /// Empty document (catalog and page tree root) with default settings.
    pub fn new() -> Self {
        Self::with_config(WriterConfig::default())
    }

    /// Empty document written with `config`.
    pub fn with_config(config: WriterConfig) -> Self {
        let mut store = ObjectStore::new();
        let catalog = ObjectStore::id_of(store.add(DocObject::Catalog(Catalog {
            pages: 2,
            names: None,
        })));
        let pages = ObjectStore::id_of(store.add(DocObject::Pages(PageTree::default())));
        Self {
            store,
            config,
            options: ParserOptions::default(),
            catalog,
            pages,
            info: None,
            source: None,
        }
    }

    /// Open a document from bytes with lenient parsing.
    pub fn open(bytes: &[u8]) -> Result<Self> {
        Self::open_with_options(bytes, ParserOptions::default())
    }

    /// Open a document from bytes.
    ///
    /// Every object is imported at its original number; numbers with no
    /// object become tombstones. Modification tracking starts clean.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPdf`] when the highest object number is beyond what
    /// the trailer `/Size` and the object count allow, or beyond the input
    /// length.
    pub fn open_with_options(bytes: &[u8], options: ParserOptions) -> Result<Self> {
        let parsed = parser::parse_with_options(bytes, &options)?;
        let catalog = parsed.trailer.root;
        let pages = parsed
            .catalog()
            .and_then(|c| parser::reference(&c.dict, "Pages"))
            .ok_or(Error::AnchorNotFound("pages"))?;

        let max_number = parsed.max_object_number();
        let ceiling = slot_ceiling(&parsed, bytes.len());
        if max_number as usize > ceiling {
            return Err(Error::InvalidPdf(format!(
                "object number {} exceeds the {} slots a {} byte file can index",
                max_number,
                ceiling,
                bytes.len()
            )));
        }

        let mut store = ObjectStore::new();
        for number in 1..=max_number {
            match parsed.object(number) {
                Some(raw) => store.add(DocObject::Imported(ImportedObject {
                    dict: raw.dict.clone(),
                    stream: raw.stream.clone(),
                    generation: raw.generation,
                    imported: false,
                })),
                None => store.add(DocObject::Null),
            };
        }
        store.reset_tracking();

        log::info!(
            "Opened document: {} objects, {} pages",
            parsed.objects.len(),
            parsed.page_count()
        );
        Ok(Self {
            store,
            config: WriterConfig::default(),
            options,
            catalog,
            pages,
            info: parsed.trailer.info,
            source: Some(Source {
                bytes: bytes.to_vec(),
                id: parsed.trailer.id.clone(),
            }),
        })
    }

    /// Replace the writer configuration.
    pub fn set_config(&mut self, config: WriterConfig) {
        self.config = config;
    }

    /// The underlying store.
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Catalog id.
    pub fn catalog_id(&self) -> u32 {
        self.catalog
    }

    /// Page tree root id.
    pub fn pages_id(&self) -> u32 {
        self.pages
    }

    /// Info dictionary id, if any.
    pub fn info_id(&self) -> Option<u32> {
        self.info
    }

    /// Bytes the document was opened from.
    pub fn original_bytes(&self) -> Option<&[u8]> {
        self.source.as_ref().map(|s| s.bytes.as_slice())
    }

    /// Append an object and return its slot (its id is `slot + 1`).
    pub fn add_obj(&mut self, obj: impl Into<DocObject>) -> usize {
        self.store.add(obj)
    }

    /// Object in `slot`.
    pub fn object(&self, slot: usize) -> Option<&DocObject> {
        self.store.get(slot)
    }

    /// Mutable object in `slot`; marks it modified.
    pub fn object_mut(&mut self, slot: usize) -> Option<&mut DocObject> {
        self.store.get_mut(slot)
    }

    fn slot(&self, id: u32) -> Result<usize> {
        ObjectStore::slot_of(id)
            .filter(|&slot| slot < self.store.len())
            .ok_or(Error::OutOfRange {
                index: id as usize,
                len: self.store.len(),
            })
    }

    fn page_mut(&mut self, slot: usize) -> Result<&mut Page> {
        let len = self.store.len();
        match self.store.get(slot) {
            None => return Err(Error::OutOfRange { index: slot, len }),
            Some(DocObject::Page(_)) => {},
            Some(other) => {
                return Err(Error::InvalidPdf(format!(
                    "object {} is {}, not a page",
                    ObjectStore::id_of(slot),
                    other.type_tag()
                )))
            },
        }
        match self.store.get_mut(slot) {
            Some(DocObject::Page(page)) => Ok(page),
            _ => Err(Error::OutOfRange { index: slot, len }),
        }
    }

    /// Add an empty page with its own content stream and return the page slot.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPdf`] when the page tree root cannot take another
    /// kid. The page and its content stream are tombstoned again.
    pub fn add_page(&mut self, media_box: MediaBox) -> Result<usize> {
        let content_slot = self.store.add(DocObject::Content(ContentStream::new()));
        let mut page = Page::new(media_box);
        page.parent = Some(self.pages);
        page.contents.push(ObjectStore::id_of(content_slot));
        let slot = self.store.add(DocObject::Page(page));

        if let Err(e) = self.link_page(ObjectStore::id_of(slot)) {
            log::warn!("Page {} not linked into the page tree: {}", ObjectStore::id_of(slot), e);
            self.store.tombstone(slot)?;
            self.store.tombstone(content_slot)?;
            return Err(e);
        }
        Ok(slot)
    }

    /// Queue a content operator on the page in `page_slot`.
    ///
    /// Goes to the page's last content stream, or a new one when that stream
    /// was not created by this document.
    pub fn append_content(&mut self, page_slot: usize, op: impl Into<String>) -> Result<()> {
        let last = self.page_mut(page_slot)?.contents.last().copied();
        let target = last
            .and_then(ObjectStore::slot_of)
            .filter(|&slot| matches!(self.store.get(slot), Some(DocObject::Content(_))));

        let content_slot = match target {
            Some(slot) => slot,
            None => {
                let slot = self.store.add(DocObject::Content(ContentStream::new()));
                self.page_mut(page_slot)?.contents.push(ObjectStore::id_of(slot));
                slot
            },
        };
        if let Some(DocObject::Content(content)) = self.store.get_mut(content_slot) {
            content.push(op);
        }
        Ok(())
    }

    /// Add a standard Type1 font and return its id.
    pub fn add_font(&mut self, base_font: impl Into<String>) -> u32 {
        ObjectStore::id_of(self.store.add(DocObject::Font(Font {
            base_font: base_font.into(),
        })))
    }

    /// Register `font_id` as `/resource_name` in the page's font resources.
    pub fn use_font(&mut self, page_slot: usize, resource_name: &str, font_id: u32) -> Result<()> {
        self.slot(font_id)?;
        self.page_mut(page_slot)?
            .fonts
            .insert(resource_name.to_string(), font_id);
        Ok(())
    }

    /// Add an annotation to the page in `page_slot` and return its id.
    pub fn add_annotation(&mut self, page_slot: usize, annotation: Annotation) -> Result<u32> {
        self.page_mut(page_slot)?;
        let id = ObjectStore::id_of(self.store.add(DocObject::Annotation(annotation)));
        self.page_mut(page_slot)?.annots.push(id);
        Ok(id)
    }

    /// Embed `data` as a file attachment named `name`; returns the file
    /// specification id.
    ///
    /// # Errors
    ///
    /// [`Error::Unsupported`] when an opened document already has a name
    /// dictionary that was not created here.
    pub fn embed_file(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<u32> {
        let name = name.into();
        let existing = match self.store.get_by_id(self.catalog) {
            Some(DocObject::Catalog(catalog)) => catalog.names,
            Some(DocObject::Imported(obj)) => match parser::get_value(&obj.dict, "Names") {
                Some(_) => {
                    return Err(Error::Unsupported(
                        "adding files to an existing name dictionary".to_string(),
                    ))
                },
                None => None,
            },
            _ => return Err(Error::AnchorNotFound("root")),
        };
        if let Some(names) = existing {
            if !matches!(self.store.get_by_id(names), Some(DocObject::Names(_))) {
                return Err(Error::Unsupported(format!("name dictionary {} is not editable", names)));
            }
        }

        let file = ObjectStore::id_of(self.store.add(DocObject::EmbeddedFile(EmbeddedFile {
            data,
            mime_type: None,
        })));
        let spec = ObjectStore::id_of(self.store.add(DocObject::FileSpec(FileSpec {
            name: name.clone(),
            embedded: file,
        })));

        match existing {
            Some(names) => {
                let slot = self.slot(names)?;
                if let Some(DocObject::Names(tree)) = self.store.get_mut(slot) {
                    tree.embedded_files.push((name, spec));
                }
            },
            None => {
                let tree = NameTree {
                    embedded_files: vec![(name, spec)],
                };
                let names = ObjectStore::id_of(self.store.add(DocObject::Names(tree)));
                let catalog_slot = self.slot(self.catalog)?;
                match self.store.get_mut(catalog_slot) {
                    Some(DocObject::Catalog(catalog)) => catalog.names = Some(names),
                    Some(DocObject::Imported(obj)) => {
                        obj.dict = patch::set_dict_key(&obj.dict, "Names", &format!("{} 0 R", names))?;
                    },
                    _ => return Err(Error::AnchorNotFound("root")),
                }
            },
        }
        Ok(spec)
    }

    /// Set the document information dictionary, replacing any existing one.
    pub fn set_info(&mut self, info: DocumentInfo) -> Result<()> {
        match self.info.and_then(ObjectStore::slot_of) {
            Some(slot) if slot < self.store.len() => {
                self.store.replace(slot, DocObject::Info(info))?;
            },
            _ => {
                self.info = Some(ObjectStore::id_of(self.store.add(DocObject::Info(info))));
            },
        }
        Ok(())
    }

    /// Set `key` in the dictionary of the imported object in `slot`.
    pub fn set_object_key(&mut self, slot: usize, key: &str, value: &str) -> Result<()> {
        let len = self.store.len();
        match self.store.get(slot) {
            None => return Err(Error::OutOfRange { index: slot, len }),
            Some(DocObject::Imported(obj)) if obj.dict.trim_start().starts_with("<<") => {},
            Some(_) => {
                return Err(Error::InvalidPdf(format!(
                    "object {} is not an imported dictionary",
                    ObjectStore::id_of(slot)
                )))
            },
        }
        if let Some(DocObject::Imported(obj)) = self.store.get_mut(slot) {
            obj.dict = patch::set_dict_key(&obj.dict, key, value)?;
        }
        Ok(())
    }

    fn kids_of(&self, id: u32) -> Option<Vec<u32>> {
        match self.store.get_by_id(id)? {
            DocObject::Pages(tree) => Some(tree.kids.clone()),
            DocObject::Imported(obj)
                if parser::name(&obj.dict, "Type").as_deref() == Some("Pages")
                    || parser::get_value(&obj.dict, "Kids").is_some() =>
            {
                Some(parser::references(&obj.dict, "Kids"))
            },
            _ => None,
        }
    }

    fn page_tree(&self) -> PageTreeIndex {
        let mut index = PageTreeIndex::default();
        let mut visited = HashSet::new();
        let mut stack = vec![(self.pages, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if depth > self.options.max_page_depth || !visited.insert(node) {
                log::warn!("Skipping page tree node {} (cycle or too deep)", node);
                continue;
            }
            match self.kids_of(node) {
                Some(kids) => {
                    for &kid in kids.iter().rev() {
                        index.parents.insert(kid, node);
                        stack.push((kid, depth + 1));
                    }
                },
                None if self.store.get_by_id(node).is_some_and(|o| !o.is_null()) => index.pages.push(node),
                None => log::warn!("Page tree references missing object {}", node),
            }
        }
        index
    }

    /// Page ids in reading order.
    pub fn page_ids(&self) -> Vec<u32> {
        self.page_tree().pages
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.page_ids().len()
    }

    fn reference_text(&self, id: u32) -> String {
        let generation = self.store.get_by_id(id).map_or(0, DocObject::generation);
        format!("{} {} R", id, generation)
    }

    fn rewrite_kids(&mut self, node: u32, kids: &[u32], count_delta: i64) -> Result<()> {
        let kids_text = format!(
            "[{}]",
            kids.iter().map(|&k| self.reference_text(k)).collect::<Vec<_>>().join(" ")
        );
        let slot = self.slot(node)?;
        match self.store.get_mut(slot) {
            Some(DocObject::Pages(tree)) => tree.kids = kids.to_vec(),
            Some(DocObject::Imported(obj)) => {
                let count = parser::integer(&obj.dict, "Count").unwrap_or(kids.len() as i64 - count_delta);
                let dict = patch::set_dict_key(&obj.dict, "Kids", &kids_text)?;
                obj.dict = patch::set_dict_key(&dict, "Count", &(count + count_delta).max(0).to_string())?;
            },
            _ => return Err(Error::InvalidPdf(format!("object {} is not a page tree node", node))),
        }
        Ok(())
    }

    fn adjust_count(&mut self, node: u32, delta: i64) -> Result<()> {
        let slot = self.slot(node)?;
        if let Some(DocObject::Imported(obj)) = self.store.get(slot) {
            let count = parser::integer(&obj.dict, "Count").unwrap_or(0);
            let dict = patch::set_dict_key(&obj.dict, "Count", &(count + delta).max(0).to_string())?;
            if let Some(DocObject::Imported(obj)) = self.store.get_mut(slot) {
                obj.dict = dict;
            }
        }
        Ok(())
    }

    fn link_page(&mut self, page: u32) -> Result<()> {
        let mut kids = self
            .kids_of(self.pages)
            .ok_or_else(|| Error::InvalidPdf(format!("object {} is not a page tree node", self.pages)))?;
        kids.push(page);
        self.rewrite_kids(self.pages, &kids, 1)
    }

    /// Unlink the page at `index` from the page tree and return its id.
    ///
    /// The page object itself stays in the store until a
    /// [`GcMode::Compact`] pass finds it unreachable.
    pub fn delete_page(&mut self, index: usize) -> Result<u32> {
        let tree = self.page_tree();
        let page = *tree.pages.get(index).ok_or(Error::OutOfRange {
            index,
            len: tree.pages.len(),
        })?;
        let parent = tree
            .parents
            .get(&page)
            .copied()
            .ok_or_else(|| Error::InvalidPdf(format!("page {} has no parent", page)))?;

        let kids: Vec<u32> = self
            .kids_of(parent)
            .unwrap_or_default()
            .into_iter()
            .filter(|&k| k != page)
            .collect();
        self.rewrite_kids(parent, &kids, -1)?;

        let mut node = parent;
        while let Some(&up) = tree.parents.get(&node) {
            self.adjust_count(up, -1)?;
            node = up;
        }
        log::debug!("Deleted page {} (index {})", page, index);
        Ok(page)
    }

    /// Copy page `index` of `source`, with everything it references, into
    /// this document and append it to the page tree. Returns the new page slot.
    ///
    /// Inherited `/MediaBox` and `/Resources` are written onto the copy.
    /// References to other pages or page tree nodes are not followed; they
    /// become `0 0 R`, which readers resolve to null.
    pub fn import_page(&mut self, source: &ParsedDocument, index: usize) -> Result<usize> {
        let page = source.pages.get(index).ok_or(Error::OutOfRange {
            index,
            len: source.page_count(),
        })?;
        let raw = source.object(page.object).ok_or(Error::ObjectNotFound(page.object))?;

        let mut page_dict = patch::remove_dict_key(&raw.dict, "Parent")?;
        if parser::get_value(&page_dict, "MediaBox").is_none() {
            let media_box = ObjectSerializer::compact().serialize_to_string(&page.media_box.to_object());
            page_dict = patch::set_dict_key(&page_dict, "MediaBox", &media_box)?;
        }
        if let (None, Some(resources)) = (parser::get_value(&page_dict, "Resources"), &page.resources) {
            page_dict = patch::set_dict_key(&page_dict, "Resources", resources)?;
        }

        let mut order = vec![page.object];
        let mut seen: HashSet<u32> = HashSet::from([page.object]);
        let mut mapping: HashMap<u32, u32> = HashMap::new();
        let mut queue: VecDeque<u32> = lexer::collect_references(page_dict.as_bytes()).into();
        while let Some(number) = queue.pop_front() {
            if !seen.insert(number) {
                continue;
            }
            let Some(obj) = source.object(number) else {
                log::warn!("Imported page refers to missing object {}", number);
                mapping.insert(number, 0);
                continue;
            };
            if matches!(obj.type_name().as_deref(), Some("Page") | Some("Pages")) {
                mapping.insert(number, 0);
                continue;
            }
            order.push(number);
            queue.extend(lexer::collect_references(obj.dict.as_bytes()));
        }

        let first = ObjectStore::id_of(self.store.len());
        for (i, &number) in order.iter().enumerate() {
            mapping.insert(number, first + i as u32);
        }

        let mut page_slot = None;
        for &number in &order {
            let Some(obj) = source.object(number) else {
                continue;
            };
            let body = if number == page.object { &page_dict } else { &obj.dict };
            let mut dict = lexer::byte_text(&lexer::remap_references(&lexer::text_bytes(body), &mapping));
            if number == page.object {
                dict = patch::set_dict_key(&dict, "Parent", &self.reference_text(self.pages))?;
            }
            let slot = self.store.add(DocObject::Imported(ImportedObject {
                dict,
                stream: obj.stream.clone(),
                generation: 0,
                imported: true,
            }));
            if number == page.object {
                page_slot = Some(slot);
            }
        }
        let slot = page_slot.ok_or(Error::ObjectNotFound(page.object))?;

        self.link_page(ObjectStore::id_of(slot))?;
        log::info!(
            "Imported page {} as object {} with {} dependencies",
            page.object,
            ObjectStore::id_of(slot),
            order.len() - 1
        );
        Ok(slot)
    }

    /// Run a garbage-collection pass rooted at the catalog and Info
    /// dictionary; returns the number of objects tombstoned.
    pub fn garbage_collect(&mut self, mode: GcMode) -> usize {
        let roots: Vec<u32> = std::iter::once(self.catalog).chain(self.info).collect();
        gc::collect(&mut self.store, &roots, mode)
    }

    /// Total slots, tombstones included.
    pub fn object_count(&self) -> usize {
        self.store.object_count()
    }

    /// Slots that are not tombstones.
    pub fn live_object_count(&self) -> usize {
        self.store.live_count()
    }

    fn trailer_refs(&self) -> TrailerRefs {
        TrailerRefs::new(self.catalog)
            .with_info(self.info)
            .with_id(self.source.as_ref().and_then(|s| s.id.clone()))
    }

    /// Serialize the whole document.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let trailer = self.trailer_refs();
        DocumentWriter::new(self.config.clone()).write(&mut self.store, &trailer)
    }

    /// Write the whole document to `path`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    fn incremental_request(&self, touched: Option<Vec<usize>>) -> IncrementalRequest {
        let catalog_changed = ObjectStore::slot_of(self.catalog).is_some_and(|s| self.store.is_touched(s));
        IncrementalRequest {
            root: catalog_changed.then_some(self.catalog),
            info: self.info,
            touched,
            compress: self.config.compress,
            producer: self.config.producer.clone(),
        }
    }

    /// Original bytes followed by an update section holding the modified and
    /// new objects. `touched` overrides the tracked set of modified slots.
    ///
    /// # Errors
    ///
    /// [`Error::AnchorNotFound`]`("startxref")` for a document that was not
    /// opened from bytes, plus everything [`incremental::incremental_update`]
    /// reports.
    pub fn incremental_bytes(&mut self, touched: Option<Vec<usize>>) -> Result<Vec<u8>> {
        let request = self.incremental_request(touched);
        let original = self.source.as_ref().map_or(&[][..], |s| s.bytes.as_slice());
        incremental::incremental_update(original, &mut self.store, &request)
    }

    /// Write an incremental update to `path`.
    pub fn save_incremental(&mut self, path: impl AsRef<Path>, touched: Option<Vec<usize>>) -> Result<()> {
        let request = self.incremental_request(touched);
        let original = self.source.as_ref().map_or(&[][..], |s| s.bytes.as_slice());
        incremental::save_incremental(path, original, &mut self.store, &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AnnotationFlags;

    fn two_pages() -> Document {
        let mut doc = Document::with_config(WriterConfig::default().with_generate_id(false));
        let first = doc.add_page(MediaBox::LETTER).unwrap();
        doc.append_content(first, "0 0 m 100 100 l S").unwrap();
        doc.add_page(MediaBox::A4).unwrap();
        doc
    }

    #[test]
    fn test_new_document_layout() {
        let doc = Document::new();
        assert_eq!(doc.catalog_id(), 1);
        assert_eq!(doc.pages_id(), 2);
        assert_eq!(doc.page_count(), 0);
        assert_eq!(doc.object_count(), 2);
    }

    #[test]
    fn test_add_page_links_tree() {
        let doc = two_pages();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page_ids(), vec![4, 6]);
        match doc.object(3) {
            Some(DocObject::Page(page)) => {
                assert_eq!(page.parent, Some(2));
                assert_eq!(page.contents, vec![3]);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_append_content_requires_page() {
        let mut doc = two_pages();
        assert!(matches!(doc.append_content(0, "q"), Err(Error::InvalidPdf(_))));
        assert!(matches!(doc.append_content(99, "q"), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_delete_page_then_compact() {
        let mut doc = two_pages();
        let total = doc.object_count();
        assert_eq!(doc.delete_page(0).unwrap(), 4);
        assert_eq!(doc.page_count(), 1);

        let removed = doc.garbage_collect(GcMode::Compact);
        assert_eq!(removed, 2);
        assert_eq!(doc.object_count(), total);
        assert_eq!(doc.live_object_count(), total - removed);
        assert_eq!(doc.garbage_collect(GcMode::Compact), 0);
    }

    #[test]
    fn test_delete_page_out_of_range() {
        let mut doc = two_pages();
        assert!(matches!(doc.delete_page(2), Err(Error::OutOfRange { index: 2, len: 2 })));
    }

    #[test]
    fn test_info_survives_compact() {
        let mut doc = two_pages();
        doc.set_info(DocumentInfo::default().with_title("Report")).unwrap();
        assert_eq!(doc.garbage_collect(GcMode::Compact), 0);
        let text = String::from_utf8_lossy(&doc.to_bytes().unwrap()).into_owned();
        assert!(text.contains("/Title (Report)"));
        assert!(text.contains("/Producer (pdf_forge)"));
    }

    #[test]
    fn test_non_ascii_info_written_as_utf16() {
        let mut doc = Document::new();
        doc.set_info(DocumentInfo::default().with_title("Caf\u{e9}")).unwrap();
        let text = String::from_utf8_lossy(&doc.to_bytes().unwrap()).into_owned();
        assert!(text.contains("/Title <FEFF00430061006600E9>"));
    }

    #[test]
    fn test_set_info_replaces() {
        let mut doc = Document::new();
        doc.set_info(DocumentInfo::default().with_title("A")).unwrap();
        let id = doc.info_id();
        doc.set_info(DocumentInfo::default().with_title("B")).unwrap();
        assert_eq!(doc.info_id(), id);
        assert_eq!(doc.object_count(), 3);
    }

    #[test]
    fn test_annotation_and_font() {
        let mut doc = two_pages();
        let font = doc.add_font("Courier");
        doc.use_font(3, "F1", font).unwrap();
        let rect = MediaBox::new(10.0, 10.0, 50.0, 50.0);
        let annot = doc
            .add_annotation(3, Annotation::new("Text", rect).with_flags(AnnotationFlags::PRINT))
            .unwrap();
        match doc.object(3) {
            Some(DocObject::Page(page)) => {
                assert_eq!(page.fonts.get("F1"), Some(&font));
                assert_eq!(page.annots, vec![annot]);
            },
            other => panic!("unexpected {:?}", other),
        }
        assert!(doc.use_font(3, "F2", 999).is_err());
    }

    #[test]
    fn test_embed_file_creates_name_tree() {
        let mut doc = Document::new();
        let spec = doc.embed_file("data.csv", b"a,b\n1,2\n".to_vec()).unwrap();
        doc.embed_file("notes.txt", b"hi".to_vec()).unwrap();
        match doc.object(0) {
            Some(DocObject::Catalog(catalog)) => assert_eq!(catalog.names, Some(spec + 1)),
            other => panic!("unexpected {:?}", other),
        }
        let text = String::from_utf8_lossy(&doc.to_bytes().unwrap()).into_owned();
        assert!(text.contains("/EmbeddedFiles << /Names [(data.csv) 4 0 R (notes.txt) 7 0 R] >>"));
    }

    #[test]
    fn test_open_round_trip() {
        let mut doc = two_pages();
        let bytes = doc.to_bytes().unwrap();
        let opened = Document::open(&bytes).unwrap();
        assert_eq!(opened.page_count(), 2);
        assert_eq!(opened.object_count(), doc.object_count());
        assert!(opened.store().touched_slots().is_empty());
    }

    #[test]
    fn test_set_object_key_on_opened() {
        let mut doc = two_pages();
        let bytes = doc.to_bytes().unwrap();
        let mut opened = Document::open(&bytes).unwrap();
        opened.set_object_key(3, "Rotate", "90").unwrap();
        assert_eq!(opened.store().touched_slots(), vec![3]);
        assert!(matches!(opened.set_object_key(50, "A", "1"), Err(Error::OutOfRange { .. })));

        let mut fresh = Document::new();
        assert!(fresh.set_object_key(0, "A", "1").is_err());
    }

    #[test]
    fn test_delete_page_on_opened_document_updates_count() {
        let mut doc = two_pages();
        let bytes = doc.to_bytes().unwrap();
        let mut opened = Document::open(&bytes).unwrap();
        opened.delete_page(1).unwrap();
        match opened.object(1) {
            Some(DocObject::Imported(obj)) => {
                assert_eq!(parser::references(&obj.dict, "Kids"), vec![4]);
                assert_eq!(parser::integer(&obj.dict, "Count"), Some(1));
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_incremental_needs_source() {
        let mut doc = Document::new();
        assert!(matches!(
            doc.incremental_bytes(None),
            Err(Error::AnchorNotFound("startxref"))
        ));
    }

    #[test]
    fn test_open_rejects_huge_object_number() {
        let data = b"%PDF-1.4\n\
1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n\
1000000 0 obj\nnull\nendobj\n\
trailer\n<< /Size 3 /Root 1 0 R >>\n";
        assert!(matches!(Document::open(data), Err(Error::InvalidPdf(_))));

        let declared = String::from_utf8_lossy(data).replace("/Size 3", "/Size 1000001");
        assert!(matches!(Document::open(declared.as_bytes()), Err(Error::InvalidPdf(_))));
    }

    #[test]
    fn test_open_allows_sparse_numbers_within_size() {
        let data = b"%PDF-1.4\n\
1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n\
40 0 obj\nnull\nendobj\n\
trailer\n<< /Size 41 /Root 1 0 R >>\n";
        let doc = Document::open(data).unwrap();
        assert_eq!(doc.object_count(), 40);
        assert!(matches!(doc.object(20), Some(DocObject::Null)));
    }

    #[test]
    fn test_add_page_fails_without_page_tree() {
        let data = b"%PDF-1.4\n\
1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n(not a page tree)\nendobj\n\
trailer\n<< /Size 3 /Root 1 0 R >>\n";
        let mut doc = Document::open(data).unwrap();
        let pages = doc.page_count();
        assert!(matches!(doc.add_page(MediaBox::LETTER), Err(Error::InvalidPdf(_))));
        assert_eq!(doc.page_count(), pages);
        assert_eq!(doc.object_count(), 4);
        assert_eq!(doc.live_object_count(), 2);
    }
}
