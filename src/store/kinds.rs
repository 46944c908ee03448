//! The closed set of object kinds a document is built from.
//!
//! Every kind implements the same three-step protocol through
//! [`Serializable`]: `init` receives the per-pass [`DocumentContext`], `write`
//! emits the object body (the writer supplies `N G obj` / `endobj`), and
//! `type_tag` is a diagnostic label.

use super::{DocumentContext, Serializable};
use crate::buffer::GrowBuffer;
use crate::decoders;
use crate::editor::patch;
use crate::error::Result;
use crate::lexer;
use crate::object::{Object, ObjectRef};
use crate::parser;
use crate::writer::ObjectSerializer;
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;

/// A page rectangle `[llx lly urx ury]` in default user space units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaBox {
    /// Lower-left x
    pub llx: f64,
    /// Lower-left y
    pub lly: f64,
    /// Upper-right x
    pub urx: f64,
    /// Upper-right y
    pub ury: f64,
}

impl MediaBox {
    /// US Letter, the fallback for missing or malformed boxes.
    pub const LETTER: MediaBox = MediaBox::new(0.0, 0.0, 612.0, 792.0);

    /// ISO A4.
    pub const A4: MediaBox = MediaBox::new(0.0, 0.0, 595.28, 841.89);

    /// Create a box from its corners.
    pub const fn new(llx: f64, lly: f64, urx: f64, ury: f64) -> Self {
        Self { llx, lly, urx, ury }
    }

    /// Build from a four-number slice, `None` for any other length.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [llx, lly, urx, ury] => Some(Self::new(*llx, *lly, *urx, *ury)),
            _ => None,
        }
    }

    /// Width.
    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    /// Height.
    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }

    /// As a PDF array.
    pub fn to_object(&self) -> Object {
        ObjectSerializer::rect(self.llx, self.lly, self.urx, self.ury)
    }
}

impl Default for MediaBox {
    fn default() -> Self {
        Self::LETTER
    }
}

bitflags! {
    /// Annotation flags (`/F`), ISO 32000-1 Table 165.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AnnotationFlags: u32 {
        /// Bit 1: do not render unknown annotation types
        const INVISIBLE = 1 << 0;
        /// Bit 2: never display or print
        const HIDDEN = 1 << 1;
        /// Bit 3: print when the page is printed
        const PRINT = 1 << 2;
        /// Bit 4: do not scale with page zoom
        const NO_ZOOM = 1 << 3;
        /// Bit 5: do not rotate with the page
        const NO_ROTATE = 1 << 4;
        /// Bit 6: do not display on screen
        const NO_VIEW = 1 << 5;
        /// Bit 7: no user interaction
        const READ_ONLY = 1 << 6;
        /// Bit 8: cannot be deleted or moved
        const LOCKED = 1 << 7;
    }
}

/// Document catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    /// Page tree root
    pub pages: u32,
    /// Name dictionary (embedded files), if any
    pub names: Option<u32>,
}

/// Page tree root. Pages are kept flat under a single node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageTree {
    /// Page object ids, in reading order
    pub kids: Vec<u32>,
}

/// A single page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Parent page-tree node. Filled from the context when unset.
    pub parent: Option<u32>,
    /// Page boundaries
    pub media_box: MediaBox,
    /// Content stream ids, drawn in order
    pub contents: Vec<u32>,
    /// Font resources (`/F1` -> font id)
    pub fonts: IndexMap<String, u32>,
    /// XObject resources (`/Im1` -> image id)
    pub xobjects: IndexMap<String, u32>,
    /// Annotation ids
    pub annots: Vec<u32>,
}

impl Page {
    /// Empty page with the given box.
    pub fn new(media_box: MediaBox) -> Self {
        Self {
            parent: None,
            media_box,
            contents: Vec::new(),
            fonts: IndexMap::new(),
            xobjects: IndexMap::new(),
            annots: Vec::new(),
        }
    }
}

/// A content stream of queued operators.
///
/// Operators are flushed through the sink at write time; `/Length` is
/// back-patched once the payload size is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentStream {
    /// Operator lines, e.g. `"BT /F1 12 Tf 72 720 Td (Hi) Tj ET"`
    pub ops: Vec<String>,
    compress: bool,
}

impl ContentStream {
    /// Empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one operator line.
    pub fn push(&mut self, op: impl Into<String>) {
        self.ops.push(op.into());
    }

    /// Whether the last `init` asked for compression.
    pub fn is_compressed(&self) -> bool {
        self.compress
    }

    fn payload(&self) -> Vec<u8> {
        self.ops.join("\n").into_bytes()
    }
}

/// One of the standard 14 Type1 fonts; never embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Font {
    /// PostScript name, e.g. `Helvetica`
    pub base_font: String,
}

/// An image XObject with an opaque, already-encoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Width in samples
    pub width: u32,
    /// Height in samples
    pub height: u32,
    /// Color space name, e.g. `DeviceRGB`
    pub color_space: String,
    /// Bits per component
    pub bits_per_component: u8,
    /// Filter applied to `data`, e.g. `DCTDecode`
    pub filter: Option<String>,
    /// Encoded samples
    pub data: Vec<u8>,
}

/// A page annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Annotation subtype, e.g. `Text`, `Link`
    pub subtype: String,
    /// Placement rectangle
    pub rect: MediaBox,
    /// Text content
    pub contents: Option<String>,
    /// Behaviour flags
    pub flags: AnnotationFlags,
}

impl Annotation {
    /// Annotation of `subtype` covering `rect`, printable by default.
    pub fn new(subtype: impl Into<String>, rect: MediaBox) -> Self {
        Self {
            subtype: subtype.into(),
            rect,
            contents: None,
            flags: AnnotationFlags::PRINT,
        }
    }

    /// Set the text content.
    pub fn with_contents(mut self, contents: impl Into<String>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    /// Replace the flags.
    pub fn with_flags(mut self, flags: AnnotationFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Embedded file payload stream.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedFile {
    /// File contents
    pub data: Vec<u8>,
    /// MIME type written as `/Subtype`
    pub mime_type: Option<String>,
}

/// File specification pointing at an [`EmbeddedFile`].
#[derive(Debug, Clone, PartialEq)]
pub struct FileSpec {
    /// File name
    pub name: String,
    /// Id of the embedded file stream
    pub embedded: u32,
}

/// Name dictionary holding the embedded-files name tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameTree {
    /// `(name, filespec id)` pairs; sorted by name when written
    pub embedded_files: Vec<(String, u32)>,
}

/// Document information dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInfo {
    /// Title
    pub title: Option<String>,
    /// Author
    pub author: Option<String>,
    /// Subject
    pub subject: Option<String>,
    /// Keywords
    pub keywords: Option<String>,
    /// Creating application
    pub creator: Option<String>,
    /// Producing library
    pub producer: Option<String>,
    /// Creation time
    pub creation_date: Option<DateTime<Utc>>,
    /// Last modification time
    pub mod_date: Option<DateTime<Utc>>,
}

impl DocumentInfo {
    /// Info with both dates set to now.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            creation_date: Some(now),
            mod_date: Some(now),
            ..Self::default()
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// PDF date string `D:YYYYMMDDHHmmSSZ`.
pub fn pdf_date(date: &DateTime<Utc>) -> String {
    date.format("D:%Y%m%d%H%M%SZ").to_string()
}

/// An object taken verbatim from parsed bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedObject {
    /// Dictionary (or other value) text
    pub dict: String,
    /// Raw stream bytes, if the object is a stream
    pub stream: Option<Vec<u8>>,
    /// Generation number carried over from the source
    pub generation: u16,
    /// Copied in from another document (eligible for Dedup)
    pub imported: bool,
}

/// The closed sum type of everything a store can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum DocObject {
    /// Document catalog
    Catalog(Catalog),
    /// Page tree root
    Pages(PageTree),
    /// Page
    Page(Page),
    /// Content stream
    Content(ContentStream),
    /// Standard Type1 font
    Font(Font),
    /// Image XObject
    Image(Image),
    /// Annotation
    Annotation(Annotation),
    /// Embedded file stream
    EmbeddedFile(EmbeddedFile),
    /// File specification
    FileSpec(FileSpec),
    /// Name dictionary
    Names(NameTree),
    /// Information dictionary
    Info(DocumentInfo),
    /// Arbitrary value
    Raw(Object),
    /// Verbatim object from parsed bytes
    Imported(ImportedObject),
    /// Freed slot
    Null,
}

fn reference(id: u32) -> Object {
    ObjectSerializer::reference(id)
}

fn text(s: &str) -> Object {
    ObjectSerializer::string(s)
}

fn remap(id: &mut u32, mapping: &HashMap<u32, u32>) {
    if let Some(&new_id) = mapping.get(id) {
        *id = new_id;
    }
}

impl DocObject {
    /// Whether this slot is a tombstone.
    pub fn is_null(&self) -> bool {
        matches!(self, DocObject::Null)
    }

    /// Generation number written in the object header and xref.
    pub fn generation(&self) -> u16 {
        match self {
            DocObject::Imported(obj) => obj.generation,
            _ => 0,
        }
    }

    /// Whether this is an object copied in from another document.
    pub fn is_imported(&self) -> bool {
        matches!(self, DocObject::Imported(ImportedObject { imported: true, .. }))
    }

    /// Whether this is a page or an intermediate page tree node. Two such
    /// nodes are never interchangeable even when their bodies match.
    pub fn is_page_tree_node(&self) -> bool {
        match self {
            DocObject::Page(_) | DocObject::Pages(_) => true,
            DocObject::Imported(obj) => {
                matches!(parser::name(&obj.dict, "Type").as_deref(), Some("Page" | "Pages"))
            },
            _ => false,
        }
    }

    /// Ids of every object this one refers to.
    pub fn references(&self) -> Vec<u32> {
        match self {
            DocObject::Catalog(c) => std::iter::once(c.pages).chain(c.names).collect(),
            DocObject::Pages(p) => p.kids.clone(),
            DocObject::Page(p) => p
                .parent
                .into_iter()
                .chain(p.contents.iter().copied())
                .chain(p.fonts.values().copied())
                .chain(p.xobjects.values().copied())
                .chain(p.annots.iter().copied())
                .collect(),
            DocObject::FileSpec(f) => vec![f.embedded],
            DocObject::Names(n) => n.embedded_files.iter().map(|(_, id)| *id).collect(),
            DocObject::Raw(obj) => obj.references(),
            DocObject::Imported(obj) => lexer::collect_references(obj.dict.as_bytes()),
            DocObject::Content(_)
            | DocObject::Font(_)
            | DocObject::Image(_)
            | DocObject::Annotation(_)
            | DocObject::EmbeddedFile(_)
            | DocObject::Info(_)
            | DocObject::Null => Vec::new(),
        }
    }

    /// Rewrite outgoing references (old id -> new id).
    pub fn remap_references(&mut self, mapping: &HashMap<u32, u32>) {
        match self {
            DocObject::Catalog(c) => {
                remap(&mut c.pages, mapping);
                if let Some(names) = c.names.as_mut() {
                    remap(names, mapping);
                }
            },
            DocObject::Pages(p) => p.kids.iter_mut().for_each(|id| remap(id, mapping)),
            DocObject::Page(p) => {
                if let Some(parent) = p.parent.as_mut() {
                    remap(parent, mapping);
                }
                p.contents.iter_mut().for_each(|id| remap(id, mapping));
                p.fonts.values_mut().for_each(|id| remap(id, mapping));
                p.xobjects.values_mut().for_each(|id| remap(id, mapping));
                p.annots.iter_mut().for_each(|id| remap(id, mapping));
            },
            DocObject::FileSpec(f) => remap(&mut f.embedded, mapping),
            DocObject::Names(n) => n.embedded_files.iter_mut().for_each(|(_, id)| remap(id, mapping)),
            DocObject::Raw(obj) => obj.remap_references(mapping),
            DocObject::Imported(obj) => {
                let remapped = lexer::remap_references(&lexer::text_bytes(&obj.dict), mapping);
                obj.dict = lexer::byte_text(&remapped);
            },
            _ => {},
        }
    }

    /// The body as bytes, for comparison and hashing.
    pub fn to_body_bytes(&self, id: u32) -> Result<Vec<u8>> {
        let mut sink = GrowBuffer::new();
        self.write(&mut sink, id)?;
        Ok(sink.into_vec())
    }

    fn write_value(sink: &mut GrowBuffer, value: &Object) -> Result<()> {
        ObjectSerializer::compact().write_object(sink, value)?;
        Ok(())
    }

    fn write_stream(sink: &mut GrowBuffer, dict: Vec<(&str, Object)>, data: &[u8]) -> Result<()> {
        let mut entries = dict;
        entries.push(("Length", ObjectSerializer::integer(data.len() as i64)));
        Self::write_value(sink, &ObjectSerializer::dict(entries))?;
        sink.write_str("\nstream\n");
        sink.write(data);
        sink.write_str("\nendstream");
        Ok(())
    }

    fn write_content(content: &ContentStream, sink: &mut GrowBuffer) -> Result<()> {
        let raw = content.payload();
        let data = if content.compress {
            decoders::encode_flate(&raw)?
        } else {
            raw
        };

        sink.write_str("<< /Length ");
        let length_at = sink.position();
        sink.write_str("          ");
        if content.compress {
            sink.write_str(" /Filter /FlateDecode");
        }
        sink.write_str(" >>\nstream\n");
        let start = sink.position();
        sink.write(&data);
        let length = sink.position() - start;
        sink.write_str("\nendstream");

        sink.patch_at(length_at, length.to_string().as_bytes())
    }

    fn write_imported(obj: &ImportedObject, sink: &mut GrowBuffer) -> Result<()> {
        match &obj.stream {
            None => sink.write(&lexer::text_bytes(&obj.dict)),
            Some(data) => {
                let dict = patch::set_dict_key(&obj.dict, "Length", &data.len().to_string())?;
                sink.write(&lexer::text_bytes(&dict));
                sink.write_str("\nstream\n");
                sink.write(data);
                sink.write_str("\nendstream");
            },
        }
        Ok(())
    }

    fn info_object(info: &DocumentInfo) -> Object {
        let mut entries = Vec::new();
        let fields = [
            ("Title", &info.title),
            ("Author", &info.author),
            ("Subject", &info.subject),
            ("Keywords", &info.keywords),
            ("Creator", &info.creator),
            ("Producer", &info.producer),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                entries.push((key, text(value)));
            }
        }
        if let Some(date) = &info.creation_date {
            entries.push(("CreationDate", text(&pdf_date(date))));
        }
        if let Some(date) = &info.mod_date {
            entries.push(("ModDate", text(&pdf_date(date))));
        }
        ObjectSerializer::dict(entries)
    }

    fn page_object(page: &Page) -> Object {
        let mut entries = vec![
            ("Type", ObjectSerializer::name("Page")),
            ("MediaBox", page.media_box.to_object()),
        ];
        if let Some(parent) = page.parent {
            entries.push(("Parent", reference(parent)));
        }
        match page.contents.as_slice() {
            [] => {},
            [single] => entries.push(("Contents", reference(*single))),
            many => entries.push(("Contents", ObjectSerializer::references(many))),
        }

        let mut resources: HashMap<String, Object> = HashMap::new();
        if !page.fonts.is_empty() {
            let fonts = page
                .fonts
                .iter()
                .map(|(name, id)| (name.clone(), reference(*id)))
                .collect();
            resources.insert("Font".to_string(), Object::Dictionary(fonts));
        }
        if !page.xobjects.is_empty() {
            let xobjects = page
                .xobjects
                .iter()
                .map(|(name, id)| (name.clone(), reference(*id)))
                .collect();
            resources.insert("XObject".to_string(), Object::Dictionary(xobjects));
        }
        entries.push(("Resources", Object::Dictionary(resources)));

        if !page.annots.is_empty() {
            entries.push(("Annots", ObjectSerializer::references(&page.annots)));
        }
        ObjectSerializer::dict(entries)
    }
}

impl Serializable for DocObject {
    fn init(&mut self, ctx: &DocumentContext) {
        match self {
            DocObject::Content(content) => content.compress = ctx.compress,
            DocObject::Page(page) if page.parent.is_none() => page.parent = ctx.pages_id,
            DocObject::Info(info) if info.producer.is_none() => {
                info.producer = ctx.producer.clone();
            },
            _ => {},
        }
    }

    fn type_tag(&self) -> &'static str {
        match self {
            DocObject::Catalog(_) => "Catalog",
            DocObject::Pages(_) => "Pages",
            DocObject::Page(_) => "Page",
            DocObject::Content(_) => "Content",
            DocObject::Font(_) => "Font",
            DocObject::Image(_) => "Image",
            DocObject::Annotation(_) => "Annotation",
            DocObject::EmbeddedFile(_) => "EmbeddedFile",
            DocObject::FileSpec(_) => "FileSpec",
            DocObject::Names(_) => "Names",
            DocObject::Info(_) => "Info",
            DocObject::Raw(_) => "Raw",
            DocObject::Imported(_) => "Imported",
            DocObject::Null => "Null",
        }
    }

    fn write(&self, sink: &mut GrowBuffer, _id: u32) -> Result<()> {
        match self {
            DocObject::Catalog(catalog) => {
                let mut entries = vec![
                    ("Type", ObjectSerializer::name("Catalog")),
                    ("Pages", reference(catalog.pages)),
                ];
                if let Some(names) = catalog.names {
                    entries.push(("Names", reference(names)));
                }
                Self::write_value(sink, &ObjectSerializer::dict(entries))
            },
            DocObject::Pages(tree) => Self::write_value(
                sink,
                &ObjectSerializer::dict(vec![
                    ("Type", ObjectSerializer::name("Pages")),
                    ("Kids", ObjectSerializer::references(&tree.kids)),
                    ("Count", ObjectSerializer::integer(tree.kids.len() as i64)),
                ]),
            ),
            DocObject::Page(page) => Self::write_value(sink, &Self::page_object(page)),
            DocObject::Content(content) => Self::write_content(content, sink),
            DocObject::Font(font) => Self::write_value(
                sink,
                &ObjectSerializer::dict(vec![
                    ("Type", ObjectSerializer::name("Font")),
                    ("Subtype", ObjectSerializer::name("Type1")),
                    ("BaseFont", ObjectSerializer::name(&font.base_font)),
                    ("Encoding", ObjectSerializer::name("WinAnsiEncoding")),
                ]),
            ),
            DocObject::Image(image) => {
                let mut dict = vec![
                    ("Type", ObjectSerializer::name("XObject")),
                    ("Subtype", ObjectSerializer::name("Image")),
                    ("Width", ObjectSerializer::integer(image.width as i64)),
                    ("Height", ObjectSerializer::integer(image.height as i64)),
                    ("ColorSpace", ObjectSerializer::name(&image.color_space)),
                    ("BitsPerComponent", ObjectSerializer::integer(image.bits_per_component as i64)),
                ];
                if let Some(filter) = &image.filter {
                    dict.push(("Filter", ObjectSerializer::name(filter)));
                }
                Self::write_stream(sink, dict, &image.data)
            },
            DocObject::Annotation(annot) => {
                let mut entries = vec![
                    ("Type", ObjectSerializer::name("Annot")),
                    ("Subtype", ObjectSerializer::name(&annot.subtype)),
                    ("Rect", annot.rect.to_object()),
                    ("F", ObjectSerializer::integer(annot.flags.bits() as i64)),
                ];
                if let Some(contents) = &annot.contents {
                    entries.push(("Contents", text(contents)));
                }
                Self::write_value(sink, &ObjectSerializer::dict(entries))
            },
            DocObject::EmbeddedFile(file) => {
                let mut dict = vec![
                    ("Type", ObjectSerializer::name("EmbeddedFile")),
                    (
                        "Params",
                        ObjectSerializer::dict(vec![(
                            "Size",
                            ObjectSerializer::integer(file.data.len() as i64),
                        )]),
                    ),
                ];
                if let Some(mime) = &file.mime_type {
                    dict.push(("Subtype", ObjectSerializer::name(mime)));
                }
                Self::write_stream(sink, dict, &file.data)
            },
            DocObject::FileSpec(spec) => Self::write_value(
                sink,
                &ObjectSerializer::dict(vec![
                    ("Type", ObjectSerializer::name("Filespec")),
                    ("F", text(&spec.name)),
                    ("UF", text(&spec.name)),
                    ("EF", ObjectSerializer::dict(vec![("F", reference(spec.embedded))])),
                ]),
            ),
            DocObject::Names(tree) => {
                let mut sorted = tree.embedded_files.clone();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                let names = sorted
                    .iter()
                    .flat_map(|(name, id)| [text(name), reference(*id)])
                    .collect();
                Self::write_value(
                    sink,
                    &ObjectSerializer::dict(vec![(
                        "EmbeddedFiles",
                        ObjectSerializer::dict(vec![("Names", Object::Array(names))]),
                    )]),
                )
            },
            DocObject::Info(info) => Self::write_value(sink, &Self::info_object(info)),
            DocObject::Raw(value) => Self::write_value(sink, value),
            DocObject::Imported(obj) => Self::write_imported(obj, sink),
            DocObject::Null => {
                sink.write_str("null");
                Ok(())
            },
        }
    }
}

impl From<Object> for DocObject {
    fn from(value: Object) -> Self {
        DocObject::Raw(value)
    }
}

impl From<ObjectRef> for DocObject {
    fn from(value: ObjectRef) -> Self {
        DocObject::Raw(Object::Reference(value))
    }
}
