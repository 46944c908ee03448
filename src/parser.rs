//! Tolerant raw-byte parser.
//!
//! Objects are located by forward-scanning for `N G obj` markers rather than
//! by trusting the embedded cross-reference table, which third-party files
//! commonly get wrong. Scanning is sequential: once an object is found, the
//! scan resumes after its `endobj`, so markers inside stream data are never
//! mistaken for objects. A later definition of the same number replaces an
//! earlier one, which is how incremental updates override objects.
//!
//! Dictionaries are kept as text; fields are pulled out on demand with the
//! scanners in [`crate::lexer`], falling back to documented defaults where a
//! safe one exists (a missing media box is US Letter).

use crate::config::ParserOptions;
use crate::decoders;
use crate::error::{Error, Result};
use crate::lexer;
use crate::store::MediaBox;
use crate::xref;
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

lazy_static! {
    /// Regex for finding "N G obj" markers
    static ref RE_OBJ_HEADER: Regex = Regex::new(r"(?-u)(\d+)\s+(\d+)\s+obj\b").unwrap();
}

/// Byte layout of a stream inside an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpan {
    /// Start of the `stream` keyword
    pub keyword: usize,
    /// Stream payload
    pub data: Range<usize>,
    /// End of the `endstream` keyword
    pub end: usize,
}

/// Byte layout of one indirect object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSpan {
    /// Object number
    pub number: u32,
    /// Generation number
    pub generation: u16,
    /// Start of the `N G obj` header
    pub offset: usize,
    /// Body between the header and `endobj`
    pub body: Range<usize>,
    /// The value (dictionary or other) without the stream part
    pub value: Range<usize>,
    /// Stream, if any
    pub stream: Option<StreamSpan>,
    /// End of the `endobj` keyword
    pub end: usize,
}

/// An object header whose body could not be delimited.
#[derive(Debug)]
pub struct ScanFailure {
    /// Object number from the header
    pub number: u32,
    /// Start of the header
    pub offset: usize,
    /// What went wrong
    pub error: Error,
}

/// Result of scanning one object header.
pub type Scanned = std::result::Result<ObjectSpan, ScanFailure>;

/// Position and numbers of the next object header at or after `from`.
fn next_header(bytes: &[u8], from: usize, limit: usize) -> Option<(usize, usize, u32, u16)> {
    let haystack = &bytes[..limit.min(bytes.len())];
    let mut pos = from;
    while pos < haystack.len() {
        let caps = RE_OBJ_HEADER.captures_at(haystack, pos)?;
        let whole = caps.get(0)?;
        let at = whole.start();
        if at > 0 && lexer::is_regular(haystack[at - 1]) {
            pos = at + 1;
            continue;
        }
        let number = parse_digits::<u32>(caps.get(1)?.as_bytes());
        let generation = parse_digits::<u16>(caps.get(2)?.as_bytes());
        match (number, generation) {
            (Some(number), Some(generation)) => return Some((at, whole.end(), number, generation)),
            _ => {
                log::warn!("Unparseable object header at offset {}", at);
                pos = whole.end();
            },
        }
    }
    None
}

fn parse_digits<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Skip the end-of-line that follows the `stream` keyword.
fn skip_stream_eol(bytes: &[u8], pos: usize) -> usize {
    match (bytes.get(pos), bytes.get(pos + 1)) {
        (Some(b'\r'), Some(b'\n')) => pos + 2,
        (Some(b'\r'), _) | (Some(b'\n'), _) => pos + 1,
        _ => pos,
    }
}

/// Trim one trailing end-of-line from a physically delimited payload.
fn trim_one_eol(bytes: &[u8], start: usize, end: usize) -> usize {
    if end >= start + 2 && &bytes[end - 2..end] == b"\r\n" {
        end - 2
    } else if end > start && (bytes[end - 1] == b'\n' || bytes[end - 1] == b'\r') {
        end - 1
    } else {
        end
    }
}

/// Declared `/Length` when it is a direct integer.
fn declared_length(dict: &[u8]) -> Option<usize> {
    let (_, vs, ve) = lexer::key_value_span(dict, "Length").ok()??;
    let text = std::str::from_utf8(&dict[vs..ve]).ok()?;
    text.trim().parse().ok()
}

fn delimit_stream(bytes: &[u8], number: u32, dict: &[u8], keyword: usize) -> Result<StreamSpan> {
    let data_start = skip_stream_eol(bytes, keyword + b"stream".len());

    if let Some(len) = declared_length(dict) {
        let data_end = data_start + len;
        if data_end <= bytes.len() {
            let after = lexer::skip_blanks(bytes, data_end);
            if bytes[after..].starts_with(b"endstream") {
                return Ok(StreamSpan {
                    keyword,
                    data: data_start..data_end,
                    end: after + b"endstream".len(),
                });
            }
        }
    }

    let endstream = lexer::find(bytes, b"endstream", data_start).ok_or(Error::StreamUnterminated(number))?;
    let data_end = trim_one_eol(bytes, data_start, endstream);
    match declared_length(dict) {
        Some(len) if len != data_end - data_start => log::warn!(
            "Object {}: declared /Length {} disagrees with physical length {}; using physical",
            number,
            len,
            data_end - data_start
        ),
        None => log::debug!("Object {}: no direct /Length, using physical length", number),
        _ => {},
    }
    Ok(StreamSpan {
        keyword,
        data: data_start..data_end,
        end: endstream + b"endstream".len(),
    })
}

/// Delimit the body of the object whose header ends at `body_start`.
fn delimit_object(
    bytes: &[u8],
    number: u32,
    body_start: usize,
    next_header_at: Option<usize>,
) -> Result<(Range<usize>, Option<StreamSpan>, usize, usize)> {
    let value_start = lexer::skip_ws(bytes, body_start);
    let is_dict = bytes[value_start..].starts_with(b"<<");

    if is_dict {
        let dict_end = lexer::dict_end(bytes, value_start)?;
        let after_dict = lexer::skip_ws(bytes, dict_end);
        if bytes[after_dict..].starts_with(b"stream")
            && lexer::find_keyword(bytes, b"stream", after_dict) == Some(after_dict)
        {
            let dict = &bytes[value_start..dict_end];
            let stream = delimit_stream(bytes, number, dict, after_dict)?;
            let endobj = lexer::find_keyword(bytes, b"endobj", stream.end).ok_or(Error::MissingEndobj(number))?;
            if next_header_at.is_some_and(|next| next < endobj && next > stream.end) {
                return Err(Error::MissingEndobj(number));
            }
            return Ok((value_start..dict_end, Some(stream), endobj, endobj + b"endobj".len()));
        }
    }

    let endobj = lexer::find_keyword(bytes, b"endobj", value_start).ok_or(Error::MissingEndobj(number))?;
    if next_header_at.is_some_and(|next| next < endobj) {
        return Err(Error::MissingEndobj(number));
    }
    let mut value_end = endobj;
    while value_end > value_start && lexer::is_whitespace(bytes[value_end - 1]) {
        value_end -= 1;
    }
    Ok((value_start..value_end, None, endobj, endobj + b"endobj".len()))
}

/// Scan every object header before `limit`, in file order.
///
/// Failures are reported per object and the scan carries on after the
/// failed header.
pub fn scan_objects(bytes: &[u8], limit: usize) -> Vec<Scanned> {
    let limit = limit.min(bytes.len());
    let mut results = Vec::new();
    let mut pos = 0;

    while let Some((offset, body_start, number, generation)) = next_header(bytes, pos, limit) {
        let next = next_header(bytes, body_start, limit).map(|(at, _, _, _)| at);
        match delimit_object(bytes, number, body_start, next) {
            Ok((value, stream, endobj, end)) => {
                results.push(Ok(ObjectSpan {
                    number,
                    generation,
                    offset,
                    body: body_start..endobj,
                    value,
                    stream,
                    end,
                }));
                pos = end;
            },
            Err(error) => {
                results.push(Err(ScanFailure {
                    number,
                    offset,
                    error,
                }));
                pos = body_start;
            },
        }
    }
    results
}

/// Locate the last definition of object `number`.
///
/// # Errors
///
/// [`Error::ObjectNotFound`] if no header carries that number; otherwise the
/// delimiting error of the last definition (`StreamUnterminated`,
/// `MissingEndobj`, `UnbalancedDelimiter`).
pub fn find_object(bytes: &[u8], number: u32) -> Result<ObjectSpan> {
    scan_objects(bytes, bytes.len())
        .into_iter()
        .filter(|s| match s {
            Ok(span) => span.number == number,
            Err(failure) => failure.number == number,
        })
        .last()
        .ok_or(Error::ObjectNotFound(number))?
        .map_err(|failure| failure.error)
}

/// Highest object number named by any header in the buffer.
pub fn max_object_number(bytes: &[u8]) -> u32 {
    RE_OBJ_HEADER
        .captures_iter(bytes)
        .filter_map(|caps| parse_digits::<u32>(caps.get(1)?.as_bytes()))
        .max()
        .unwrap_or(0)
}

/// An object as found in the source bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    /// Object number
    pub number: u32,
    /// Generation number
    pub generation: u16,
    /// Dictionary (or other value) text
    pub dict: String,
    /// Raw (still encoded) stream payload
    pub stream: Option<Vec<u8>>,
    /// Byte offset of the header
    pub offset: usize,
    /// Byte length from header through `endobj`
    pub length: usize,
}

impl RawObject {
    fn from_span(bytes: &[u8], span: &ObjectSpan) -> Self {
        Self {
            number: span.number,
            generation: span.generation,
            dict: lexer::byte_text(&bytes[span.value.clone()]),
            stream: span.stream.as_ref().map(|s| bytes[s.data.clone()].to_vec()),
            offset: span.offset,
            length: span.end - span.offset,
        }
    }

    /// `/Type` name, if any.
    pub fn type_name(&self) -> Option<String> {
        name(&self.dict, "Type")
    }
}

/// Trailer fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trailer {
    /// Catalog object number
    pub root: u32,
    /// `/Size`
    pub size: Option<u32>,
    /// `/Prev`
    pub prev: Option<u64>,
    /// Information dictionary
    pub info: Option<u32>,
    /// Whether an `/Encrypt` entry is present
    pub encrypted: bool,
    /// Value of the last `startxref`
    pub startxref: Option<u64>,
    /// `/ID` value text
    pub id: Option<String>,
    /// The trailer dictionary text (empty when recovered from the catalog)
    pub dict: String,
}

/// A page from the page tree, with inherited attributes applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    /// Page object number
    pub object: u32,
    /// Own or inherited media box, Letter if none
    pub media_box: MediaBox,
    /// Own or inherited `/Resources` value text
    pub resources: Option<String>,
    /// Content stream object numbers, in drawing order
    pub contents: Vec<u32>,
}

/// Index of an existing document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    /// Header version, e.g. `1.7`
    pub version: Option<String>,
    /// Objects by number (last definition wins)
    pub objects: BTreeMap<u32, RawObject>,
    /// Trailer fields
    pub trailer: Trailer,
    /// Pages in reading order
    pub pages: Vec<ParsedPage>,
    options: ParserOptions,
}

impl ParsedDocument {
    /// Object by number.
    pub fn object(&self, number: u32) -> Option<&RawObject> {
        self.objects.get(&number)
    }

    /// Number of pages found in the page tree.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// The document catalog.
    pub fn catalog(&self) -> Option<&RawObject> {
        self.objects.get(&self.trailer.root)
    }

    /// Highest object number present.
    pub fn max_object_number(&self) -> u32 {
        self.objects.keys().next_back().copied().unwrap_or(0)
    }

    /// Decoded stream payload of object `number`.
    pub fn decode_stream(&self, number: u32) -> Result<Vec<u8>> {
        let raw = self.object(number).ok_or(Error::ObjectNotFound(number))?;
        decode_stream_with_limit(raw, self.options.max_decompressed_size)
    }
}

/// Parse with lenient options.
pub fn parse(bytes: &[u8]) -> Result<ParsedDocument> {
    parse_with_options(bytes, &ParserOptions::default())
}

/// Parse `bytes` into a [`ParsedDocument`].
///
/// # Errors
///
/// - [`Error::AnchorNotFound`]`("root")` if neither a trailer `/Root` nor a
///   `/Type /Catalog` object exists
/// - [`Error::Unsupported`] for cross-reference streams without a classic
///   trailer, and for encrypted documents
/// - In strict mode, the first object that cannot be delimited
pub fn parse_with_options(bytes: &[u8], options: &ParserOptions) -> Result<ParsedDocument> {
    let mut objects = BTreeMap::new();
    for scanned in scan_objects(bytes, bytes.len()) {
        match scanned {
            Ok(span) => {
                objects.insert(span.number, RawObject::from_span(bytes, &span));
            },
            Err(failure) if options.strict => return Err(failure.error),
            Err(failure) => log::warn!(
                "Skipping object {} at offset {}: {}",
                failure.number,
                failure.offset,
                failure.error
            ),
        }
    }
    log::debug!("Scanned {} objects", objects.len());

    let trailer = trailer_from(bytes, &objects)?;
    let pages = collect_pages(&objects, trailer.root, options);

    Ok(ParsedDocument {
        version: header_version(bytes),
        objects,
        trailer,
        pages,
        options: *options,
    })
}

fn header_version(bytes: &[u8]) -> Option<String> {
    let at = lexer::find(bytes, b"%PDF-", 0)?;
    let start = at + b"%PDF-".len();
    let end = bytes[start..]
        .iter()
        .position(|b| !(b.is_ascii_digit() || *b == b'.'))
        .map_or(bytes.len(), |p| start + p);
    (end > start).then(|| String::from_utf8_lossy(&bytes[start..end]).into_owned())
}

/// Text of the last `trailer` dictionary.
fn last_trailer_dict(bytes: &[u8]) -> Option<String> {
    let at = lexer::rfind_keyword(bytes, b"trailer", bytes.len())?;
    let start = lexer::skip_ws(bytes, at + b"trailer".len());
    if !bytes[start..].starts_with(b"<<") {
        return None;
    }
    let end = lexer::dict_end(bytes, start).ok()?;
    Some(lexer::byte_text(&bytes[start..end]))
}

fn catalog_number<'a>(mut objects: impl Iterator<Item = (u32, &'a str)>) -> Option<u32> {
    objects.find_map(|(number, dict)| (name(dict, "Type").as_deref() == Some("Catalog")).then_some(number))
}

/// Read the trailer without building a full object index unless the
/// catalog has to be recovered.
pub fn parse_trailer(bytes: &[u8]) -> Result<Trailer> {
    trailer_with(bytes, || {
        let scanned = scan_objects(bytes, bytes.len());
        let dicts: Vec<(u32, String)> = scanned
            .into_iter()
            .flatten()
            .map(|span| (span.number, lexer::byte_text(&bytes[span.value])))
            .collect();
        catalog_number(dicts.iter().rev().map(|(n, d)| (*n, d.as_str())))
    })
}

fn trailer_from(bytes: &[u8], objects: &BTreeMap<u32, RawObject>) -> Result<Trailer> {
    trailer_with(bytes, || catalog_number(objects.values().map(|o| (o.number, o.dict.as_str()))))
}

fn trailer_with(bytes: &[u8], find_catalog: impl FnOnce() -> Option<u32>) -> Result<Trailer> {
    let startxref = xref::find_startxref(bytes).ok();
    let dict = last_trailer_dict(bytes);

    if dict.is_none() {
        if let Some(offset) = startxref {
            if xref::is_xref_stream_at(bytes, offset) {
                return Err(Error::Unsupported("cross-reference streams".to_string()));
            }
        }
    }

    let dict = dict.unwrap_or_default();
    let mut trailer = Trailer {
        root: 0,
        size: integer(&dict, "Size").and_then(|n| u32::try_from(n).ok()),
        prev: integer(&dict, "Prev").and_then(|n| u64::try_from(n).ok()),
        info: reference(&dict, "Info"),
        encrypted: lexer::find_key(dict.as_bytes(), "Encrypt").is_some(),
        startxref,
        id: get_value(&dict, "ID"),
        dict,
    };

    if trailer.encrypted {
        return Err(Error::Unsupported("encrypted documents".to_string()));
    }

    trailer.root = match reference(&trailer.dict, "Root") {
        Some(root) => root,
        None => {
            log::warn!("Trailer has no /Root; searching for a /Type /Catalog object");
            find_catalog().ok_or(Error::AnchorNotFound("root"))?
        },
    };
    Ok(trailer)
}

fn collect_pages(objects: &BTreeMap<u32, RawObject>, root: u32, options: &ParserOptions) -> Vec<ParsedPage> {
    let mut pages = Vec::new();
    let Some(tree) = objects.get(&root).and_then(|catalog| reference(&catalog.dict, "Pages")) else {
        log::warn!("Catalog {} has no /Pages", root);
        return pages;
    };

    let mut visited = HashSet::new();
    walk_page_tree(
        objects,
        tree,
        Inherited::default(),
        0,
        options.max_page_depth,
        &mut visited,
        &mut pages,
    );
    pages
}

#[derive(Debug, Clone, Default)]
struct Inherited {
    media_box: Option<MediaBox>,
    resources: Option<String>,
}

fn walk_page_tree(
    objects: &BTreeMap<u32, RawObject>,
    node: u32,
    inherited: Inherited,
    depth: usize,
    max_depth: usize,
    visited: &mut HashSet<u32>,
    pages: &mut Vec<ParsedPage>,
) {
    if depth > max_depth {
        log::warn!("Page tree deeper than {}; ignoring node {}", max_depth, node);
        return;
    }
    if !visited.insert(node) {
        log::warn!("Page tree cycle at object {}", node);
        return;
    }
    let Some(obj) = objects.get(&node) else {
        log::warn!("Page tree references missing object {}", node);
        return;
    };

    let here = Inherited {
        media_box: resolved_media_box(objects, &obj.dict).or(inherited.media_box),
        resources: get_value(&obj.dict, "Resources").or(inherited.resources),
    };

    let kids = references(&obj.dict, "Kids");
    let is_node = obj.type_name().as_deref() == Some("Pages") || !kids.is_empty();
    if is_node {
        for kid in kids {
            walk_page_tree(objects, kid, here.clone(), depth + 1, max_depth, visited, pages);
        }
        return;
    }

    pages.push(ParsedPage {
        object: node,
        media_box: here.media_box.unwrap_or_default(),
        resources: here.resources,
        contents: content_references(objects, &obj.dict),
    });
}

/// `/Contents` may be a reference to an array object.
fn content_references(objects: &BTreeMap<u32, RawObject>, dict: &str) -> Vec<u32> {
    let refs = references(dict, "Contents");
    if let [single] = refs.as_slice() {
        if let Some(target) = objects.get(single) {
            if target.stream.is_none() && target.dict.trim_start().starts_with('[') {
                return lexer::collect_references(target.dict.as_bytes());
            }
        }
    }
    refs
}

fn resolved_media_box(objects: &BTreeMap<u32, RawObject>, dict: &str) -> Option<MediaBox> {
    let value = get_value(dict, "MediaBox")?;
    let resolved = match lexer::reference(value.as_bytes()) {
        Ok((_, (number, _))) => objects.get(&number)?.dict.clone(),
        Err(_) => value,
    };
    MediaBox::from_slice(&lexer::numbers(resolved.as_bytes()))
}

/// Raw value text for `key`, `None` if absent or empty.
pub fn get_value(dict: &str, key: &str) -> Option<String> {
    let bytes = dict.as_bytes();
    match lexer::key_value_span(bytes, key) {
        Ok(Some((_, vs, ve))) if ve > vs => dict.get(vs..ve).map(str::to_string),
        Ok(_) => None,
        Err(e) => {
            log::debug!("Cannot delimit /{} value: {}", key, e);
            None
        },
    }
}

/// Media box of a page dictionary, US Letter when missing or malformed.
///
/// ```
/// use pdf_forge::parser::media_box;
/// use pdf_forge::store::MediaBox;
///
/// assert_eq!(media_box(""), MediaBox::LETTER);
/// assert_eq!(
///     media_box("/MediaBox [0 0 595.28 841.89]"),
///     MediaBox::new(0.0, 0.0, 595.28, 841.89)
/// );
/// ```
pub fn media_box(dict: &str) -> MediaBox {
    get_value(dict, "MediaBox")
        .and_then(|value| MediaBox::from_slice(&lexer::numbers(value.as_bytes())))
        .unwrap_or_else(|| {
            log::debug!("No usable /MediaBox; defaulting to Letter");
            MediaBox::LETTER
        })
}

/// Single indirect reference stored under `key`.
pub fn reference(dict: &str, key: &str) -> Option<u32> {
    let value = get_value(dict, key)?;
    lexer::reference(value.as_bytes()).ok().map(|(_, (number, _))| number)
}

/// References stored under `key`, either a single reference or an array.
pub fn references(dict: &str, key: &str) -> Vec<u32> {
    match get_value(dict, key) {
        Some(value) if value.starts_with('[') || lexer::reference(value.as_bytes()).is_ok() => {
            lexer::collect_references(value.as_bytes())
        },
        _ => Vec::new(),
    }
}

/// Entries of a named-reference table such as `/Font << /F1 4 0 R >>`.
pub fn named_references(dict: &str, key: &str) -> Vec<(String, u32)> {
    let Some(value) = get_value(dict, key) else {
        return Vec::new();
    };
    let bytes = value.as_bytes();
    if !bytes.starts_with(b"<<") {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut pos = 2;
    loop {
        pos = lexer::skip_ws(bytes, pos);
        if pos >= bytes.len() || bytes[pos..].starts_with(b">>") {
            break;
        }
        if bytes[pos] != b'/' {
            // Stray token; step over it
            pos = lexer::value_end(bytes, pos).unwrap_or(bytes.len()).max(pos + 1);
            continue;
        }
        let name_end = lexer::name_end(bytes, pos);
        let entry_name = lexer::decode_name_escapes(&String::from_utf8_lossy(&bytes[pos + 1..name_end]));
        let value_start = lexer::skip_ws(bytes, name_end);
        if let Ok((_, (number, _))) = lexer::reference(&bytes[value_start..]) {
            out.push((entry_name, number));
        }
        pos = match lexer::value_end(bytes, value_start) {
            Ok(end) if end > value_start => end,
            _ => value_start.max(name_end),
        };
    }
    out
}

/// Name value (without the slash) stored under `key`.
pub fn name(dict: &str, key: &str) -> Option<String> {
    let value = get_value(dict, key)?;
    value.strip_prefix('/').map(lexer::decode_name_escapes)
}

/// Integer value stored under `key`.
pub fn integer(dict: &str, key: &str) -> Option<i64> {
    get_value(dict, key)?.trim().parse().ok()
}

/// Filter names from `/Filter`, which may be a name or an array of names.
fn filter_names(dict: &str) -> Vec<String> {
    let Some(value) = get_value(dict, "Filter") else {
        return Vec::new();
    };
    value
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(lexer::decode_name_escapes)
        .collect()
}

/// Decode the stream of `raw` through its `/Filter` chain.
///
/// # Errors
///
/// [`Error::Decode`] for corrupt flate data, [`Error::Unsupported`] for
/// filters other than FlateDecode, [`Error::AnchorNotFound`] if the object
/// has no stream.
pub fn decode_stream(raw: &RawObject) -> Result<Vec<u8>> {
    decode_stream_with_limit(raw, decoders::DEFAULT_MAX_DECOMPRESSED_SIZE)
}

fn decode_stream_with_limit(raw: &RawObject, max_size: usize) -> Result<Vec<u8>> {
    let data = raw.stream.as_deref().ok_or(Error::AnchorNotFound("stream"))?;
    decoders::decode_stream_with_limit(data, &filter_names(&raw.dict), max_size)
}
