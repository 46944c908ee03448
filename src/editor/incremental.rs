//! Incremental updates.
//!
//! An incremental save leaves the original bytes untouched and appends the
//! changed objects, a cross-reference section that lists only them, and a
//! trailer whose `/Prev` chains back to the original section.

use crate::buffer::GrowBuffer;
use crate::error::{Error, ErrorKind, Result};
use crate::lexer;
use crate::parser::{self, Trailer};
use crate::store::{DocumentContext, ObjectStore, Serializable};
use crate::xref::{self, XrefEntry, FREE_HEAD_GENERATION, TOMBSTONE_GENERATION};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// What to append and how to point the new trailer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncrementalRequest {
    /// Catalog id when the catalog itself changed; the original root otherwise
    pub root: Option<u32>,
    /// Information dictionary id to name in the trailer
    pub info: Option<u32>,
    /// Explicit slots to emit instead of the tracked ones. New slots (at or
    /// past the baseline) are always emitted.
    pub touched: Option<Vec<usize>>,
    /// Flate-compress content streams
    pub compress: bool,
    /// Producer for an Info dictionary that has none
    pub producer: Option<String>,
}

impl IncrementalRequest {
    /// Emit exactly the slots the store tracked as touched.
    pub fn tracked() -> Self {
        Self::default()
    }

    /// Emit `slots` (plus new objects) regardless of tracking.
    pub fn with_touched(mut self, slots: Vec<usize>) -> Self {
        self.touched = Some(slots);
        self
    }

    /// Point the trailer at a new catalog.
    pub fn with_root(mut self, root: u32) -> Self {
        self.root = Some(root);
        self
    }

    /// Name an Info dictionary in the trailer.
    pub fn with_info(mut self, info: Option<u32>) -> Self {
        self.info = info;
        self
    }
}

fn original_trailer(original: &[u8]) -> Result<Option<Trailer>> {
    match parser::parse_trailer(original) {
        Ok(trailer) => Ok(Some(trailer)),
        Err(e) if e.kind() == ErrorKind::Unsupported => Err(e),
        Err(e) => {
            log::warn!("Original trailer unreadable ({}); relying on the request", e);
            Ok(None)
        },
    }
}

fn slots_to_emit(store: &ObjectStore, request: &IncrementalRequest) -> Result<BTreeSet<usize>> {
    let mut slots: BTreeSet<usize> = match &request.touched {
        Some(explicit) => {
            let len = store.len();
            if let Some(&bad) = explicit.iter().find(|&&slot| slot >= len) {
                return Err(Error::OutOfRange { index: bad, len });
            }
            explicit.iter().copied().collect()
        },
        None => store.touched_slots().into_iter().collect(),
    };
    slots.extend(store.baseline()..store.len());
    Ok(slots)
}

/// Build the bytes of `original` followed by an update section for `store`.
///
/// # Errors
///
/// [`Error::AnchorNotFound`] when the original has no `startxref`,
/// [`Error::Unsupported`] when it points at a cross-reference stream or the
/// original is encrypted, [`Error::OutOfRange`] for an explicit slot past the
/// end of the store.
pub fn incremental_update(
    original: &[u8],
    store: &mut ObjectStore,
    request: &IncrementalRequest,
) -> Result<Vec<u8>> {
    let prev = xref::find_startxref(original)?;
    if xref::is_xref_stream_at(original, prev) {
        return Err(Error::Unsupported(
            "incremental update over a cross-reference stream".to_string(),
        ));
    }
    let trailer = original_trailer(original)?;
    let root = request
        .root
        .or(trailer.as_ref().map(|t| t.root))
        .ok_or(Error::AnchorNotFound("root"))?;

    let slots = slots_to_emit(store, request)?;

    let ctx = DocumentContext::from_store(store, request.compress, request.producer.clone());
    store.init_all(&ctx);

    let mut out = GrowBuffer::with_capacity(original.len() + slots.len() * 128 + 256);
    out.write(original);
    if !matches!(original.last(), Some(b'\n') | Some(b'\r')) {
        out.write_str("\n");
    }

    let mut entries: BTreeMap<u32, XrefEntry> = BTreeMap::new();
    entries.insert(0, XrefEntry::free(FREE_HEAD_GENERATION));
    for &slot in &slots {
        let Some(obj) = store.get(slot) else {
            continue;
        };
        let id = ObjectStore::id_of(slot);
        if obj.is_null() {
            entries.insert(id, XrefEntry::free(TOMBSTONE_GENERATION));
            continue;
        }
        let generation = obj.generation();
        entries.insert(id, XrefEntry::in_use(out.len() as u64, generation));
        out.write_str(&format!("{} {} obj\n", id, generation));
        obj.write(&mut out, id)?;
        out.write_str("\nendobj\n");
    }

    let original_size = trailer
        .as_ref()
        .and_then(|t| t.size)
        .map_or_else(|| parser::max_object_number(original) as usize + 1, |s| s as usize);
    let size = original_size.max(store.len() + 1);

    let xref_offset = out.len();
    xref::write_subsections(&mut out, &entries);

    out.write_str(&format!("trailer\n<< /Size {} /Root {} 0 R /Prev {}", size, root, prev));
    let info = request.info.or(trailer.as_ref().and_then(|t| t.info));
    if let Some(info) = info {
        out.write_str(&format!(" /Info {} 0 R", info));
    }
    if let Some(id) = trailer.as_ref().and_then(|t| t.id.as_deref()) {
        out.write(&lexer::text_bytes(&format!(" /ID {}", id)));
    }
    out.write_str(" >>\n");
    out.write_str(&format!("startxref\n{}\n%%EOF\n", xref_offset));

    log::info!(
        "Incremental update: {} objects appended after {} original bytes",
        entries.len() - 1,
        original.len()
    );
    Ok(out.into_vec())
}

/// Write an incremental update to `path`.
///
/// The whole byte image is built first; the file is only created once that
/// succeeded.
pub fn save_incremental(
    path: impl AsRef<Path>,
    original: &[u8],
    store: &mut ObjectStore,
    request: &IncrementalRequest,
) -> Result<()> {
    let bytes = incremental_update(original, store, request)?;
    std::fs::write(path.as_ref(), bytes)?;
    Ok(())
}
