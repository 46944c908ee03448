//! Classic cross-reference tables.
//!
//! Only the uncompressed form is produced or recognised: an `xref` keyword,
//! one or more `start count` subsection headers, and fixed 20-byte entry
//! lines. Cross-reference streams (PDF 1.5+) are detected so callers can
//! reject them with [`Error::Unsupported`], but never parsed.

use crate::buffer::GrowBuffer;
use crate::error::{Error, Result};
use crate::lexer;
use std::collections::BTreeMap;

/// Generation of the free-list head (object 0).
pub const FREE_HEAD_GENERATION: u16 = 65535;

/// Generation recorded for a tombstoned object number.
pub const TOMBSTONE_GENERATION: u16 = 1;

/// A single cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XrefEntry {
    /// Byte offset of the object (0 for free entries)
    pub offset: u64,
    /// Generation number
    pub generation: u16,
    /// `n` (in use) or `f` (free)
    pub in_use: bool,
}

impl XrefEntry {
    /// Entry for an object present at `offset`.
    pub fn in_use(offset: u64, generation: u16) -> Self {
        Self {
            offset,
            generation,
            in_use: true,
        }
    }

    /// Free entry.
    pub fn free(generation: u16) -> Self {
        Self {
            offset: 0,
            generation,
            in_use: false,
        }
    }

    /// The 20-byte line for this entry, including the trailing `" \n"`.
    pub fn line(&self) -> String {
        format!(
            "{:010} {:05} {} \n",
            self.offset,
            self.generation,
            if self.in_use { 'n' } else { 'f' }
        )
    }
}

/// A single-subsection table covering object numbers `0..len()`.
///
/// Index 0 is always the free-list head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrefTable {
    entries: Vec<XrefEntry>,
}

impl Default for XrefTable {
    fn default() -> Self {
        Self::new()
    }
}

impl XrefTable {
    /// Create a table holding only the free-list head.
    pub fn new() -> Self {
        Self {
            entries: vec![XrefEntry::free(FREE_HEAD_GENERATION)],
        }
    }

    /// Append an in-use entry for the next object number.
    pub fn push_in_use(&mut self, offset: u64, generation: u16) {
        self.entries.push(XrefEntry::in_use(offset, generation));
    }

    /// Append a free entry for the next object number.
    pub fn push_free(&mut self, generation: u16) {
        self.entries.push(XrefEntry::free(generation));
    }

    /// Number of entries including object 0 (the trailer `/Size`).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: the free-list head is present from construction.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for object number `num`.
    pub fn get(&self, num: u32) -> Option<&XrefEntry> {
        self.entries.get(num as usize)
    }

    /// Emit `xref\n0 <n>\n` followed by one line per entry.
    pub fn write_to(&self, sink: &mut GrowBuffer) {
        sink.write_str(&format!("xref\n0 {}\n", self.entries.len()));
        for entry in &self.entries {
            sink.write_str(&entry.line());
        }
    }
}

/// Emit an `xref` section for a sparse set of entries, one subsection per
/// run of consecutive object numbers.
pub fn write_subsections(sink: &mut GrowBuffer, entries: &BTreeMap<u32, XrefEntry>) {
    sink.write_str("xref\n");

    let mut run: Vec<(u32, &XrefEntry)> = Vec::new();
    for (&num, entry) in entries {
        if let Some(&(last, _)) = run.last() {
            if num != last + 1 {
                flush_run(sink, &run);
                run.clear();
            }
        }
        run.push((num, entry));
    }
    flush_run(sink, &run);
}

fn flush_run(sink: &mut GrowBuffer, run: &[(u32, &XrefEntry)]) {
    let Some(&(first, _)) = run.first() else {
        return;
    };
    sink.write_str(&format!("{} {}\n", first, run.len()));
    for (_, entry) in run {
        sink.write_str(&entry.line());
    }
}

/// Read the offset after the last `startxref` keyword.
///
/// # Errors
///
/// [`Error::AnchorNotFound`] if the keyword is absent, [`Error::InvalidPdf`]
/// if it is not followed by an integer.
pub fn find_startxref(bytes: &[u8]) -> Result<u64> {
    let at = lexer::rfind_keyword(bytes, b"startxref", bytes.len())
        .ok_or(Error::AnchorNotFound("startxref"))?;
    let pos = lexer::skip_ws(bytes, at + b"startxref".len());

    let digits: &[u8] = {
        let end = bytes[pos..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(bytes.len(), |p| pos + p);
        &bytes[pos..end]
    };

    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| Error::InvalidPdf("startxref is not followed by an offset".to_string()))
}

/// Whether `offset` points at an indirect object whose dictionary is
/// `/Type /XRef` (a cross-reference stream).
pub fn is_xref_stream_at(bytes: &[u8], offset: u64) -> bool {
    let Ok(offset) = usize::try_from(offset) else {
        return false;
    };
    let Some(window) = bytes.get(offset..) else {
        return false;
    };
    let Some(dict_start) = lexer::find(window, b"<<", 0) else {
        return false;
    };
    let Ok(dict_end) = lexer::dict_end(window, dict_start) else {
        return false;
    };
    let dict = &window[dict_start..dict_end];
    match lexer::key_value_span(dict, "Type") {
        Ok(Some((_, vs, ve))) => &dict[vs..ve] == b"/XRef",
        _ => false,
    }
}
