//! Cross-reference table reconstruction.
//!
//! After a byte-level patch every offset behind the edit point is stale.
//! [`rebuild_xref`] rescans the object markers, recomputes true offsets, and
//! replaces the last cross-reference section (and everything after it) with
//! a fresh table, trailer, `startxref` and `%%EOF`.

use crate::buffer::GrowBuffer;
use crate::editor::patch;
use crate::lexer;
use crate::parser;
use crate::xref::{XrefTable, TOMBSTONE_GENERATION};
use std::collections::BTreeMap;

/// Rebuild the cross-reference section of `bytes`.
///
/// Returns the input unchanged when it has no `xref` keyword at all. When
/// the file holds a chain of incremental sections, every object before the
/// last `xref` is indexed in a single table (later definitions win), the
/// last trailer dictionary is kept with `/Size` updated and `/Prev` removed.
///
/// Object numbers larger than the file length cannot all be present and are
/// left out, so a stray `999999 0 obj` cannot inflate the table.
///
/// Applying it twice gives the same bytes as applying it once.
///
/// ```
/// use pdf_forge::xref_reconstruction::rebuild_xref;
///
/// let stale = b"1 0 obj\n<< /Type /Catalog >>\nendobj\nxref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Root 1 0 R >>\nstartxref\n999\n%%EOF\n";
/// let fixed = rebuild_xref(stale);
/// assert!(String::from_utf8_lossy(&fixed).contains("0000000000 00000 n \n"));
/// assert_eq!(rebuild_xref(&fixed), fixed);
/// ```
pub fn rebuild_xref(bytes: &[u8]) -> Vec<u8> {
    let Some(xref_at) = lexer::rfind_keyword(bytes, b"xref", bytes.len()) else {
        log::debug!("No xref section; leaving bytes unchanged");
        return bytes.to_vec();
    };

    let mut found: BTreeMap<u32, (usize, u16)> = BTreeMap::new();
    for scanned in parser::scan_objects(bytes, xref_at) {
        match scanned {
            Ok(span) if span.number as usize > bytes.len() => log::warn!(
                "Object number {} at offset {} exceeds the file length; left out of rebuilt xref",
                span.number,
                span.offset
            ),
            Ok(span) => {
                found.insert(span.number, (span.offset, span.generation));
            },
            Err(failure) => log::warn!(
                "Object {} at offset {} left out of rebuilt xref: {}",
                failure.number,
                failure.offset,
                failure.error
            ),
        }
    }

    let size = found.keys().next_back().map_or(1, |max| max + 1);
    let mut table = XrefTable::new();
    for number in 1..size {
        match found.get(&number) {
            Some(&(offset, generation)) => table.push_in_use(offset as u64, generation),
            None => table.push_free(TOMBSTONE_GENERATION),
        }
    }

    let trailer = carried_trailer(bytes, table.len());

    let mut out = GrowBuffer::with_capacity(xref_at + table.len() * 20 + trailer.len() + 64);
    out.write(&bytes[..xref_at]);
    table.write_to(&mut out);
    out.write_str("trailer\n");
    out.write(&lexer::text_bytes(&trailer));
    out.write_str(&format!("\nstartxref\n{}\n%%EOF\n", xref_at));

    log::debug!("Rebuilt xref with {} entries at offset {}", table.len(), xref_at);
    out.into_vec()
}

/// The last trailer dictionary with `/Size` set and `/Prev` dropped.
fn carried_trailer(bytes: &[u8], size: usize) -> String {
    let dict = lexer::rfind_keyword(bytes, b"trailer", bytes.len())
        .map(|at| lexer::skip_ws(bytes, at + b"trailer".len()))
        .filter(|&start| bytes[start..].starts_with(b"<<"))
        .and_then(|start| {
            lexer::dict_end(bytes, start)
                .ok()
                .map(|end| lexer::byte_text(&bytes[start..end]))
        })
        .unwrap_or_else(|| {
            log::warn!("No trailer dictionary found; writing a minimal one");
            "<< >>".to_string()
        });

    let sized = patch::set_dict_key(&dict, "Size", &size.to_string()).unwrap_or(dict);
    patch::remove_dict_key(&sized, "Prev").unwrap_or(sized)
}
