//! Byte-level patching of existing documents.
//!
//! Every function here is pure: it takes the current bytes and returns a
//! new buffer (or a value), never mutating its input, so calls compose.
//! Mutators finish with [`rebuild_xref`] so the result has correct offsets.
//!
//! Dictionary keys are found by literal search for `/Key` that ends on a
//! name boundary. A key spelled inside a string value, or inside a nested
//! dictionary that comes first, still matches before the intended entry.
//!
//! Each mutator rescans the buffer, so a session of `n` single-object
//! patches costs O(n²) in total.

use crate::decoders;
use crate::error::{Error, Result};
use crate::lexer;
use crate::parser::{self, ObjectSpan, Trailer};
use crate::xref_reconstruction::rebuild_xref;

/// Dictionary text and raw stream bytes of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectContent {
    /// Dictionary (or other value) text
    pub dict: String,
    /// Raw stream bytes, `None` when the object has no stream
    pub stream: Option<Vec<u8>>,
}

fn splice(bytes: &[u8], start: usize, end: usize, replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() - (end - start) + replacement.len());
    out.extend_from_slice(&bytes[..start]);
    out.extend_from_slice(replacement);
    out.extend_from_slice(&bytes[end..]);
    out
}

fn value_text(bytes: &[u8], span: &ObjectSpan) -> String {
    lexer::byte_text(&bytes[span.value.clone()])
}

/// Read object `num`.
///
/// # Errors
///
/// [`Error::ObjectNotFound`] if no `num G obj` marker exists,
/// [`Error::StreamUnterminated`] if its `stream` has no `endstream`,
/// [`Error::MissingEndobj`] if the body is not closed.
pub fn read_object(bytes: &[u8], num: u32) -> Result<ObjectContent> {
    let span = parser::find_object(bytes, num)?;
    Ok(ObjectContent {
        dict: value_text(bytes, &span),
        stream: span.stream.map(|s| bytes[s.data].to_vec()),
    })
}

/// Replace the body of object `num` (everything between its header and
/// `endobj`) with `new_body`.
pub fn update_object(bytes: &[u8], num: u32, new_body: &str) -> Result<Vec<u8>> {
    let span = parser::find_object(bytes, num)?;
    let body = format!("\n{}\n", new_body);
    let out = splice(bytes, span.body.start, span.body.end, &lexer::text_bytes(&body));
    log::debug!("Updated body of object {}", num);
    Ok(rebuild_xref(&out))
}

/// Value text stored under `key`, `None` if the key is absent.
///
/// ```
/// use pdf_forge::editor::patch::get_dict_key;
///
/// let dict = "<< /Type /Page /MediaBox [0 0 612 792] /Contents 4 0 R >>";
/// assert_eq!(get_dict_key(dict, "MediaBox").as_deref(), Some("[0 0 612 792]"));
/// assert_eq!(get_dict_key(dict, "Contents").as_deref(), Some("4 0 R"));
/// assert_eq!(get_dict_key(dict, "Rotate"), None);
/// ```
pub fn get_dict_key(dict: &str, key: &str) -> Option<String> {
    parser::get_value(dict, key)
}

/// Set `key` to `value` (raw PDF syntax), inserting the key before the
/// closing `>>` when absent.
///
/// ```
/// use pdf_forge::editor::patch::set_dict_key;
///
/// let out = set_dict_key("<< /Length 100 /Filter /FlateDecode >>", "Length", "50").unwrap();
/// assert_eq!(out, "<< /Length 50 /Filter /FlateDecode >>");
/// ```
pub fn set_dict_key(dict: &str, key: &str, value: &str) -> Result<String> {
    let bytes = &lexer::text_bytes(dict)[..];
    if let Some((_, vs, ve)) = lexer::key_value_span(bytes, key)? {
        let replacement = if vs == ve {
            format!("{} ", value)
        } else {
            value.to_string()
        };
        let out = splice(bytes, vs, ve, &lexer::text_bytes(&replacement));
        return Ok(lexer::byte_text(&out));
    }

    let entry = format!("/{} {}", key, value);
    let out = match lexer::rfind(bytes, b">>", bytes.len()) {
        Some(close) => {
            let separator = if close > 0 && lexer::is_whitespace(bytes[close - 1]) {
                ""
            } else {
                " "
            };
            splice(bytes, close, close, &lexer::text_bytes(&format!("{}{} ", separator, entry)))
        },
        None => {
            let separator = if bytes.last().is_some_and(|&b| !lexer::is_whitespace(b)) {
                " "
            } else {
                ""
            };
            let mut out = bytes.to_vec();
            out.extend_from_slice(&lexer::text_bytes(&format!("{}{}", separator, entry)));
            out
        },
    };
    Ok(lexer::byte_text(&out))
}

/// Remove `key` and its value. Returns the dictionary unchanged when the key
/// is absent.
pub fn remove_dict_key(dict: &str, key: &str) -> Result<String> {
    let bytes = &lexer::text_bytes(dict)[..];
    match lexer::key_value_span(bytes, key)? {
        Some((ks, _, ve)) => {
            let end = lexer::skip_blanks(bytes, ve);
            Ok(lexer::byte_text(&splice(bytes, ks, end, b"")))
        },
        None => Ok(dict.to_string()),
    }
}

/// Set `key` in the dictionary of object `num`, keeping any stream intact.
pub fn set_object_key(bytes: &[u8], num: u32, key: &str, value: &str) -> Result<Vec<u8>> {
    let span = parser::find_object(bytes, num)?;
    let dict = set_dict_key(&value_text(bytes, &span), key, value)?;
    let out = splice(bytes, span.value.start, span.value.end, &lexer::text_bytes(&dict));
    Ok(rebuild_xref(&out))
}

/// Raw (still encoded) stream bytes of object `num`.
pub fn get_stream(bytes: &[u8], num: u32) -> Result<Vec<u8>> {
    let span = parser::find_object(bytes, num)?;
    span.stream
        .map(|s| bytes[s.data].to_vec())
        .ok_or(Error::AnchorNotFound("stream"))
}

/// Replace the stream of object `num` with `data`, rewriting `/Length` to
/// match exactly. An object without a stream gains one.
pub fn set_stream(bytes: &[u8], num: u32, data: &[u8]) -> Result<Vec<u8>> {
    let span = parser::find_object(bytes, num)?;
    let dict = value_text(bytes, &span);
    if !dict.starts_with("<<") {
        return Err(Error::InvalidPdf(format!("object {} is not a dictionary", num)));
    }
    let dict = set_dict_key(&dict, "Length", &data.len().to_string())?;
    write_stream(bytes, &span, &dict, data)
}

/// Compress `data` with FlateDecode and store it as the stream of `num`.
///
/// Any `/DecodeParms` are dropped since they described the old encoding.
pub fn set_stream_flate(bytes: &[u8], num: u32, data: &[u8]) -> Result<Vec<u8>> {
    let span = parser::find_object(bytes, num)?;
    let dict = value_text(bytes, &span);
    if !dict.starts_with("<<") {
        return Err(Error::InvalidPdf(format!("object {} is not a dictionary", num)));
    }
    let compressed = decoders::encode_flate(data)?;
    let dict = remove_dict_key(&dict, "DecodeParms")?;
    let dict = set_dict_key(&dict, "Filter", "/FlateDecode")?;
    let dict = set_dict_key(&dict, "Length", &compressed.len().to_string())?;
    write_stream(bytes, &span, &dict, &compressed)
}

fn write_stream(bytes: &[u8], span: &ObjectSpan, dict: &str, data: &[u8]) -> Result<Vec<u8>> {
    let end = span.stream.as_ref().map_or(span.value.end, |s| s.end);

    let mut replacement = Vec::with_capacity(dict.len() + data.len() + 32);
    replacement.extend_from_slice(&lexer::text_bytes(dict));
    replacement.extend_from_slice(b"\nstream\n");
    replacement.extend_from_slice(data);
    replacement.extend_from_slice(b"\nendstream");

    let out = splice(bytes, span.value.start, end, &replacement);
    log::debug!("Replaced stream of object {} ({} bytes)", span.number, data.len());
    Ok(rebuild_xref(&out))
}

/// Duplicate object `num` under the next free number.
///
/// The maximum is taken over every marker in the whole buffer. The copy is
/// inserted just before the last cross-reference section (or at the end
/// when there is none). Returns the new bytes and the new number.
pub fn copy_object(bytes: &[u8], num: u32) -> Result<(Vec<u8>, u32)> {
    let span = parser::find_object(bytes, num)?;
    let new_num = parser::max_object_number(bytes) + 1;

    let mut copy = format!("{} {} obj", new_num, span.generation).into_bytes();
    copy.extend_from_slice(&bytes[span.body.clone()]);
    copy.extend_from_slice(b"endobj\n");

    let insert_at = lexer::rfind_keyword(bytes, b"xref", bytes.len()).unwrap_or(bytes.len());
    let mut out = splice(bytes, insert_at, insert_at, &copy);
    if insert_at == bytes.len() && insert_at > 0 && !lexer::is_whitespace(bytes[insert_at - 1]) {
        out.insert(insert_at, b'\n');
    }
    log::debug!("Copied object {} to {}", num, new_num);
    Ok((rebuild_xref(&out), new_num))
}

/// Dictionary text of the document catalog.
pub fn get_catalog(bytes: &[u8]) -> Result<String> {
    let trailer = parser::parse_trailer(bytes)?;
    Ok(read_object(bytes, trailer.root)?.dict)
}

/// Trailer fields, recovering the root from the catalog when needed.
pub fn get_trailer(bytes: &[u8]) -> Result<Trailer> {
    parser::parse_trailer(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_dict_key_replaces_length() {
        let out = set_dict_key("<< /Length 100 >>", "Length", "50").unwrap();
        assert!(out.contains("/Length 50"));
        assert!(!out.contains("/Length 100"));
    }

    #[test]
    fn test_set_dict_key_inserts_before_close() {
        assert_eq!(
            set_dict_key("<< /Type /Page >>", "Rotate", "90").unwrap(),
            "<< /Type /Page /Rotate 90 >>"
        );
        assert_eq!(set_dict_key("<</A 1>>", "B", "2").unwrap(), "<</A 1 /B 2 >>");
    }

    #[test]
    fn test_set_dict_key_value_shapes() {
        let dict = "<< /T (a (b) c) /K [1 [2] 3] /D << /X 1 >> /R 4 0 R /N /Name >>";
        for (key, value) in [("T", "(x)"), ("K", "[9]"), ("D", "<< >>"), ("R", "7 0 R"), ("N", "/Other")] {
            let out = set_dict_key(dict, key, value).unwrap();
            assert_eq!(get_dict_key(&out, key).as_deref(), Some(value));
        }
    }

    #[test]
    fn test_prefix_key_not_confused() {
        let dict = "<< /Length1 20 /Length 10 >>";
        let out = set_dict_key(dict, "Length", "11").unwrap();
        assert_eq!(out, "<< /Length1 20 /Length 11 >>");
    }

    #[test]
    fn test_key_inside_string_still_matches_first() {
        let dict = "<< /T (see /Length 3) /Length 10 >>";
        assert_eq!(get_dict_key(dict, "Length").as_deref(), Some("3"));
    }

    #[test]
    fn test_remove_dict_key() {
        assert_eq!(
            remove_dict_key("<< /Size 3 /Prev 77 /Root 1 0 R >>", "Prev").unwrap(),
            "<< /Size 3 /Root 1 0 R >>"
        );
        assert_eq!(remove_dict_key("<< /A 1 >>", "B").unwrap(), "<< /A 1 >>");
    }

    #[test]
    fn test_non_utf8_string_bytes_survive_patch() {
        let data = b"1 0 obj\n<< /Title (Caf\xe9) /Type /Info >>\nendobj\n";
        let out = set_object_key(data, 1, "Rotate", "90").unwrap();
        assert!(lexer::find(&out, b"/Title (Caf\xe9)", 0).is_some());

        let dict = read_object(&out, 1).unwrap().dict;
        assert_eq!(get_dict_key(&dict, "Title").as_deref(), Some("(Caf\u{e9})"));
        let out = set_object_key(&out, 1, "Author", "(\u{e9}t\u{e9})").unwrap();
        assert!(lexer::find(&out, b"/Author (\xe9t\xe9)", 0).is_some());
        assert!(lexer::find(&out, b"/Title (Caf\xe9)", 0).is_some());
    }

    #[test]
    fn test_read_object_without_stream() {
        let data = b"7 0 obj\n<< /A 1 >>\nendobj\n";
        let content = read_object(data, 7).unwrap();
        assert_eq!(content.dict, "<< /A 1 >>");
        assert!(content.stream.is_none());
        assert!(matches!(read_object(data, 8), Err(Error::ObjectNotFound(8))));
    }
}
