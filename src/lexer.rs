//! Delimiter-balanced byte scanner.
//!
//! All tolerant text extraction in the engine goes through this module:
//! keyword search, balanced dictionaries/arrays/strings, name and bare-token
//! spans, and the nom-based number and `N G R` reference parsers. Positions
//! are absolute byte offsets into the slice passed in.
//!
//! # PDF Syntax Overview
//!
//! - Whitespace: space, `\t`, `\r`, `\n`, `\0`, form feed
//! - Delimiters: `( ) < > [ ] { } / %`
//! - Everything else is a regular character and belongs to a bare token
//!   (numbers, `true`, `false`, `null`, keywords, the `R` of a reference)

use crate::error::{Error, Result};
use nom::{
    bytes::complete::{take_till, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map_res, opt, value},
    sequence::preceded,
    IResult,
};
use std::collections::HashMap;

/// PDF whitespace (PDF Ref 1.7, Table 3.1).
#[inline]
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
#[inline]
pub fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Regular characters form bare tokens.
#[inline]
pub fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    value((), take_while1(is_whitespace))(input)
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip whitespace and comments starting at `pos`.
pub fn skip_ws(data: &[u8], pos: usize) -> usize {
    let mut remaining = data.get(pos..).unwrap_or(&[]);
    loop {
        if let Ok((rest, _)) = whitespace(remaining) {
            remaining = rest;
            continue;
        }
        if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
            continue;
        }
        break;
    }
    data.len() - remaining.len()
}

/// Skip only whitespace (no comments) starting at `pos`.
pub fn skip_blanks(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    pos
}

/// Find the first occurrence of `pattern` at or after `from`.
pub fn find(data: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
    if pattern.is_empty() || from >= data.len() || pattern.len() > data.len() - from {
        return None;
    }
    data[from..]
        .windows(pattern.len())
        .position(|w| w == pattern)
        .map(|p| p + from)
}

/// Find the last occurrence of `pattern` that starts before `before`.
pub fn rfind(data: &[u8], pattern: &[u8], before: usize) -> Option<usize> {
    let end = before.min(data.len());
    if pattern.is_empty() || pattern.len() > end {
        return None;
    }
    (0..=end - pattern.len())
        .rev()
        .find(|&i| &data[i..i + pattern.len()] == pattern)
}

fn is_keyword_at(data: &[u8], at: usize, keyword: &[u8]) -> bool {
    let before_ok = at == 0 || !is_regular(data[at - 1]);
    let end = at + keyword.len();
    let after_ok = end >= data.len() || !is_regular(data[end]);
    before_ok && after_ok
}

/// Find `keyword` as a whole token (not part of a longer token such as
/// `startxref` when searching for `xref`).
pub fn find_keyword(data: &[u8], keyword: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(at) = find(data, keyword, pos) {
        if is_keyword_at(data, at, keyword) {
            return Some(at);
        }
        pos = at + 1;
    }
    None
}

/// Find the last whole-token occurrence of `keyword` before `before`.
pub fn rfind_keyword(data: &[u8], keyword: &[u8], before: usize) -> Option<usize> {
    let mut end = before;
    while let Some(at) = rfind(data, keyword, end) {
        if is_keyword_at(data, at, keyword) {
            return Some(at);
        }
        if at == 0 {
            break;
        }
        end = at + keyword.len() - 1;
    }
    None
}

/// End (exclusive) of a literal string starting at `start` (which must be `(`).
///
/// Handles nested parentheses and backslash escapes.
pub fn literal_string_end(data: &[u8], start: usize) -> Result<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < data.len() {
        match data[i] {
            b'\\' => i += 2,
            b'(' => {
                depth += 1;
                i += 1;
            },
            b')' => {
                depth = depth.saturating_sub(1);
                i += 1;
                if depth == 0 {
                    return Ok(i);
                }
            },
            _ => i += 1,
        }
    }
    Err(Error::UnbalancedDelimiter {
        offset: start,
        delimiter: "(",
    })
}

/// End (exclusive) of a hex string starting at `start` (which must be `<`).
pub fn hex_string_end(data: &[u8], start: usize) -> Result<usize> {
    find(data, b">", start + 1)
        .map(|p| p + 1)
        .ok_or(Error::UnbalancedDelimiter {
            offset: start,
            delimiter: "<",
        })
}

/// End (exclusive) of a name starting at `start` (which must be `/`).
pub fn name_end(data: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < data.len() && is_regular(data[i]) {
        i += 1;
    }
    i
}

fn comment_end(data: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < data.len() && data[i] != b'\r' && data[i] != b'\n' {
        i += 1;
    }
    i
}

/// End (exclusive) of a dictionary starting at `start` (which must be `<<`).
///
/// Nested dictionaries, literal strings, hex strings and comments are
/// stepped over so delimiters inside them do not affect the balance.
pub fn dict_end(data: &[u8], start: usize) -> Result<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < data.len() {
        match data[i] {
            b'(' => i = literal_string_end(data, i)?,
            b'%' => i = comment_end(data, i),
            b'/' => i = name_end(data, i),
            b'<' if data.get(i + 1) == Some(&b'<') => {
                depth += 1;
                i += 2;
            },
            b'<' => i = hex_string_end(data, i)?,
            b'>' if data.get(i + 1) == Some(&b'>') => {
                depth = depth.saturating_sub(1);
                i += 2;
                if depth == 0 {
                    return Ok(i);
                }
            },
            _ => i += 1,
        }
    }
    Err(Error::UnbalancedDelimiter {
        offset: start,
        delimiter: "<<",
    })
}

/// End (exclusive) of an array starting at `start` (which must be `[`).
pub fn array_end(data: &[u8], start: usize) -> Result<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < data.len() {
        match data[i] {
            b'(' => i = literal_string_end(data, i)?,
            b'%' => i = comment_end(data, i),
            b'/' => i = name_end(data, i),
            b'<' if data.get(i + 1) == Some(&b'<') => i = dict_end(data, i)?,
            b'<' => i = hex_string_end(data, i)?,
            b'[' => {
                depth += 1;
                i += 1;
            },
            b']' => {
                depth = depth.saturating_sub(1);
                i += 1;
                if depth == 0 {
                    return Ok(i);
                }
            },
            _ => i += 1,
        }
    }
    Err(Error::UnbalancedDelimiter {
        offset: start,
        delimiter: "[",
    })
}

fn token_end(data: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < data.len() && is_regular(data[i]) {
        i += 1;
    }
    i
}

/// End (exclusive) of the value starting at `start`.
///
/// Five shapes are recognised: name, literal string, array, dictionary and
/// bare token. A bare token that begins an `N G R` triple spans the whole
/// reference.
pub fn value_end(data: &[u8], start: usize) -> Result<usize> {
    match data.get(start) {
        None => Ok(start),
        Some(b'/') => Ok(name_end(data, start)),
        Some(b'(') => literal_string_end(data, start),
        Some(b'[') => array_end(data, start),
        Some(b'<') if data.get(start + 1) == Some(&b'<') => dict_end(data, start),
        Some(b'<') => hex_string_end(data, start),
        Some(_) => match reference(&data[start..]) {
            Ok((rest, _)) => Ok(data.len() - rest.len()),
            Err(_) => Ok(token_end(data, start)),
        },
    }
}

/// Locate `/key` inside `dict` by literal substring search.
///
/// A candidate is accepted only when the key name ends there (`/Length`
/// does not match `/Length1`). A key spelled inside a string value or a
/// nested dictionary earlier in the text still matches first.
pub fn find_key(dict: &[u8], key: &str) -> Option<usize> {
    let pattern = format!("/{}", key);
    let pattern = pattern.as_bytes();
    let mut pos = 0;
    while let Some(at) = find(dict, pattern, pos) {
        let end = at + pattern.len();
        if end >= dict.len() || !is_regular(dict[end]) {
            return Some(at);
        }
        pos = at + 1;
    }
    None
}

/// Byte span of a key's entry: `(key_start, value_start, value_end)`.
pub fn key_value_span(dict: &[u8], key: &str) -> Result<Option<(usize, usize, usize)>> {
    let Some(key_start) = find_key(dict, key) else {
        return Ok(None);
    };
    let value_start = skip_ws(dict, key_start + key.len() + 1);
    let value_end = match dict.get(value_start) {
        Some(b'>') | None => value_start,
        Some(_) => value_end(dict, value_start)?,
    };
    Ok(Some((key_start, value_start, value_end)))
}

fn unsigned<T: std::str::FromStr>(input: &[u8]) -> IResult<&[u8], T> {
    map_res(digit1, |digits: &[u8]| {
        std::str::from_utf8(digits)
            .map_err(|_| ())
            .and_then(|s| s.parse::<T>().map_err(|_| ()))
    })(input)
}

/// Parse an `N G R` indirect reference at the start of `input`.
pub fn reference(input: &[u8]) -> IResult<&[u8], (u32, u16)> {
    let (input, num) = unsigned::<u32>(input)?;
    let (input, _) = whitespace(input)?;
    let (input, gen) = unsigned::<u16>(input)?;
    let (input, _) = whitespace(input)?;
    let (input, _) = char('R')(input)?;
    if input.first().is_some_and(|&b| is_regular(b)) {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char)));
    }
    Ok((input, (num, gen)))
}

/// Parse an integer or real number.
///
/// PDF numbers can be:
/// - Integers: 42, -123, +17
/// - Reals: 3.14, -2.5, .5, 0., -.002
pub fn number(input: &[u8]) -> IResult<&[u8], f64> {
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)));
    }

    let mut num_str = String::new();
    if sign == Some('-') {
        num_str.push('-');
    }
    match int_part {
        Some(int) => num_str.push_str(&String::from_utf8_lossy(int)),
        None => num_str.push('0'),
    }
    if let Some(Some(frac)) = frac_part {
        num_str.push('.');
        num_str.push_str(&String::from_utf8_lossy(frac));
    }

    let num: f64 = num_str
        .parse()
        .map_err(|_| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)))?;
    Ok((input, num))
}

/// Parse every number in a whitespace-separated list such as the interior
/// of `[0 0 612 792]`. Tokens that are not numbers are skipped.
pub fn numbers(data: &[u8]) -> Vec<f64> {
    data.split(|&b| !is_regular(b))
        .filter(|tok| !tok.is_empty())
        .filter_map(|tok| match number(tok) {
            Ok((rest, n)) if rest.is_empty() => Some(n),
            _ => None,
        })
        .collect()
}

/// Walk `data` token by token, calling `on_ref` for every `N G R` outside
/// strings, names and comments. `on_ref` receives `(start, end, num, gen)`.
fn walk_references(data: &[u8], mut on_ref: impl FnMut(usize, usize, u32, u16)) {
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b if is_whitespace(b) => i += 1,
            b'(' => i = literal_string_end(data, i).unwrap_or(data.len()),
            b'%' => i = comment_end(data, i),
            b'/' => i = name_end(data, i),
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'<' => i = hex_string_end(data, i).unwrap_or(data.len()),
            b if b.is_ascii_digit() => match reference(&data[i..]) {
                Ok((rest, (num, gen))) => {
                    let end = data.len() - rest.len();
                    on_ref(i, end, num, gen);
                    i = end;
                },
                Err(_) => i = token_end(data, i),
            },
            b if is_delimiter(b) => i += 1,
            _ => i = token_end(data, i),
        }
    }
}

/// Collect the object numbers of every indirect reference in `data`.
pub fn collect_references(data: &[u8]) -> Vec<u32> {
    let mut refs = Vec::new();
    walk_references(data, |_, _, num, _| refs.push(num));
    refs
}

/// Rewrite indirect references according to `mapping` (old number -> new number).
///
/// References whose number is not in the mapping are left untouched.
pub fn remap_references(data: &[u8], mapping: &HashMap<u32, u32>) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut last = 0;
    walk_references(data, |start, end, num, gen| {
        if let Some(&new_num) = mapping.get(&num) {
            out.extend_from_slice(&data[last..start]);
            out.extend_from_slice(format!("{} {} R", new_num, gen).as_bytes());
            last = end;
        }
    });
    out.extend_from_slice(&data[last..]);
    out
}

/// Raw PDF bytes as text, one `char` per byte (U+0000..=U+00FF).
///
/// PDF syntax is byte oriented: string literals and names may hold any byte,
/// so dictionary text carried as a `String` must map every byte back
/// unchanged. Pair with [`text_bytes`].
///
/// ```
/// # use pdf_forge::lexer::{byte_text, text_bytes};
/// let raw = b"<< /T (Caf\xe9) >>";
/// let text = byte_text(raw);
/// assert_eq!(text, "<< /T (Caf\u{e9}) >>");
/// assert_eq!(text_bytes(&text), raw.to_vec());
/// ```
pub fn byte_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Inverse of [`byte_text`]. Characters above U+00FF have no single-byte
/// form and are written as their UTF-8 sequence.
pub fn text_bytes(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match u8::try_from(u32::from(c)) {
            Ok(b) => out.push(b),
            Err(_) => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            },
        }
    }
    out
}

/// Decode #XX escape sequences in PDF names.
///
/// PDF Spec: ISO 32000-1:2008, Section 7.3.5 - Name Objects
///
/// ```
/// # use pdf_forge::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes("A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes("Type"), "Type");
/// assert_eq!(decode_name_escapes("A#"), "A#");
/// ```
pub fn decode_name_escapes(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'#' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_text_keeps_every_byte() {
        let all: Vec<u8> = (0..=255u8).collect();
        let text = byte_text(&all);
        assert_eq!(text.chars().count(), 256);
        assert_eq!(text_bytes(&text), all);
        assert_eq!(text_bytes("\u{20ac}"), "\u{20ac}".as_bytes());
    }

    #[test]
    fn test_skip_ws_with_comment() {
        let data = b"  % comment\n  /Type";
        let pos = skip_ws(data, 0);
        assert_eq!(&data[pos..], b"/Type");
    }

    #[test]
    fn test_find_keyword_skips_startxref() {
        let data = b"startxref\n123\nxref\n0 1";
        assert_eq!(find_keyword(data, b"xref", 0), Some(14));
        assert_eq!(rfind_keyword(data, b"xref", data.len()), Some(14));
    }

    #[test]
    fn test_rfind_keyword_none() {
        let data = b"startxref\n0\n%%EOF";
        assert_eq!(rfind_keyword(data, b"xref", data.len()), None);
    }

    #[test]
    fn test_dict_end_nested() {
        let data = b"<< /A << /B 1 >> /C (x>>y) >> rest";
        let end = dict_end(data, 0).unwrap();
        assert_eq!(&data[end..], b" rest");
    }

    #[test]
    fn test_dict_end_unbalanced() {
        let data = b"<< /A << /B 1 >>";
        let err = dict_end(data, 0).unwrap_err();
        assert!(matches!(err, Error::UnbalancedDelimiter { delimiter: "<<", .. }));
    }

    #[test]
    fn test_literal_string_escapes() {
        let data = br"(a \) b (nested) c) tail";
        let end = literal_string_end(data, 0).unwrap();
        assert_eq!(&data[end..], b" tail");
    }

    #[test]
    fn test_array_end_with_dict_and_string() {
        let data = b"[1 0 R << /X [2] >> (])] next";
        let end = array_end(data, 0).unwrap();
        assert_eq!(&data[end..], b" next");
    }

    #[test]
    fn test_value_end_shapes() {
        let data = b"/Name rest";
        assert_eq!(value_end(data, 0).unwrap(), 5);
        let data = b"12 0 R /Next";
        assert_eq!(value_end(data, 0).unwrap(), 6);
        let data = b"true>>";
        assert_eq!(value_end(data, 0).unwrap(), 4);
        let data = b"<48656C6C6F>/K";
        assert_eq!(value_end(data, 0).unwrap(), 12);
    }

    #[test]
    fn test_find_key_respects_name_boundary() {
        let dict = b"<< /Length1 20 /Length 10 >>";
        let at = find_key(dict, "Length").unwrap();
        assert_eq!(&dict[at..at + 10], b"/Length 10");
    }

    #[test]
    fn test_key_value_span() {
        let dict = b"<< /Type /Page /MediaBox [0 0 612 792] >>";
        let (_, vs, ve) = key_value_span(dict, "MediaBox").unwrap().unwrap();
        assert_eq!(&dict[vs..ve], b"[0 0 612 792]");
        assert!(key_value_span(dict, "Missing").unwrap().is_none());
    }

    #[test]
    fn test_reference_parser() {
        let (rest, r) = reference(b"12 0 R>>").unwrap();
        assert_eq!(r, (12, 0));
        assert_eq!(rest, b">>");
        assert!(reference(b"12 0 RG").is_err());
        assert!(reference(b"12 0 obj").is_err());
    }

    #[test]
    fn test_number_parser() {
        assert_eq!(number(b"612").unwrap().1, 612.0);
        assert_eq!(number(b"-.5").unwrap().1, -0.5);
        assert_eq!(number(b"595.28").unwrap().1, 595.28);
        assert!(number(b"abc").is_err());
    }

    #[test]
    fn test_numbers_list() {
        assert_eq!(numbers(b"0 0\n595.28  841.89"), vec![0.0, 0.0, 595.28, 841.89]);
    }

    #[test]
    fn test_collect_references_skips_strings() {
        let data = b"<< /Kids [3 0 R 4 0 R] /T (5 0 R) /Parent 1 0 R >>";
        assert_eq!(collect_references(data), vec![3, 4, 1]);
    }

    #[test]
    fn test_remap_references() {
        let mut mapping = HashMap::new();
        mapping.insert(5, 10);
        mapping.insert(6, 11);

        let input = b"<</Font 5 0 R/XObject 6 0 R/Other 7 0 R>>";
        let result = remap_references(input, &mapping);
        assert_eq!(result, b"<</Font 10 0 R/XObject 11 0 R/Other 7 0 R>>".to_vec());
    }

    #[test]
    fn test_decode_name_escapes() {
        assert_eq!(decode_name_escapes("Name#20With#20Space"), "Name With Space");
        assert_eq!(decode_name_escapes("A#"), "A#");
        assert_eq!(decode_name_escapes("A#2"), "A#2");
    }
}
