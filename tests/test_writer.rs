//! Integration tests for document serialization.

use pdf_forge::buffer::GrowBuffer;
use pdf_forge::config::WriterConfig;
use pdf_forge::decoders;
use pdf_forge::document::Document;
use pdf_forge::object::Object;
use pdf_forge::parser;
use pdf_forge::store::{Catalog, ContentStream, DocObject, MediaBox, ObjectStore, Page, PageTree};
use pdf_forge::writer::{DocumentWriter, TrailerRefs};
use pdf_forge::xref::find_startxref;
use proptest::prelude::*;

/// Parse the xref table the writer emitted and return `(offset, generation, in_use)` per entry.
fn xref_entries(bytes: &[u8]) -> Vec<(usize, u16, bool)> {
    let at = find_startxref(bytes).unwrap() as usize;
    let text = String::from_utf8_lossy(&bytes[at..]).into_owned();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("xref"));
    let header = lines.next().unwrap();
    let count: usize = header.split(' ').nth(1).unwrap().parse().unwrap();
    lines
        .take(count)
        .map(|line| {
            let parts: Vec<&str> = line.split(' ').collect();
            (parts[0].parse().unwrap(), parts[1].parse().unwrap(), parts[2] == "n")
        })
        .collect()
}

mod writer_tests {
    use super::*;

    #[test]
    fn test_every_offset_points_at_its_header() {
        let mut doc = Document::with_config(WriterConfig::default().with_generate_id(false));
        for _ in 0..3 {
            let page = doc.add_page(MediaBox::LETTER).unwrap();
            doc.append_content(page, "BT /F1 12 Tf 72 720 Td (Hello) Tj ET").unwrap();
        }
        let bytes = doc.to_bytes().unwrap();

        let entries = xref_entries(&bytes);
        assert_eq!(entries.len(), doc.object_count() + 1);
        assert_eq!(entries[0], (0, 65535, false));
        for (id, &(offset, generation, in_use)) in entries.iter().enumerate().skip(1) {
            assert!(in_use);
            let header = format!("{} {} obj", id, generation);
            assert!(bytes[offset..].starts_with(header.as_bytes()), "object {}", id);
        }
    }

    #[test]
    fn test_xref_lines_are_twenty_bytes() {
        let mut doc = Document::new();
        doc.add_page(MediaBox::A4).unwrap();
        let bytes = doc.to_bytes().unwrap();
        let at = find_startxref(&bytes).unwrap() as usize;
        let table_start = at + "xref\n0 5\n".len();
        for i in 0..5 {
            let line = &bytes[table_start + i * 20..table_start + (i + 1) * 20];
            assert!(line.ends_with(b" \n") || line.ends_with(b"\r\n"));
        }
        assert!(bytes[table_start + 100..].starts_with(b"trailer\n"));
    }

    #[test]
    fn test_content_length_is_exact() {
        let mut doc = Document::with_config(WriterConfig::default().with_generate_id(false));
        let page = doc.add_page(MediaBox::LETTER).unwrap();
        doc.append_content(page, "0 0 m").unwrap();
        doc.append_content(page, "100 100 l S").unwrap();
        let bytes = doc.to_bytes().unwrap();

        let parsed = parser::parse(&bytes).unwrap();
        let content = parsed.object(3).unwrap();
        assert_eq!(parser::integer(&content.dict, "Length"), Some(17));
        assert_eq!(content.stream.as_deref(), Some(&b"0 0 m\n100 100 l S"[..]));
    }

    #[test]
    fn test_compressed_content_decodes() {
        let config = WriterConfig::default().with_compress(true);
        let mut doc = Document::with_config(config);
        let page = doc.add_page(MediaBox::LETTER).unwrap();
        doc.append_content(page, "q 1 0 0 1 0 0 cm Q").unwrap();
        let bytes = doc.to_bytes().unwrap();

        let parsed = parser::parse(&bytes).unwrap();
        let content = parsed.object(3).unwrap();
        assert_eq!(parser::name(&content.dict, "Filter").as_deref(), Some("FlateDecode"));
        let raw = content.stream.as_deref().unwrap();
        assert_eq!(parser::integer(&content.dict, "Length"), Some(raw.len() as i64));
        assert_eq!(parsed.decode_stream(3).unwrap(), b"q 1 0 0 1 0 0 cm Q");
        assert_eq!(decoders::decode_stream(raw, &["FlateDecode".to_string()]).unwrap(), b"q 1 0 0 1 0 0 cm Q");
    }

    #[test]
    fn test_version_and_marker_config() {
        let config = WriterConfig::default().with_version("1.4");
        let config = WriterConfig {
            binary_marker: false,
            ..config
        };
        let mut doc = Document::with_config(config);
        let bytes = doc.to_bytes().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4\n1 0 obj\n"));
    }

    #[test]
    fn test_generated_id_present() {
        let mut doc = Document::new();
        let bytes = doc.to_bytes().unwrap();
        let trailer = parser::parse_trailer(&bytes).unwrap();
        let id = trailer.id.unwrap();
        assert!(id.starts_with("[<") && id.ends_with(">]"));
        assert_eq!(id.len(), 2 + 32 + 3 + 32 + 2);
    }

    #[test]
    fn test_store_written_directly() {
        let mut store = ObjectStore::new();
        store.add(DocObject::Catalog(Catalog { pages: 2, names: None }));
        store.add(DocObject::Pages(PageTree { kids: vec![3] }));
        let mut page = Page::new(MediaBox::LETTER);
        page.contents.push(4);
        store.add(DocObject::Page(page));
        let mut content = ContentStream::new();
        content.push("0 g 0 0 10 10 re f");
        store.add(DocObject::Content(content));
        store.add(Object::String(b"loose (value)".to_vec()));

        let bytes = DocumentWriter::default()
            .write(&mut store, &TrailerRefs::new(1))
            .unwrap();
        let parsed = parser::parse(&bytes).unwrap();
        assert_eq!(parsed.page_count(), 1);
        assert_eq!(parsed.pages[0].contents, vec![4]);
        assert_eq!(parsed.object(5).unwrap().dict, r"(loose \(value\))");
    }

    #[test]
    fn test_writer_config_from_json() {
        let config = WriterConfig::from_json(r#"{"version": "2.0", "generate_id": false}"#).unwrap();
        let mut doc = Document::with_config(config);
        let bytes = doc.to_bytes().unwrap();
        assert!(bytes.starts_with(b"%PDF-2.0"));
        assert!(parser::parse_trailer(&bytes).unwrap().id.is_none());
    }
}

mod grow_buffer_tests {
    use super::*;

    #[test]
    fn test_rewind_and_patch() {
        let placeholder = " ".repeat(10);
        let mut buf = GrowBuffer::new();
        buf.write_str("<< /Length ");
        let at = buf.position();
        buf.write_str(&placeholder);
        buf.write_str(" >>");

        buf.patch_at(at, b"42").unwrap();
        assert_eq!(buf.position(), buf.len());
        let expected = format!("<< /Length 42{} >>", " ".repeat(8));
        assert_eq!(buf.bytes(), expected.as_bytes());
        assert!(buf.set_position(buf.len() + 1).is_err());
    }

    proptest! {
        #[test]
        fn prop_growth_events_are_logarithmic(chunks in prop::collection::vec(1usize..512, 1..200)) {
            let mut buf = GrowBuffer::new();
            let mut total = 0usize;
            for len in &chunks {
                buf.write(&vec![b'x'; *len]);
                total += len;
            }
            prop_assert_eq!(buf.len(), total);
            prop_assert!(buf.position() <= buf.len());
            let bound = (usize::BITS - total.leading_zeros()) as usize + 1;
            prop_assert!(buf.growth_events() <= bound, "{} events for {} bytes", buf.growth_events(), total);
        }
    }
}
