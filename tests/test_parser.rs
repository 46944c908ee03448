//! Integration tests for the tolerant raw parser.

use pdf_forge::config::ParserOptions;
use pdf_forge::error::{Error, ErrorKind};
use pdf_forge::parser::{self, media_box, parse, parse_with_options};
use pdf_forge::store::MediaBox;

/// Assemble a file from object bodies. The xref offsets are deliberately
/// wrong; the parser must not depend on them.
fn pdf_with(objects: &[(u32, &str)], trailer: &str) -> Vec<u8> {
    let mut out = b"%PDF-1.4\n".to_vec();
    for (number, body) in objects {
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", number, body).as_bytes());
    }
    out.extend_from_slice(b"xref\n0 1\n0000000000 65535 f \n");
    out.extend_from_slice(format!("trailer\n{}\nstartxref\n4\n%%EOF\n", trailer).as_bytes());
    out
}

fn minimal() -> Vec<u8> {
    pdf_with(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
            (3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>"),
        ],
        "<< /Size 4 /Root 1 0 R >>",
    )
}

mod page_tree_tests {
    use super::*;

    #[test]
    fn test_minimal_document_has_one_letter_page() {
        let doc = parse(&minimal()).unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.pages[0].object, 3);
        assert_eq!(doc.pages[0].media_box, MediaBox::new(0.0, 0.0, 612.0, 792.0));
        assert_eq!(doc.version.as_deref(), Some("1.4"));
        assert_eq!(doc.trailer.root, 1);
    }

    #[test]
    fn test_media_box_extraction_from_text() {
        assert_eq!(media_box(""), MediaBox::new(0.0, 0.0, 612.0, 792.0));
        assert_eq!(
            media_box("/MediaBox [0 0 595.28 841.89]"),
            MediaBox::new(0.0, 0.0, 595.28, 841.89)
        );
    }

    #[test]
    fn test_media_box_and_resources_are_inherited() {
        let data = pdf_with(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (
                    2,
                    "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 300 400] /Resources << /Font << /F1 9 0 R >> >> >>",
                ),
                (3, "<< /Type /Page /Parent 2 0 R >>"),
                (4, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] >>"),
            ],
            "<< /Size 5 /Root 1 0 R >>",
        );
        let doc = parse(&data).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.pages[0].media_box, MediaBox::new(0.0, 0.0, 300.0, 400.0));
        assert_eq!(doc.pages[1].media_box, MediaBox::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(doc.pages[0].resources.as_deref(), Some("<< /Font << /F1 9 0 R >> >>"));
    }

    #[test]
    fn test_indirect_media_box() {
        let data = pdf_with(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
                (3, "<< /Type /Page /Parent 2 0 R /MediaBox 5 0 R >>"),
                (5, "[0 0 200 250]"),
            ],
            "<< /Size 6 /Root 1 0 R >>",
        );
        let doc = parse(&data).unwrap();
        assert_eq!(doc.pages[0].media_box, MediaBox::new(0.0, 0.0, 200.0, 250.0));
    }

    #[test]
    fn test_page_without_media_box_defaults_to_letter() {
        let data = pdf_with(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
                (3, "<< /Type /Page /Parent 2 0 R >>"),
            ],
            "<< /Size 4 /Root 1 0 R >>",
        );
        assert_eq!(parse(&data).unwrap().pages[0].media_box, MediaBox::LETTER);
    }

    #[test]
    fn test_contents_array_object_is_resolved() {
        let data = pdf_with(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
                (3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>"),
                (4, "[5 0 R 6 0 R]"),
            ],
            "<< /Size 7 /Root 1 0 R >>",
        );
        assert_eq!(parse(&data).unwrap().pages[0].contents, vec![5, 6]);
    }

    #[test]
    fn test_page_tree_cycle_terminates() {
        let data = pdf_with(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R 2 0 R] /Count 1 >>"),
                (3, "<< /Type /Page /Parent 2 0 R >>"),
            ],
            "<< /Size 4 /Root 1 0 R >>",
        );
        assert_eq!(parse(&data).unwrap().page_count(), 1);
    }

    #[test]
    fn test_max_page_depth() {
        let data = pdf_with(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [3 0 R] >>"),
                (3, "<< /Type /Pages /Kids [4 0 R] >>"),
                (4, "<< /Type /Page >>"),
            ],
            "<< /Size 5 /Root 1 0 R >>",
        );
        let shallow = ParserOptions {
            max_page_depth: 1,
            ..ParserOptions::lenient()
        };
        assert_eq!(parse_with_options(&data, &shallow).unwrap().page_count(), 0);
        assert_eq!(parse(&data).unwrap().page_count(), 1);
    }
}

mod object_scan_tests {
    use super::*;

    #[test]
    fn test_last_definition_wins() {
        let mut data = minimal();
        data.extend_from_slice(b"3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] >>\nendobj\n");
        let doc = parse(&data).unwrap();
        assert_eq!(doc.pages[0].media_box, MediaBox::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_marker_inside_stream_is_not_an_object() {
        let data = pdf_with(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
                (4, "<< /Length 20 >>\nstream\n9 0 obj << >> endobj\nendstream"),
            ],
            "<< /Size 5 /Root 1 0 R >>",
        );
        let doc = parse(&data).unwrap();
        assert!(doc.object(9).is_none());
        assert_eq!(doc.object(4).unwrap().stream.as_deref(), Some(&b"9 0 obj << >> endobj"[..]));
    }

    #[test]
    fn test_wrong_length_falls_back_to_physical() {
        let data = pdf_with(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
                (4, "<< /Length 999 >>\nstream\nhello\nendstream"),
            ],
            "<< /Size 5 /Root 1 0 R >>",
        );
        let doc = parse(&data).unwrap();
        assert_eq!(doc.object(4).unwrap().stream.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_missing_endobj_lenient_and_strict() {
        let mut data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_vec();
        data.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");
        data.extend_from_slice(b"5 0 obj\n<< /Broken true >>\n");
        data.extend_from_slice(b"6 0 obj\n42\nendobj\ntrailer\n<< /Root 1 0 R >>\n");

        let lenient = parse(&data).unwrap();
        assert!(lenient.object(5).is_none());
        assert_eq!(lenient.object(6).unwrap().dict, "42");

        let err = parse_with_options(&data, &ParserOptions::strict()).unwrap_err();
        assert!(matches!(err, Error::MissingEndobj(5)));
    }

    #[test]
    fn test_unterminated_stream() {
        let data = b"7 0 obj\n<< /Length 4 >>\nstream\nabcdefgh";
        let err = parser::find_object(data, 7).unwrap_err();
        assert!(matches!(err, Error::StreamUnterminated(7)));
    }

    #[test]
    fn test_max_object_number() {
        assert_eq!(parser::max_object_number(&minimal()), 3);
        assert_eq!(parser::max_object_number(b"no objects"), 0);
    }

    #[test]
    fn test_flate_stream_decoding() {
        let payload = b"BT /F1 12 Tf (Hi) Tj ET";
        let compressed = pdf_forge::decoders::encode_flate(payload).unwrap();
        let mut data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_vec();
        data.extend_from_slice(format!("4 0 obj\n<< /Length {} /Filter /FlateDecode >>\nstream\n", compressed.len()).as_bytes());
        data.extend_from_slice(&compressed);
        data.extend_from_slice(b"\nendstream\nendobj\ntrailer\n<< /Root 1 0 R >>\n");

        let doc = parse(&data).unwrap();
        assert_eq!(doc.decode_stream(4).unwrap(), payload);
        assert!(matches!(doc.decode_stream(1), Err(Error::AnchorNotFound("stream"))));
    }

    #[test]
    fn test_truncated_flate_stream_is_a_decode_error() {
        let payload: Vec<u8> = (0..4000u32).flat_map(|i| format!("{} 0 m {} 10 l S\n", i, i * 3).into_bytes()).collect();
        let compressed = pdf_forge::decoders::encode_flate(&payload).unwrap();
        let truncated = &compressed[..compressed.len() * 2 / 3];
        let mut data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_vec();
        data.extend_from_slice(format!("4 0 obj\n<< /Length {} /Filter /FlateDecode >>\nstream\n", truncated.len()).as_bytes());
        data.extend_from_slice(truncated);
        data.extend_from_slice(b"\nendstream\nendobj\ntrailer\n<< /Root 1 0 R >>\n");

        let doc = parse(&data).unwrap();
        let err = doc.decode_stream(4).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }
}

mod trailer_tests {
    use super::*;

    #[test]
    fn test_trailer_fields() {
        let data = pdf_with(
            &[(1, "<< /Type /Catalog /Pages 2 0 R >>"), (7, "<< /Title (x) >>")],
            "<< /Size 8 /Root 1 0 R /Info 7 0 R /Prev 100 /ID [<01> <02>] >>",
        );
        let trailer = parser::parse_trailer(&data).unwrap();
        assert_eq!(trailer.root, 1);
        assert_eq!(trailer.size, Some(8));
        assert_eq!(trailer.info, Some(7));
        assert_eq!(trailer.prev, Some(100));
        assert_eq!(trailer.id.as_deref(), Some("[<01> <02>]"));
        assert_eq!(trailer.startxref, Some(4));
    }

    #[test]
    fn test_root_recovered_from_catalog() {
        let data = pdf_with(
            &[
                (1, "<< /Type /Pages /Kids [] /Count 0 >>"),
                (2, "<< /Type /Catalog /Pages 1 0 R >>"),
            ],
            "<< /Size 3 >>",
        );
        assert_eq!(parse(&data).unwrap().trailer.root, 2);
    }

    #[test]
    fn test_no_root_anywhere() {
        let data = pdf_with(&[(1, "<< /Type /Pages >>")], "<< /Size 2 >>");
        assert!(matches!(parse(&data), Err(Error::AnchorNotFound("root"))));
    }

    #[test]
    fn test_xref_stream_unsupported() {
        let data = b"%PDF-1.5\n1 0 obj\n<< /Type /XRef /Size 2 /Root 2 0 R /Length 0 >>\nstream\n\nendstream\nendobj\nstartxref\n9\n%%EOF\n";
        let err = parse(data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_encrypted_unsupported() {
        let data = pdf_with(
            &[(1, "<< /Type /Catalog /Pages 2 0 R >>")],
            "<< /Size 2 /Root 1 0 R /Encrypt 5 0 R >>",
        );
        assert_eq!(parse(&data).unwrap_err().kind(), ErrorKind::Unsupported);
    }
}
