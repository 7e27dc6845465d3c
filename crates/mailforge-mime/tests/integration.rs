//! Integration tests for building, serializing and re-reading part trees.

use mailforge_mime::canonical::{
    ContentComparators, DEFAULT_IGNORED_HEADERS, canonical_headers, canonical_structure,
};
use mailforge_mime::{Charset, ContentType, Headers, Part, TransferEncoding};

fn text_leaf(sub_type: &str, text: &str) -> Part {
    let (charset, bytes) = Charset::negotiate(text).unwrap();
    Part::leaf(
        &ContentType::text(sub_type, charset.name()),
        charset.transfer_encoding(),
        &bytes,
    )
}

fn newsletter(boundary: &str) -> Part {
    let image = Part::leaf(
        &ContentType::new("image", "png").with_parameter("name", "logo.png"),
        TransferEncoding::Base64,
        &[0x89, b'P', b'N', b'G', 0, 1, 2, 3],
    );
    let related = Part::multipart(
        &ContentType::multipart("related", format!("{boundary}-rel-1"))
            .with_parameter("type", "text/html"),
        vec![text_leaf("html", "<p>Caf\u{e9}</p>"), image],
    )
    .unwrap();
    let alternative = Part::multipart(
        &ContentType::multipart("alternative", format!("{boundary}-alt-1")),
        vec![text_leaf("plain", "Hello \u{21d2} world\n"), related],
    )
    .unwrap();
    let mut root = Part::multipart(
        &ContentType::multipart("mixed", format!("{boundary}-mix-1")),
        vec![alternative, text_leaf("plain", "attached\n")],
    )
    .unwrap();
    root.headers.set("Subject", "Caf\u{e9} news");
    root.headers.set_default_first("MIME-Version", "1.0");
    root
}

#[test]
fn test_negotiated_encodings() {
    let ascii = text_leaf("plain", "Hello");
    assert_eq!(ascii.transfer_encoding(), TransferEncoding::SevenBit);
    assert_eq!(ascii.content_type().charset(), Some("us-ascii"));

    let latin = text_leaf("plain", "Caf\u{e9}");
    assert_eq!(latin.transfer_encoding(), TransferEncoding::QuotedPrintable);
    assert_eq!(latin.content_type().charset(), Some("iso-8859-1"));

    let utf8 = text_leaf("plain", "Hello \u{21d2} world");
    assert_eq!(utf8.transfer_encoding(), TransferEncoding::Base64);
    assert_eq!(utf8.content_type().charset(), Some("utf-8"));
}

#[test]
fn test_serialized_tree_reads_back() {
    let original = newsletter("seed");
    let wire = String::from_utf8(original.to_bytes()).unwrap();
    assert!(wire.starts_with("MIME-Version: 1.0\nSubject: =?utf-8?B?"));
    assert!(!wire.contains('\r'));

    let parsed = Part::parse(wire.as_bytes()).unwrap();
    assert_eq!(parsed.headers.get("subject"), Some("Caf\u{e9} news"));
    assert_eq!(
        canonical_structure(&parsed),
        "multipart/mixed\n\
         |-- multipart/alternative\n\
         |   |-- text/plain\n\
         |   `-- multipart/related\n\
         |       |-- text/html\n\
         |       `-- image/png\n\
         `-- text/plain\n"
    );

    let leaves: Vec<&Part> = parsed.walk().into_iter().filter(|p| !p.is_multipart()).collect();
    let plain = Charset::Utf8.decode(&leaves[0].decoded_body().unwrap()).unwrap();
    assert_eq!(plain, "Hello \u{21d2} world\n");
    let html = Charset::Latin1.decode(&leaves[1].decoded_body().unwrap()).unwrap();
    assert_eq!(html, "<p>Caf\u{e9}</p>");
    assert_eq!(leaves[2].decoded_body().unwrap(), [0x89, b'P', b'N', b'G', 0, 1, 2, 3]);
}

#[test]
fn test_crlf_wire_form_is_equivalent() {
    let lf = newsletter("a").to_bytes();
    let crlf = String::from_utf8(newsletter("b").to_bytes())
        .unwrap()
        .replace('\n', "\r\n");

    let (left, right) = (Part::parse(&lf).unwrap(), Part::parse(crlf.as_bytes()).unwrap());
    assert_eq!(canonical_structure(&left), canonical_structure(&right));
    assert_eq!(
        canonical_headers(&left, &DEFAULT_IGNORED_HEADERS),
        canonical_headers(&right, &DEFAULT_IGNORED_HEADERS)
    );
    ContentComparators::default().compare(&left, &right).unwrap();
}

#[test]
fn test_custom_comparator_localizes_mismatch() {
    let expected = newsletter("x");
    let mut actual = newsletter("x");
    if let mailforge_mime::Body::Multipart(children) = &mut actual.body {
        children[1] = text_leaf("plain", "ATTACHED\n");
    }

    let strict = ContentComparators::default();
    let mismatch = strict.compare(&actual, &expected).unwrap_err();
    assert_eq!(mismatch.path, [1]);

    let mut lenient = ContentComparators::default();
    lenient.register("text/plain", |a, b| {
        if a.eq_ignore_ascii_case(b) {
            Ok(())
        } else {
            Err("differs beyond case".to_string())
        }
    });
    lenient.compare(&actual, &expected).unwrap();
}

#[test]
fn test_header_block_round_trip() {
    let headers: Headers = [
        ("message-id", "<1@example.com>"),
        ("cc", "a@example.com"),
        ("x-note", "r\u{e9}sum\u{e9}"),
    ]
    .into_iter()
    .collect();
    let text = headers.to_string();
    assert!(text.starts_with("Message-ID: <1@example.com>\nCC: a@example.com\nX-Note: =?utf-8?B?"));
    let parsed = Headers::parse(&text);
    assert_eq!(parsed.len(), 3);
    for (name, value) in headers.iter() {
        assert_eq!(parsed.get(name), Some(value));
    }
}
