//! Source text decoding.
//!
//! FB2 files in the wild are UTF-8 or a legacy single-byte code page
//! (mostly windows-1251), announced in the XML declaration.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};

use crate::error::{Error, Result};

/// Decode FB2 bytes to a string.
///
/// 1. A byte order mark selects its encoding and is dropped
/// 2. Otherwise the encoding named in `<?xml encoding="..."?>`
/// 3. Otherwise UTF-8
///
/// Bytes that are not valid in the selected encoding are an error; nothing
/// is replaced or guessed.
pub fn decode_source(bytes: &[u8]) -> Result<Cow<'_, str>> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => match declared_encoding(bytes) {
            Some(label) => {
                let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                    Error::Encoding(format!("unsupported encoding \"{label}\""))
                })?;
                // A readable declaration means the bytes are ASCII compatible
                if !encoding.is_ascii_compatible() {
                    return Err(Error::Encoding(format!(
                        "{label} declared without a byte order mark"
                    )));
                }
                (encoding, bytes)
            }
            None => (UTF_8, bytes),
        },
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or_else(|| {
            Error::Encoding(format!("invalid {} byte sequence", encoding.name()))
        })
}

/// The `encoding` pseudo-attribute of the XML declaration, if any.
pub fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(256)];
    let head = String::from_utf8_lossy(head);
    let decl = head.trim_start_matches('\u{feff}').trim_start();
    let decl = decl.strip_prefix("<?xml")?;
    let decl = &decl[..decl.find("?>")?];

    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let end = value.find(quote)?;
    Some(value[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_encoding() {
        let xml = br#"<?xml version="1.0" encoding="windows-1251"?><FictionBook/>"#;
        assert_eq!(declared_encoding(xml).as_deref(), Some("windows-1251"));

        let xml = b"<?xml version='1.0' encoding = 'koi8-r' ?>";
        assert_eq!(declared_encoding(xml).as_deref(), Some("koi8-r"));

        assert_eq!(declared_encoding(b"<?xml version=\"1.0\"?>"), None);
        assert_eq!(declared_encoding(b"<FictionBook/>"), None);
    }

    #[test]
    fn test_utf8_passthrough() {
        let text = "<p>Привет</p>";
        assert_eq!(decode_source(text.as_bytes()).unwrap(), text);
    }

    #[test]
    fn test_utf8_bom_dropped() {
        let bytes = b"\xEF\xBB\xBF<p/>";
        assert_eq!(decode_source(bytes).unwrap(), "<p/>");
    }

    #[test]
    fn test_declared_cp1251_wins_over_utf8() {
        // C2 B8 is also valid UTF-8 ("¸"), but the declaration says 1251
        let mut bytes = br#"<?xml version="1.0" encoding="windows-1251"?><p>"#.to_vec();
        bytes.extend_from_slice(&[0xC2, 0xB8]);
        bytes.extend_from_slice(b"</p>");
        let text = decode_source(&bytes).unwrap();
        assert!(text.ends_with("<p>Вё</p>"), "{text}");
    }

    #[test]
    fn test_invalid_declared_utf8_fails() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><p>caf\xE9 \xFF</p>";
        assert!(matches!(decode_source(bytes), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_undeclared_non_utf8_fails() {
        assert!(matches!(
            decode_source(b"<p>caf\xE9</p>"),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn test_utf16_needs_bom() {
        let bytes = br#"<?xml version="1.0" encoding="UTF-16"?><p/>"#;
        assert!(matches!(decode_source(bytes), Err(Error::Encoding(_))));

        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<p>Ж</p>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_source(&bytes).unwrap(), "<p>Ж</p>");
    }

    #[test]
    fn test_unknown_label_fails() {
        let bytes = br#"<?xml version="1.0" encoding="x-klingon"?><p/>"#;
        match decode_source(bytes) {
            Err(Error::Encoding(msg)) => assert!(msg.contains("x-klingon"), "{msg}"),
            other => panic!("expected encoding error, got {other:?}"),
        }
    }
}
