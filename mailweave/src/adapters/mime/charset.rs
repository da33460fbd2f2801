//! Bytes to text with a fixed fallback order
//!
//! 1. the declared charset, if `encoding_rs` knows the label and the bytes
//!    decode without errors
//! 2. detection: a BOM, then strict UTF-8, then ISO-2022-JP escapes, then
//!    `chardetng`'s statistical guess
//! 3. UTF-8 with U+FFFD substitution, which never fails

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, ISO_2022_JP, UTF_8};
use tracing::debug;

const ESC: u8 = 0x1b;

/// Decode `bytes` to text. Never fails.
pub fn decode_text(bytes: &[u8], declared: Option<&str>) -> String {
    if let Some(label) = declared {
        if let Some(text) = decode_declared(bytes, label) {
            return text;
        }
        debug!(charset = label, "Declared charset unusable, detecting");
    }

    if let Some(text) = decode_detected(bytes) {
        return text;
    }

    String::from_utf8_lossy(bytes).into_owned()
}

fn decode_declared(bytes: &[u8], label: &str) -> Option<String> {
    let encoding = Encoding::for_label(label.trim().as_bytes())?;
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

fn decode_detected(bytes: &[u8]) -> Option<String> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return encoding
            .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
            .map(|text| text.into_owned());
    }

    let encoding = detect(bytes);
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

/// Guess the encoding of BOM-less bytes.
pub fn detect(bytes: &[u8]) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }
    if is_iso_2022_jp(bytes) {
        return ISO_2022_JP;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, false)
}

fn is_iso_2022_jp(bytes: &[u8]) -> bool {
    bytes.windows(3).any(|w| {
        w[0] == ESC && matches!((w[1], w[2]), (b'$', b'B') | (b'$', b'@') | (b'(', b'J'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_charset_wins() {
        // "café" in ISO-8859-1
        let bytes = b"caf\xe9";
        assert_eq!(decode_text(bytes, Some("iso-8859-1")), "café");
        assert_eq!(decode_text("café".as_bytes(), Some("UTF-8")), "café");
    }

    #[test]
    fn test_bad_declared_charset_falls_back() {
        // valid UTF-8 labelled as something unknown
        assert_eq!(decode_text("naïve".as_bytes(), Some("x-unknown")), "naïve");
        // invalid for the declared charset, detection picks windows-1252
        assert_eq!(
            decode_text(b"\x93Caf\xe9 cr\xe8me\x94 is back on the menu", Some("utf-8")),
            "\u{201c}Café crème\u{201d} is back on the menu"
        );
    }

    #[test]
    fn test_detection_without_declaration() {
        assert_eq!(decode_text(b"plain ascii", None), "plain ascii");
        assert_eq!(decode_text(b"\xef\xbb\xbfwith bom", None), "with bom");
        assert_eq!(detect(b"\x1b$B$3$s\x1b(B"), ISO_2022_JP);
    }

    #[test]
    fn test_undeclared_legacy_encodings() {
        let text = "会議は明日の十時です。資料を事前に確認してください。";
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode(text);
        assert_eq!(detect(&bytes), encoding_rs::SHIFT_JIS);
        assert_eq!(decode_text(&bytes, None), text);

        let short = "会議は明日の十時です";
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode(short);
        assert_eq!(decode_text(&bytes, None), short);

        let text = "Совещание переносится на четверг, пожалуйста подтвердите участие";
        let (bytes, _, _) = encoding_rs::WINDOWS_1251.encode(text);
        assert_eq!(decode_text(&bytes, None), text);
    }

    #[test]
    fn test_lossy_last_resort() {
        // broken ISO-2022-JP: escape into JIS X 0208 with an odd trailing byte
        assert_eq!(decode_text(b"\x1b$B\x24", None), "\u{1b}$B$");
    }
}
