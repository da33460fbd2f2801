use base64::Engine;
use chrono::{DateTime, Utc};
use email_cleaner::{ContentKind, Fragment};
use tracing::{debug, warn};

use super::charset;
use super::raw::{RawMessage, RawPart};
use crate::error::{MailweaveError, Result};

/// Header values needed downstream, decoded to text.
///
/// Identity headers (Message-ID, In-Reply-To, References) are only unfolded,
/// never encoded-word decoded, so malformed values reach the resolver as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedHeaders {
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub headers: DecodedHeaders,
    /// Textual, non-attachment parts in traversal order.
    pub fragments: Vec<Fragment>,
    pub body_raw: String,
    pub fingerprint: String,
}

impl DecodedMessage {
    /// True when every textual part decoded to nothing.
    pub fn is_degraded(&self) -> bool {
        self.fragments.iter().all(Fragment::is_empty)
    }
}

/// Decode headers and every textual part of `raw`. Never fails: parts that
/// cannot be decoded become empty fragments.
pub fn decode(raw: &RawMessage) -> DecodedMessage {
    let fragments: Vec<Fragment> = raw.parts.iter().filter_map(decode_part).collect();
    debug!(
        parts = raw.parts.len(),
        fragments = fragments.len(),
        "Decoded message parts"
    );

    DecodedMessage {
        headers: decode_headers(raw),
        fragments,
        body_raw: raw.body_raw(),
        fingerprint: raw.fingerprint(),
    }
}

/// `None` for parts that are skipped entirely: non-text or attachments.
pub fn decode_part(part: &RawPart) -> Option<Fragment> {
    if !part.is_textual() || part.is_attachment() {
        return None;
    }

    let kind = ContentKind::from_mime(&part.content_type);
    let text = match transfer_decode(&part.payload, part.transfer_encoding.as_deref()) {
        Ok(bytes) => charset::decode_text(&bytes, part.charset.as_deref()),
        Err(e) => {
            warn!(error = %e, content_type = %part.content_type, "Undecodable part, using empty text");
            String::new()
        }
    };

    Some(Fragment::new(text, kind))
}

/// Undo the content transfer encoding. Unknown encodings pass through.
pub fn transfer_decode(payload: &[u8], encoding: Option<&str>) -> Result<Vec<u8>> {
    let encoding = encoding.map(|e| e.trim().to_ascii_lowercase());
    match encoding.as_deref() {
        Some("base64") => {
            let cleaned: Vec<u8> = payload
                .iter()
                .filter(|b| !b.is_ascii_whitespace())
                .copied()
                .collect();
            base64::engine::general_purpose::STANDARD
                .decode(&cleaned)
                .map_err(|e| MailweaveError::Decode(format!("base64: {}", e)))
        }
        Some("quoted-printable") => {
            quoted_printable::decode(payload, quoted_printable::ParseMode::Robust)
                .map_err(|e| MailweaveError::Decode(format!("quoted-printable: {}", e)))
        }
        _ => Ok(payload.to_vec()),
    }
}

fn decode_headers(raw: &RawMessage) -> DecodedHeaders {
    let text = |name: &str| raw.header_value(name).map(decode_header_value);
    let identity = |name: &str| {
        raw.header_value(name)
            .map(|v| unfold(&String::from_utf8_lossy(v)).trim().to_string())
            .filter(|v| !v.is_empty())
    };

    DecodedHeaders {
        message_id: identity("Message-ID"),
        in_reply_to: identity("In-Reply-To"),
        references: identity("References"),
        subject: text("Subject").unwrap_or_default(),
        from: text("From").unwrap_or_default(),
        to: text("To").map(|v| split_address_list(&v)).unwrap_or_default(),
        cc: text("Cc").map(|v| split_address_list(&v)).unwrap_or_default(),
        date: text("Date").and_then(|v| parse_date(&v)),
    }
}

/// Decode a header value to text: heuristic charset for raw 8-bit bytes,
/// then RFC 2047 encoded words.
pub fn decode_header_value(raw: &[u8]) -> String {
    let text = unfold(&charset::decode_text(raw, None));
    if !text.contains("=?") || !text.is_ascii() {
        return text.trim().to_string();
    }

    let fake_header = format!("X: {}", text);
    match mailparse::parse_header(fake_header.as_bytes()) {
        Ok((header, _)) => header.get_value().trim().to_string(),
        Err(_) => text.trim().to_string(),
    }
}

fn unfold(value: &str) -> String {
    value.replace("\r\n", "").replace('\n', "")
}

/// Split an address-list header into individual addresses.
pub fn split_address_list(value: &str) -> Vec<String> {
    match mailparse::addrparse(value) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                mailparse::MailAddr::Single(info) => vec![info.to_string()],
                mailparse::MailAddr::Group(group) => {
                    group.addrs.iter().map(|info| info.to_string()).collect()
                }
            })
            .collect(),
        Err(_) => value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    }
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let secs = mailparse::dateparse(value).ok()?;
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_part_with_declared_charset() {
        // "Grüße" in ISO-8859-1, base64 with a line break
        let part = RawPart::new("text/plain", "R3L8\r\n32U=")
            .with_charset("iso-8859-1")
            .with_transfer_encoding("base64");
        let fragment = decode_part(&part).expect("textual part");
        assert_eq!(fragment.text, "Grüße");
        assert_eq!(fragment.kind, ContentKind::Plain);
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        let part = RawPart::new("text/html", "<p>long =\r\nline caf=C3=A9</p>")
            .with_transfer_encoding("Quoted-Printable");
        let fragment = decode_part(&part).expect("textual part");
        assert_eq!(fragment.text, "<p>long line café</p>");
        assert_eq!(fragment.kind, ContentKind::Html);
    }

    #[test]
    fn test_undecodable_part_is_empty_not_skipped() {
        let raw = RawMessage::new()
            .part(RawPart::new("text/plain", "@@@@ not base64").with_transfer_encoding("base64"))
            .part(RawPart::new("text/plain", "fine"));
        let decoded = decode(&raw);
        assert_eq!(decoded.fragments.len(), 2);
        assert_eq!(decoded.fragments[0].text, "");
        assert_eq!(decoded.fragments[1].text, "fine");
        assert!(!decoded.is_degraded());
    }

    #[test]
    fn test_non_text_and_attachments_skipped() {
        let raw = RawMessage::new()
            .part(RawPart::new("image/png", vec![0x89, 0x50]))
            .part(RawPart::new("text/plain", "notes").with_disposition("attachment"))
            .part(RawPart::new("text/plain", "body"));
        let decoded = decode(&raw);
        assert_eq!(decoded.fragments, vec![Fragment::plain("body")]);
    }

    #[test]
    fn test_encoded_word_headers() {
        assert_eq!(
            decode_header_value(b"=?UTF-8?B?UmU6IEJ1ZGdldCByZXZpZXc=?="),
            "Re: Budget review"
        );
        assert_eq!(
            decode_header_value(b"=?iso-8859-1?Q?Caf=E9?= meeting"),
            "Café meeting"
        );
        assert_eq!(decode_header_value(b"Plain\r\n subject"), "Plain subject");
        // raw 8-bit latin-1 falls back to detection
        assert_eq!(
            decode_header_value(b"R\xe9union de l'\xe9quipe"),
            "Réunion de l'équipe"
        );
    }

    #[test]
    fn test_headers_from_parsed_message() {
        let raw = RawMessage::parse(
            b"From: =?UTF-8?Q?Ren=C3=A9e?= <renee@x.com>\r\n\
To: \"Lee, Ann\" <ann@x.com>, bob@x.com\r\n\
Cc: team: carl@x.com, dee@x.com;\r\n\
Subject: Re: Plans\r\n\
Date: Tue, 3 Mar 2026 10:00:00 +0000\r\n\
Message-ID: <m2@x.com>\r\n\
In-Reply-To: <m1@x.com>\r\n\
References: <m0@x.com>\r\n <m1@x.com>\r\n\
\r\n\
Sounds good.\r\n",
        );
        let headers = decode(&raw).headers;
        assert_eq!(headers.from, "Renée <renee@x.com>");
        assert_eq!(headers.to.len(), 2);
        assert!(headers.to[0].contains("ann@x.com"));
        assert_eq!(headers.cc.len(), 2);
        assert_eq!(headers.message_id.as_deref(), Some("<m2@x.com>"));
        assert_eq!(headers.references.as_deref(), Some("<m0@x.com> <m1@x.com>"));
        assert_eq!(
            headers.date.map(|d| d.to_rfc3339()),
            Some("2026-03-03T10:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_address_list_fallback() {
        assert_eq!(
            split_address_list("a@x.com, b@x.com"),
            vec!["a@x.com".to_string(), "b@x.com".to_string()]
        );
    }
}
