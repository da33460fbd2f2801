use mailparse::{body::Body, DispositionType, MailHeaderMap, ParsedMail};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    pub name: String,
    /// Value bytes as received, still folded and encoded.
    pub value: Vec<u8>,
}

/// One leaf body part with its payload still transfer-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPart {
    /// Lower-cased MIME type without parameters, e.g. `text/plain`.
    pub content_type: String,
    pub charset: Option<String>,
    pub transfer_encoding: Option<String>,
    pub disposition: Option<String>,
    pub payload: Vec<u8>,
}

impl RawPart {
    pub fn new(content_type: &str, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.trim().to_ascii_lowercase(),
            charset: None,
            transfer_encoding: None,
            disposition: None,
            payload: payload.into(),
        }
    }

    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = Some(charset.to_string());
        self
    }

    pub fn with_transfer_encoding(mut self, encoding: &str) -> Self {
        self.transfer_encoding = Some(encoding.to_string());
        self
    }

    pub fn with_disposition(mut self, disposition: &str) -> Self {
        self.disposition = Some(disposition.to_string());
        self
    }

    /// Untyped parts default to `text/plain`.
    pub fn is_textual(&self) -> bool {
        self.content_type.is_empty() || self.content_type.starts_with("text/")
    }

    pub fn is_attachment(&self) -> bool {
        self.disposition
            .as_deref()
            .map(|d| d.trim().eq_ignore_ascii_case("attachment"))
            .unwrap_or(false)
    }
}

/// A message as received: headers, leaf parts and the undecoded body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    pub headers: Vec<RawHeader>,
    pub parts: Vec<RawPart>,
    body_raw: Option<String>,
}

impl RawMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: &str, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push(RawHeader {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn part(mut self, part: RawPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_body_raw(mut self, body_raw: impl Into<String>) -> Self {
        self.body_raw = Some(body_raw.into());
        self
    }

    /// Parse RFC 5322 bytes. A message that cannot be parsed is kept as a
    /// single plain-text part holding the lossy bytes.
    pub fn parse(bytes: &[u8]) -> Self {
        match Self::try_parse(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "Unparseable message, keeping raw text");
                let text = String::from_utf8_lossy(bytes).into_owned();
                Self::new()
                    .part(RawPart::new("text/plain", text.as_bytes()))
                    .with_body_raw(text)
            }
        }
    }

    pub fn try_parse(bytes: &[u8]) -> Result<Self> {
        let (headers, body_offset) = mailparse::parse_headers(bytes)?;
        let parsed = mailparse::parse_mail(bytes)?;

        let mut parts = Vec::new();
        collect_leaves(&parsed, &mut parts);

        let body = &bytes[body_offset.min(bytes.len())..];
        Ok(Self {
            headers: headers
                .iter()
                .map(|h| RawHeader {
                    name: h.get_key(),
                    value: h.get_value_raw().to_vec(),
                })
                .collect(),
            parts,
            body_raw: Some(String::from_utf8_lossy(body).into_owned()),
        })
    }

    /// First value of header `name`, case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_slice())
    }

    /// The undecoded body. Built messages without an explicit raw body
    /// use their part payloads joined by newlines.
    pub fn body_raw(&self) -> String {
        match &self.body_raw {
            Some(raw) => raw.clone(),
            None => self
                .parts
                .iter()
                .map(|p| String::from_utf8_lossy(&p.payload))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// SHA-256 over the raw header bytes and raw body, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for header in &self.headers {
            hasher.update(header.name.as_bytes());
            hasher.update(b":");
            hasher.update(&header.value);
            hasher.update(b"\n");
        }
        hasher.update(b"\n");
        hasher.update(self.body_raw().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

fn collect_leaves(mail: &ParsedMail, out: &mut Vec<RawPart>) {
    if mail.subparts.is_empty() {
        out.push(leaf_part(mail));
        return;
    }
    for sub in &mail.subparts {
        collect_leaves(sub, out);
    }
}

fn leaf_part(mail: &ParsedMail) -> RawPart {
    let payload = match mail.get_body_encoded() {
        Body::Base64(body) | Body::QuotedPrintable(body) => body.get_raw().to_vec(),
        Body::SevenBit(body) | Body::EightBit(body) => body.get_raw().to_vec(),
        Body::Binary(body) => body.get_raw().to_vec(),
    };

    let disposition = mail
        .headers
        .get_first_value("Content-Disposition")
        .map(|_| match mail.get_content_disposition().disposition {
            DispositionType::Inline => "inline".to_string(),
            DispositionType::Attachment => "attachment".to_string(),
            DispositionType::FormData => "form-data".to_string(),
            DispositionType::Extension(other) => other.to_ascii_lowercase(),
        });

    RawPart {
        content_type: mail.ctype.mimetype.to_ascii_lowercase(),
        charset: mail.ctype.params.get("charset").cloned(),
        transfer_encoding: mail
            .headers
            .get_first_value("Content-Transfer-Encoding")
            .map(|v| v.trim().to_ascii_lowercase()),
        disposition,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &[u8] = b"From: Ann <ann@x.com>\r\n\
To: bob@x.com\r\n\
Subject: Report\r\n\
Message-ID: <m1@x.com>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"OUTER\"\r\n\
\r\n\
--OUTER\r\n\
Content-Type: multipart/alternative; boundary=\"INNER\"\r\n\
\r\n\
--INNER\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Caf=E9 report\r\n\
--INNER\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Cafe report</p>\r\n\
--INNER--\r\n\
--OUTER\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"r.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0=\r\n\
--OUTER--\r\n";

    #[test]
    fn test_parse_collects_leaves_in_order() {
        let msg = RawMessage::try_parse(MULTIPART).expect("parses");
        let types: Vec<&str> = msg.parts.iter().map(|p| p.content_type.as_str()).collect();
        assert_eq!(types, ["text/plain", "text/html", "application/pdf"]);

        let plain = &msg.parts[0];
        assert_eq!(plain.charset.as_deref(), Some("iso-8859-1"));
        assert_eq!(plain.transfer_encoding.as_deref(), Some("quoted-printable"));
        assert!(String::from_utf8_lossy(&plain.payload).contains("Caf=E9"));

        assert!(msg.parts[2].is_attachment());
        assert!(!msg.parts[2].is_textual());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let msg = RawMessage::try_parse(MULTIPART).expect("parses");
        assert_eq!(msg.header_value("message-id"), Some(&b"<m1@x.com>"[..]));
        assert_eq!(msg.header_value("In-Reply-To"), None);
        assert!(msg.body_raw().starts_with("--OUTER"));
    }

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let a = RawMessage::parse(MULTIPART);
        let b = RawMessage::parse(MULTIPART);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let c = RawMessage::new().header("Subject", "x").part(RawPart::new("text/plain", "y"));
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_builder_body_raw_defaults_to_payloads() {
        let msg = RawMessage::new()
            .part(RawPart::new("text/plain", "one"))
            .part(RawPart::new("text/plain", "two"));
        assert_eq!(msg.body_raw(), "one\ntwo");
        assert_eq!(msg.clone().with_body_raw("raw").body_raw(), "raw");
    }
}
