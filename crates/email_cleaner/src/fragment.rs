use serde::{Deserialize, Serialize};

use crate::markup;

/// Declared content kind of a decoded body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// `text/plain`
    Plain,
    /// `text/html`
    Html,
    /// Any other `text/*` subtype (enriched, calendar, csv, ...)
    Other,
}

impl ContentKind {
    /// Map a MIME type such as `text/html; charset=utf-8` to a content kind.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "text/plain" | "" => Self::Plain,
            "text/html" | "application/xhtml+xml" => Self::Html,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Html => "html",
            Self::Other => "other",
        }
    }
}

/// One decoded text part of a message, in original traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    pub kind: ContentKind,
}

impl Fragment {
    pub fn new(text: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, ContentKind::Plain)
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self::new(text, ContentKind::Html)
    }

    /// True when the fragment is declared as HTML or its text carries a
    /// root markup tag.
    pub fn is_markup(&self) -> bool {
        self.kind == ContentKind::Html || markup::looks_like_markup(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
