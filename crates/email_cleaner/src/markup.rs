//! HTML to visible text

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::normalizer::collapse_whitespace;

static ROOT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<\s*(?:html|body)[\s>/]").expect("root tag regex"));

/// Render width. Wide enough that long tokens such as URLs are not split
/// across lines before the whitespace collapse.
const RENDER_WIDTH: usize = 10_000;

/// True when the text contains a root markup tag (`<html` or `<body`).
pub fn looks_like_markup(text: &str) -> bool {
    ROOT_TAG.is_match(text)
}

/// Render markup to text and join it with single spaces. Input html2text
/// cannot render is kept as is.
pub fn strip_markup(html: &str) -> String {
    let rendered = html2text::from_read(html.as_bytes(), RENDER_WIDTH).unwrap_or_else(|e| {
        debug!("html2text failed, keeping raw markup: {}", e);
        html.to_string()
    });
    collapse_whitespace(&rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_simple_document() {
        let html = "<html><head><style>p { color: red; }</style></head>\
                    <body><p>Hello there</p><div>Second&nbsp;block</div></body></html>";
        let text = strip_markup(html);
        assert!(text.starts_with("Hello there"));
        assert!(text.contains("Second"));
        assert!(text.contains("block"));
        assert!(!text.contains('<'));
        assert!(!text.contains("color"));
    }

    #[test]
    fn test_block_boundaries_become_spaces() {
        assert_eq!(strip_markup("<p>one</p><p>two</p>"), "one two");
        assert_eq!(strip_markup("line<br/>break"), "line break");
    }

    #[test]
    fn test_named_entities_decoded() {
        assert_eq!(
            strip_markup("<p>Caf&eacute; costs 5&euro; &rarr; ok</p>"),
            "Café costs 5€ → ok"
        );
        assert_eq!(strip_markup("<p>1 &lt; 2 &amp;&amp; 3 &gt; 2</p>"), "1 < 2 && 3 > 2");
    }

    #[test]
    fn test_numeric_entities() {
        assert_eq!(strip_markup("<p>caf&#233; &#x263A;</p>"), "café ☺");
    }

    #[test]
    fn test_script_and_comments_dropped() {
        let html = "<html><body><p>kept<!-- hidden --></p>\
                    <script type=\"x\">var s = 1;</script></body></html>";
        let text = strip_markup(html);
        assert!(text.contains("kept"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("var s"));
    }

    #[test]
    fn test_long_tokens_are_not_split() {
        let url = format!("https://example.com/{}", "a".repeat(200));
        assert_eq!(strip_markup(&format!("<p>{}</p>", url)), url);
    }

    #[test]
    fn test_root_tag_sniffing() {
        assert!(looks_like_markup("<!DOCTYPE html><HTML lang=en>"));
        assert!(looks_like_markup("<body>"));
        assert!(!looks_like_markup("<bodyguard> is not a tag we sniff"));
        assert!(!looks_like_markup("plain text"));
    }
}
