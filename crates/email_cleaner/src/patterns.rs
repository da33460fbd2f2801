use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::CleanerError;

/// A named group of boilerplate patterns removed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternFamily {
    pub name: String,
    pub patterns: Vec<String>,
}

impl PatternFamily {
    pub fn new<S: Into<String>>(name: &str, patterns: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.to_string(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered boilerplate pattern families.
///
/// Families are applied in order and every match is replaced by a single
/// space. All patterns are compiled case-insensitive, multi-line (`^`/`$`
/// match at line boundaries) and with `.` matching newlines, so a pattern
/// that must stay on one line uses `[^\n]` instead of `.`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSet {
    pub families: Vec<PatternFamily>,
}

const HEADER_ECHOES: &[&str] = &[
    r"^[ \t]*(?:from|to|subject|date|cc|bcc|reply-to|return-path|message-id|content-type|content-transfer-encoding):[^\n]*(?:\n[ \t]+[^\n]*)*",
];

const FORWARD_BANNERS: &[&str] = &[
    r"-{2,}[ \t]*forwarded message.*",
    r"begin forwarded message:.*",
    r"-{2,}[ \t]*original message.*",
];

const REPLY_ATTRIBUTIONS: &[&str] = &[
    r"\bon\s.{0,200}?\bwrote:.*",
    r"\bfrom:.{0,200}?\bsent:.{0,200}?\bto:.{0,500}?\bsubject:.*",
    r"^[ \t]*sent:[^\n]*\n.*",
];

const SIGNATURES: &[&str] = &[
    r"^-{2,}[ \t]*$.*",
    r"(?:\A|^|[.!?][ \t]+)[ \t]*(?:best regards|kind regards|warm regards|regards|many thanks|thanks|cheers|sincerely),.*",
];

const QUOTED_LINES: &[&str] = &[r"^[ \t]*>[^\n]*\n?", r"^[ \t]*\|[^\n]*\n?"];

const ATTACHMENT_PLACEHOLDERS: &[&str] = &[r"\[image:[^\]]*\]", r"\[cid:[^\]]*\]", r"<image\d+>"];

impl PatternSet {
    /// The built-in families, in removal order.
    pub fn builtin() -> Self {
        Self {
            families: vec![
                PatternFamily::new("headers", HEADER_ECHOES.iter().copied()),
                PatternFamily::new("forwarded", FORWARD_BANNERS.iter().copied()),
                PatternFamily::new("replies", REPLY_ATTRIBUTIONS.iter().copied()),
                PatternFamily::new("signatures", SIGNATURES.iter().copied()),
                PatternFamily::new("quoted", QUOTED_LINES.iter().copied()),
                PatternFamily::new("attachments", ATTACHMENT_PLACEHOLDERS.iter().copied()),
            ],
        }
    }

    pub fn empty() -> Self {
        Self {
            families: Vec::new(),
        }
    }

    pub fn with_family(mut self, family: PatternFamily) -> Self {
        self.families.push(family);
        self
    }

    pub fn family(&self, name: &str) -> Option<&PatternFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    pub(crate) fn compile(&self) -> Result<Vec<CompiledFamily>, CleanerError> {
        self.families
            .iter()
            .map(|family| {
                let regexes = family
                    .patterns
                    .iter()
                    .map(|pattern| {
                        RegexBuilder::new(pattern)
                            .case_insensitive(true)
                            .multi_line(true)
                            .dot_matches_new_line(true)
                            .build()
                            .map_err(|source| CleanerError::InvalidPattern {
                                family: family.name.clone(),
                                pattern: pattern.clone(),
                                source,
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(CompiledFamily {
                    name: family.name.clone(),
                    regexes,
                })
            })
            .collect()
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Debug)]
pub(crate) struct CompiledFamily {
    pub name: String,
    pub regexes: Vec<Regex>,
}

impl CompiledFamily {
    /// Replace every match of every pattern in this family with a space.
    pub fn remove_from(&self, text: &str) -> String {
        let mut current = text.to_string();
        for regex in &self.regexes {
            if regex.is_match(&current) {
                current = regex.replace_all(&current, " ").into_owned();
            }
        }
        current
    }
}
