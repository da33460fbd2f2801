use tracing::{debug, warn};

use crate::error::CleanerError;
use crate::fragment::Fragment;
use crate::markup;
use crate::patterns::{CompiledFamily, PatternSet};
use crate::validate::{ValidationRules, Validator};

/// Upper bound on repeated boilerplate passes. Each pass only removes
/// text, so real input settles in two or three.
const MAX_PASSES: usize = 8;

/// Output of a normalization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub is_valid: bool,
}

/// Compiled cleaning pipeline.
///
/// Processing order is fixed and later passes rely on earlier ones:
/// markup stripping per fragment, concatenation with single spaces,
/// boilerplate removal family by family, whitespace collapse.
///
/// Removing one family can expose a match for an earlier one (a placeholder
/// in front of a quoted line, say), so removal repeats until the text stops
/// changing. Normalizing already normalized text is a no-op.
#[derive(Debug)]
pub struct Normalizer {
    families: Vec<CompiledFamily>,
    validator: Validator,
}

impl Normalizer {
    pub fn new(patterns: &PatternSet, rules: &ValidationRules) -> Result<Self, CleanerError> {
        Ok(Self {
            families: patterns.compile()?,
            validator: Validator::new(rules)?,
        })
    }

    /// Normalize decoded fragments into one cleaned string and validate it.
    pub fn normalize(&self, fragments: &[Fragment]) -> Normalized {
        let joined = fragments
            .iter()
            .map(|fragment| {
                if fragment.is_markup() {
                    markup::strip_markup(&fragment.text)
                } else {
                    fragment.text.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        let text = self.settle(&joined);
        let is_valid = self.validator.is_valid(&text);

        Normalized { text, is_valid }
    }

    /// Normalize a single plain-text body.
    pub fn normalize_text(&self, text: &str) -> Normalized {
        self.normalize(&[Fragment::plain(text)])
    }

    /// Like [`Normalizer::normalize`], but an invalid result is replaced by
    /// `raw` so non-empty input never produces empty output.
    pub fn clean_or_fallback(&self, fragments: &[Fragment], raw: &str) -> Normalized {
        let normalized = self.normalize(fragments);
        if normalized.is_valid || raw.trim().is_empty() {
            return normalized;
        }

        warn!(
            cleaned_len = normalized.text.len(),
            raw_len = raw.len(),
            "Cleaned content failed validation, keeping raw content"
        );
        Normalized {
            text: raw.to_string(),
            is_valid: false,
        }
    }

    /// Strip and collapse until the result is a fixed point of both.
    fn settle(&self, text: &str) -> String {
        let mut current = collapse_whitespace(&self.strip_until_stable(text));
        for _ in 1..MAX_PASSES {
            let next = collapse_whitespace(&self.strip_until_stable(&current));
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Repeat [`Normalizer::strip_boilerplate`] while it keeps removing text.
    /// Line structure is kept, so line-anchored families see the original
    /// line starts.
    fn strip_until_stable(&self, text: &str) -> String {
        let mut current = self.strip_boilerplate(text);
        for _ in 1..MAX_PASSES {
            let next = self.strip_boilerplate(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Remove every boilerplate family once, in order.
    pub fn strip_boilerplate(&self, text: &str) -> String {
        self.families.iter().fold(text.to_string(), |acc, family| {
            let out = family.remove_from(&acc);
            if out.len() != acc.len() {
                debug!(family = %family.name, removed = acc.len().saturating_sub(out.len()), "Removed boilerplate");
            }
            out
        })
    }

    pub fn is_valid(&self, text: &str) -> bool {
        self.validator.is_valid(text)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&PatternSet::builtin(), &ValidationRules::default())
            .expect("built-in patterns and rules compile")
    }
}

/// Collapse every whitespace run to a single space and trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
