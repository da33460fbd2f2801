use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CleanerError;

/// Heuristics deciding whether cleaned text is worth keeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    /// Minimum length in characters after trimming.
    pub min_length: usize,
    /// Whole-text patterns; a match marks the text invalid.
    pub invalid_patterns: Vec<String>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_length: 10,
            invalid_patterns: vec![
                // only whitespace or punctuation
                r"^[\s\W]+$".to_string(),
                // only digits and whitespace
                r"^[0-9\s]+$".to_string(),
                r"^[a-zA-Z\s]{1,3}$".to_string(),
            ],
        }
    }
}

#[derive(Debug)]
pub(crate) struct Validator {
    min_length: usize,
    invalid: Vec<Regex>,
}

impl Validator {
    pub fn new(rules: &ValidationRules) -> Result<Self, CleanerError> {
        if rules.min_length == 0 {
            return Err(CleanerError::InvalidRule(
                "min_length must be at least 1".to_string(),
            ));
        }

        let invalid = rules
            .invalid_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| CleanerError::InvalidPattern {
                    family: "validation".to_string(),
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            min_length: rules.min_length,
            invalid,
        })
    }

    pub fn is_valid(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.chars().count() < self.min_length {
            return false;
        }
        !self.invalid.iter().any(|re| re.is_match(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Validator {
        Validator::new(&ValidationRules::default()).expect("default rules compile")
    }

    #[test]
    fn test_rejects_short_and_empty() {
        let v = validator();
        assert!(!v.is_valid(""));
        assert!(!v.is_valid("   \n\t "));
        assert!(!v.is_valid("...---"));
        assert!(!v.is_valid("ok thanks"));
    }

    #[test]
    fn test_rejects_symbols_and_digits() {
        let v = validator();
        assert!(!v.is_valid("!!!! ---- ???? ****"));
        assert!(!v.is_valid("1234 5678 9012 3456"));
    }

    #[test]
    fn test_accepts_real_sentence() {
        let v = validator();
        assert!(v.is_valid("Can we move the budget review to Thursday?"));
        assert!(v.is_valid("Invoice 4411 attached"));
    }

    #[test]
    fn test_zero_min_length_rejected() {
        let rules = ValidationRules {
            min_length: 0,
            ..ValidationRules::default()
        };
        assert!(matches!(
            Validator::new(&rules),
            Err(CleanerError::InvalidRule(_))
        ));
    }
}
