//! Email body cleaning
//!
//! Turns decoded message fragments into one plain-text string suitable for
//! downstream analysis: markup is stripped, transport boilerplate (header
//! echoes, forwarding banners, reply attributions, signatures, quoted lines,
//! inline attachment placeholders) is removed, whitespace is collapsed and
//! the result is validated.
//!
//! The boilerplate patterns and validation rules are plain data
//! ([`PatternSet`], [`ValidationRules`]) compiled once into a [`Normalizer`],
//! so callers and tests can substitute their own tables.

mod error;
mod fragment;
pub mod markup;
mod normalizer;
mod patterns;
mod validate;

pub use error::CleanerError;
pub use fragment::{ContentKind, Fragment};
pub use normalizer::{collapse_whitespace, Normalized, Normalizer};
pub use patterns::{PatternFamily, PatternSet};
pub use validate::ValidationRules;
