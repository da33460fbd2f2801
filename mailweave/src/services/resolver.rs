//! Thread resolution from identity headers
//!
//! The earliest known ancestor names the thread: the first References entry,
//! else In-Reply-To, else the message's own identity. A message whose
//! identity headers cannot be trusted is still stored, unlinked, under a
//! synthesized identity.

use std::collections::BTreeSet;
use tracing::warn;

use crate::adapters::mime::DecodedMessage;
use crate::error::{MailweaveError, Result};
use crate::types::address::extract_addresses;
use crate::types::ThreadInfo;

/// Reply and forward markers stripped from the front of subjects.
pub const DEFAULT_SUBJECT_PREFIXES: &[&str] = &["re:", "fw:", "fwd:", "aw:", "tr:", "r:"];

#[derive(Debug, Clone)]
pub struct ThreadResolver {
    subject_prefixes: Vec<String>,
}

impl Default for ThreadResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SUBJECT_PREFIXES.iter().map(|p| p.to_string()))
    }
}

impl ThreadResolver {
    pub fn new(subject_prefixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            subject_prefixes: subject_prefixes
                .into_iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Resolve threading metadata. Never fails; see [`ThreadInfo::degraded`].
    pub fn resolve(&self, message: &DecodedMessage) -> ThreadInfo {
        match self.try_resolve(message) {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Thread resolution failed, storing unlinked");
                ThreadInfo::degraded(
                    synthesize_identity(&message.fingerprint),
                    &message.headers.subject,
                )
            }
        }
    }

    pub fn try_resolve(&self, message: &DecodedMessage) -> Result<ThreadInfo> {
        let headers = &message.headers;
        for (name, value) in [
            ("Message-ID", &headers.message_id),
            ("In-Reply-To", &headers.in_reply_to),
            ("References", &headers.references),
        ] {
            if let Some(value) = value {
                check_identity_header(name, value)?;
            }
        }

        let message_identity = headers
            .message_id
            .as_deref()
            .map(strip_angle_brackets)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| synthesize_identity(&message.fingerprint));

        let reference_chain = headers
            .references
            .as_deref()
            .map(parse_reference_chain)
            .unwrap_or_default();

        let in_reply_to = headers
            .in_reply_to
            .as_deref()
            .and_then(|v| parse_reference_chain(v).into_iter().next());

        let is_reply = in_reply_to.is_some() || !reference_chain.is_empty();
        let thread_id = if is_reply {
            reference_chain
                .first()
                .cloned()
                .or_else(|| in_reply_to.clone())
        } else {
            Some(message_identity.clone())
        };

        let mut participants: BTreeSet<String> = extract_addresses(&headers.from).into_iter().collect();
        for addr in headers.to.iter().chain(headers.cc.iter()) {
            participants.extend(extract_addresses(addr));
        }

        Ok(ThreadInfo {
            message_identity,
            thread_id,
            in_reply_to,
            reference_chain,
            is_reply,
            subject_root: self.subject_root(&headers.subject),
            participants,
        })
    }

    /// Lower-case the subject and strip leading reply/forward prefixes
    /// until none matches.
    pub fn subject_root(&self, subject: &str) -> String {
        let lowered = subject.to_lowercase();
        let mut rest = lowered.trim_start();
        while let Some(prefix) = self
            .subject_prefixes
            .iter()
            .find(|p| rest.starts_with(p.as_str()))
        {
            rest = rest[prefix.len()..].trim_start();
        }
        rest.trim().to_string()
    }
}

/// Identity for messages without a usable Message-ID, derived from content
/// so the same raw message always gets the same identity.
pub fn synthesize_identity(fingerprint: &str) -> String {
    let digest: String = fingerprint.chars().take(32).collect();
    format!("synthetic-{}", digest)
}

pub fn strip_angle_brackets(value: &str) -> String {
    value
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

/// Whitespace-separated identities, angle brackets removed, outermost first.
pub fn parse_reference_chain(value: &str) -> Vec<String> {
    value
        .split_whitespace()
        .map(strip_angle_brackets)
        .filter(|id| !id.is_empty())
        .collect()
}

fn check_identity_header(name: &str, value: &str) -> Result<()> {
    if value.chars().any(|c| c.is_ascii_control() && c != '\t') {
        return Err(MailweaveError::Resolution(format!(
            "{} contains control characters",
            name
        )));
    }
    Ok(())
}
