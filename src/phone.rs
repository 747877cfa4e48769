//! Phone identity normalization and fuzzy matching against rendered UI text.
//!
//! A [`PhoneIdentity`] is always `+` followed by digits. Roster entries that
//! already carry a leading `+` keep their own country code; everything else
//! gets the configured default prepended. Because the output starts with `+`,
//! feeding an identity back through [`PhoneNormalizer::normalize`] returns it
//! unchanged.

use crate::errors::{EnrollError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a local number without country code.
const LOCAL_NUMBER_LEN: usize = 10;

/// Normalized phone number used as the identity of a participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneIdentity(String);

impl PhoneIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Textual forms of this identity to look for inside rendered contact text.
    ///
    /// In order: without the leading `+`, with every `+` removed, and the last
    /// ten digits when the identity is longer than that. Duplicates are dropped.
    pub fn variants(&self) -> Vec<String> {
        let mut variants = Vec::with_capacity(3);
        if let Some(stripped) = self.0.strip_prefix('+') {
            push_unique(&mut variants, stripped.to_lowercase());
        }
        push_unique(&mut variants, self.0.replace('+', "").to_lowercase());
        if self.0.len() > LOCAL_NUMBER_LEN {
            let tail = &self.0[self.0.len() - LOCAL_NUMBER_LEN..];
            push_unique(&mut variants, tail.to_lowercase());
        }
        variants
    }

    /// Whether a rendered contact entry refers to this identity.
    pub fn matches_entry(&self, entry_text: &str) -> bool {
        let haystack = matchable_text(entry_text);
        self.variants().iter().any(|v| haystack.contains(v.as_str()))
    }
}

fn push_unique(variants: &mut Vec<String>, candidate: String) {
    if !candidate.is_empty() && !variants.contains(&candidate) {
        variants.push(candidate);
    }
}

impl fmt::Display for PhoneIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneIdentity {
    type Error = EnrollError;

    fn try_from(value: String) -> Result<Self> {
        let valid = value
            .strip_prefix('+')
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()));
        if valid {
            Ok(Self(value))
        } else {
            Err(EnrollError::InvalidIdentity { raw: value })
        }
    }
}

impl From<PhoneIdentity> for String {
    fn from(identity: PhoneIdentity) -> Self {
        identity.0
    }
}

/// Canonicalizes raw roster strings into [`PhoneIdentity`] values.
#[derive(Debug, Clone)]
pub struct PhoneNormalizer {
    country_code: String,
}

impl PhoneNormalizer {
    /// `country_code` may be written as `+91`, `91` or `+ 91`; only its
    /// digits are kept.
    pub fn new(country_code: &str) -> Result<Self> {
        let digits: String = country_code.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(EnrollError::Config(format!(
                "country code '{}' contains no digits",
                country_code
            )));
        }
        Ok(Self {
            country_code: digits,
        })
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn normalize(&self, raw: &str) -> Result<PhoneIdentity> {
        let trimmed = raw.trim();
        let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(EnrollError::InvalidIdentity {
                raw: raw.to_string(),
            });
        }
        let identity = if trimmed.starts_with('+') {
            format!("+{}", digits)
        } else {
            format!("+{}{}", self.country_code, digits)
        };
        Ok(PhoneIdentity(identity))
    }
}

/// Lowercased entry text with whitespace and number punctuation removed.
pub fn matchable_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Entry text with runs of whitespace collapsed to single spaces.
pub fn display_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
