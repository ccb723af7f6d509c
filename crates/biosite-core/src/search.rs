//! # Full-Text Search
//!
//! Tokenization and weighting for the events search index.
//!
//! Documents are split into lowercase alphanumeric terms; each term gets
//! the summed weight of the fields it appears in (title counts double).
//! A query matches a document only if every query term matches; the last
//! query term also matches as a prefix, so search-as-you-type works.

use crate::primitives::{MAX_SEARCH_TERMS, MIN_TERM_LENGTH};
use std::collections::BTreeMap;

/// Weight of a term found in an event title.
pub const TITLE_WEIGHT: u32 = 2;

/// Weight of a term found in any other indexed field.
pub const BODY_WEIGHT: u32 = 1;

const STOPWORDS: &[&str] = &[
    "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "the", "to", "was", "with",
];

/// Split `text` into normalized index terms, in order of first appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        let term = raw.to_lowercase();
        if term.chars().count() < MIN_TERM_LENGTH || STOPWORDS.contains(&term.as_str()) {
            continue;
        }
        if !seen.contains(&term) {
            seen.push(term);
        }
    }
    seen
}

/// Weighted term set for a document made of `(text, weight)` fields.
pub fn weighted_terms<'a>(
    fields: impl IntoIterator<Item = (Option<&'a str>, u32)>,
) -> BTreeMap<String, u32> {
    let mut terms = BTreeMap::new();
    for (text, weight) in fields {
        let Some(text) = text else { continue };
        for term in tokenize(text) {
            let entry = terms.entry(term).or_insert(0u32);
            *entry = entry.saturating_add(weight);
        }
    }
    terms
}

/// A parsed search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Terms that must match exactly.
    pub exact: Vec<String>,
    /// The final term, matched as a prefix.
    pub prefix: Option<String>,
}

impl SearchQuery {
    /// Parse user input. Returns `None` if no searchable term remains.
    pub fn parse(input: &str) -> Option<Self> {
        let mut terms = tokenize(input);
        terms.truncate(MAX_SEARCH_TERMS);
        let prefix = terms.pop()?;
        Some(Self {
            exact: terms,
            prefix: Some(prefix),
        })
    }

    /// Number of terms a document must match.
    pub fn term_count(&self) -> usize {
        self.exact.len() + usize::from(self.prefix.is_some())
    }
}

// =============================================================================
// TESTS
// =============================================================================
