//! Selection of the highest tag matching a wildcard pattern.
//!
//! A pattern such as `1.*` or `v*-alpine` contains exactly one wildcard. A
//! candidate tag matches when it carries the pattern's literal prefix and
//! suffix around a non-empty middle. The middle is ranked:
//!
//! - dot-separated integers (`10.0`) compare component-wise as numbers,
//!   missing trailing components counting as zero;
//! - anything else falls into a lower tier compared as plain strings.
//!
//! Equal ranks are broken by the lexicographically greatest tag.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::reference::{validate_pattern, WILDCARD};

/// A parsed wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPattern {
    raw: String,
    prefix: String,
    suffix: String,
}

impl TagPattern {
    /// Parses a pattern containing exactly one wildcard.
    ///
    /// # Examples
    ///
    /// ```
    /// use imagepin_core::TagPattern;
    ///
    /// let pattern = TagPattern::parse("v1.*-alpine").unwrap();
    /// assert!(pattern.matches("v1.4-alpine"));
    /// assert!(!pattern.matches("v1.4"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the pattern is malformed.
    pub fn parse(pattern: &str) -> Result<Self> {
        validate_pattern(pattern)?;
        let (prefix, suffix) = pattern
            .split_once(WILDCARD)
            .ok_or_else(|| Error::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern has no wildcard".to_string(),
            })?;

        Ok(Self {
            raw: pattern.to_string(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the part of `candidate` covered by the wildcard, if it matches.
    #[must_use]
    pub fn covered<'a>(&self, candidate: &'a str) -> Option<&'a str> {
        let middle = candidate
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        (!middle.is_empty()).then_some(middle)
    }

    /// Returns true if `candidate` structurally matches the pattern.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        self.covered(candidate).is_some()
    }
}

impl std::fmt::Display for TagPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Rank of the wildcard-covered part of a tag.
#[derive(Debug, Clone)]
enum Rank {
    Text(String),
    Numeric(Vec<u64>),
}

impl Rank {
    fn of(covered: &str) -> Self {
        let numeric: Option<Vec<u64>> = covered
            .split('.')
            .map(|component| {
                if !component.is_empty() && component.bytes().all(|b| b.is_ascii_digit()) {
                    component.parse().ok()
                } else {
                    None
                }
            })
            .collect();

        numeric.map_or_else(|| Self::Text(covered.to_string()), Self::Numeric)
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => compare_padded(a, b),
            (Self::Numeric(_), Self::Text(_)) => Ordering::Greater,
            (Self::Text(_), Self::Numeric(_)) => Ordering::Less,
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rank {}

/// Compares component lists as if the shorter one were padded with zeros.
fn compare_padded(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Picks the highest-ranked tag for a wildcard pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionSelector;

impl VersionSelector {
    /// Creates a new selector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the highest candidate matching `pattern`.
    ///
    /// # Examples
    ///
    /// ```
    /// use imagepin_core::VersionSelector;
    ///
    /// let selector = VersionSelector::new();
    /// let best = selector
    ///     .select_highest("1.*", &["1.2.0", "1.10.0", "1.9.0"])
    ///     .unwrap();
    /// assert_eq!(best, "1.10.0");
    ///
    /// assert!(selector.select_highest("2.*", &["1.0.0"]).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] for a malformed pattern and
    /// [`Error::NoMatch`] when no candidate matches.
    pub fn select_highest(&self, pattern: &str, candidates: &[impl AsRef<str>]) -> Result<String> {
        let pattern = TagPattern::parse(pattern)?;
        self.select_with(&pattern, candidates)
    }

    /// Same as [`select_highest`](Self::select_highest) with a pre-parsed pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMatch`] when no candidate matches.
    pub fn select_with(&self, pattern: &TagPattern, candidates: &[impl AsRef<str>]) -> Result<String> {
        candidates
            .iter()
            .map(AsRef::as_ref)
            .filter_map(|tag| pattern.covered(tag).map(|covered| (Rank::of(covered), tag)))
            .max_by(|(rank_a, tag_a), (rank_b, tag_b)| {
                rank_a.cmp(rank_b).then_with(|| tag_a.cmp(tag_b))
            })
            .map(|(_, tag)| tag.to_string())
            .ok_or_else(|| Error::NoMatch {
                pattern: pattern.as_str().to_string(),
                candidates: candidates.len(),
            })
    }

    /// Returns every matching candidate, highest first.
    #[must_use]
    pub fn ranked(&self, pattern: &TagPattern, candidates: &[impl AsRef<str>]) -> Vec<String> {
        let mut matching: Vec<(Rank, &str)> = candidates
            .iter()
            .map(AsRef::as_ref)
            .filter_map(|tag| pattern.covered(tag).map(|covered| (Rank::of(covered), tag)))
            .collect();

        matching.sort_by(|(rank_a, tag_a), (rank_b, tag_b)| {
            rank_a.cmp(rank_b).then_with(|| tag_a.cmp(tag_b)).reverse()
        });

        matching.into_iter().map(|(_, tag)| tag.to_string()).collect()
    }
}
