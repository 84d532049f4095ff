//! Error types for imagepin core operations.

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing references or selecting versions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Repository or image reference is malformed.
    #[error("Invalid reference '{reference}': {reason}")]
    InvalidReference {
        /// The offending reference string.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Exact tag is malformed.
    #[error("Invalid tag '{tag}': {reason}")]
    InvalidTag {
        /// The offending tag.
        tag: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Wildcard tag pattern is malformed.
    #[error("Invalid tag pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No candidate tag matched a wildcard pattern.
    #[error("No tag matches pattern '{pattern}' ({candidates} candidates checked)")]
    NoMatch {
        /// The pattern that matched nothing.
        pattern: String,
        /// Number of candidate tags inspected.
        candidates: usize,
    },
}

impl Error {
    /// Returns true for errors caused by malformed input rather than by
    /// registry contents.
    #[must_use]
    pub const fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidReference { .. } | Self::InvalidTag { .. } | Self::InvalidPattern { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_no_match() {
        let err = Error::NoMatch {
            pattern: "2.*".to_string(),
            candidates: 3,
        };
        assert_eq!(
            err.to_string(),
            "No tag matches pattern '2.*' (3 candidates checked)"
        );
    }

    #[test]
    fn test_error_display_invalid_reference() {
        let err = Error::InvalidReference {
            reference: "Docker.io/Nginx".to_string(),
            reason: "uppercase characters are not allowed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid reference 'Docker.io/Nginx': uppercase characters are not allowed"
        );
    }

    #[test]
    fn test_is_parse_error() {
        let parse = Error::InvalidPattern {
            pattern: "*.*".to_string(),
            reason: "more than one wildcard".to_string(),
        };
        let no_match = Error::NoMatch {
            pattern: "1.*".to_string(),
            candidates: 0,
        };
        assert!(parse.is_parse_error());
        assert!(!no_match.is_parse_error());
    }
}
