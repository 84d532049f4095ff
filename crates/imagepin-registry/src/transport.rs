//! The seam between the resolver and a registry.

use async_trait::async_trait;
use imagepin_core::Repository;

use crate::credentials::RegistryAuth;
use crate::error::RegistryError;

/// Remote registry operations needed to resolve image references.
///
/// Implementations must be shareable across tasks; the resolver holds one
/// behind an `Arc` and may call it concurrently for different keys.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Returns the content digest of `repository:tag`.
    async fn fetch_digest(
        &self,
        repository: &Repository,
        tag: &str,
        auth: &RegistryAuth,
    ) -> Result<String, RegistryError>;

    /// Lists every tag of `repository`.
    async fn list_tags(
        &self,
        repository: &Repository,
        auth: &RegistryAuth,
    ) -> Result<Vec<String>, RegistryError>;
}

/// Checks that `digest` has the form `<algorithm>:<hex>`.
///
/// The algorithm is lowercase alphanumeric (with `+ . _ -` separators) and
/// the encoded part is lowercase hex.
///
/// # Examples
///
/// ```
/// use imagepin_registry::validate_digest;
///
/// assert!(validate_digest("sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08").is_ok());
/// assert!(validate_digest("latest").is_err());
/// ```
///
/// # Errors
///
/// Returns [`RegistryError::InvalidDigest`] if the digest is malformed.
pub fn validate_digest(digest: &str) -> Result<(), RegistryError> {
    let invalid = || RegistryError::InvalidDigest {
        digest: digest.to_string(),
    };

    let (algorithm, encoded) = digest.split_once(':').ok_or_else(invalid)?;

    let algorithm_ok = !algorithm.is_empty()
        && algorithm
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_lowercase())
        && algorithm
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"+._-".contains(&b));

    let encoded_ok = !encoded.is_empty()
        && encoded
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

    if algorithm_ok && encoded_ok {
        Ok(())
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_digests() {
        assert!(validate_digest("sha256:abc123").is_ok());
        assert!(validate_digest("sha512:00ff").is_ok());
        assert!(validate_digest("blake3:deadbeef").is_ok());
    }

    #[test]
    fn test_invalid_digests() {
        for digest in ["", "sha256", "sha256:", ":abc", "SHA256:abc", "sha256:XYZ", "sha256:ab:cd"] {
            assert!(
                matches!(validate_digest(digest), Err(RegistryError::InvalidDigest { .. })),
                "{digest} should be rejected"
            );
        }
    }
}
