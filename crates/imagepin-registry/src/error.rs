//! Error types for registry transport and image resolution.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a registry transport.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Registry rejected the credentials (or demanded some).
    #[error("Authentication failed for registry {registry} (HTTP {status})")]
    AuthenticationFailed {
        /// Registry host.
        registry: String,
        /// HTTP status returned.
        status: u16,
    },

    /// Repository or manifest not found.
    #[error("Not found: {repository}:{reference}")]
    NotFound {
        /// Repository name.
        repository: String,
        /// Tag or other reference.
        reference: String,
    },

    /// Request timed out.
    #[error("Request to {url} timed out")]
    Timeout {
        /// Request URL.
        url: String,
    },

    /// HTTP error from registry.
    #[error("HTTP error from registry: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    JsonError {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid URL.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },

    /// Digest returned by the registry is not `<algorithm>:<hex>`.
    #[error("Registry returned a malformed digest: '{digest}'")]
    InvalidDigest {
        /// The digest as received.
        digest: String,
    },

    /// TLS material could not be loaded.
    #[error("Invalid TLS configuration: {message}")]
    TlsConfig {
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("File I/O error at {path}: {source}")]
    IoError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map_or_else(|| "unknown".to_string(), ToString::to_string);

        if err.is_timeout() {
            Self::Timeout { url }
        } else if err.is_connect() {
            Self::ConnectionFailed { url, source: err }
        } else if err.is_decode() {
            Self::HttpError {
                status: 0,
                message: format!("failed to decode response from {url}: {err}"),
            }
        } else {
            let status = err.status().map_or(0, |s| s.as_u16());
            Self::HttpError {
                status,
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError { source: err }
    }
}

/// Raised to single-flight waiters when the computation they were waiting
/// for ended without storing a result (for example because it panicked).
#[derive(Debug, Clone, Error)]
#[error("Computation for cache key '{key}' ended without a result")]
pub struct ComputationAbandoned {
    /// Cache key whose computation was lost.
    pub key: String,
}

/// Errors returned by [`RegistryResolver`](crate::RegistryResolver).
///
/// Cloneable so that one cached failure can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// Repository, tag or pattern is malformed.
    #[error("Invalid image reference {repository}:{tag_spec}: {source}")]
    InvalidReference {
        /// Repository as requested.
        repository: String,
        /// Tag or pattern as requested.
        tag_spec: String,
        /// Parse failure.
        #[source]
        source: imagepin_core::Error,
    },

    /// Registry call failed.
    #[error("Registry request for {repository}:{tag_spec} failed: {source}")]
    Transport {
        /// Repository as requested.
        repository: String,
        /// Tag or pattern as requested.
        tag_spec: String,
        /// Transport failure.
        #[source]
        source: Arc<RegistryError>,
    },

    /// Registry call exceeded the configured per-call timeout.
    #[error("Registry request for {repository}:{tag_spec} timed out after {timeout:?}")]
    Timeout {
        /// Repository as requested.
        repository: String,
        /// Tag or pattern as requested.
        tag_spec: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// Wildcard pattern matched none of the repository's tags.
    #[error("No tag of {repository} matches '{pattern}' ({candidates} tags listed)")]
    NoMatch {
        /// Repository as requested.
        repository: String,
        /// The pattern.
        pattern: String,
        /// Number of tags the registry listed.
        candidates: usize,
    },

    /// Strict credential routing found no rule for the repository.
    #[error("No credential rule matches repository {repository}")]
    InvalidCredential {
        /// Repository as requested.
        repository: String,
    },

    /// The shared computation for this resolution was lost.
    #[error(transparent)]
    Abandoned(#[from] ComputationAbandoned),
}

impl ResolveError {
    /// Returns true for failures of the registry transport, timeouts included.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    /// Returns true if this is a wildcard no-match failure.
    #[must_use]
    pub const fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch { .. })
    }

    /// Repository the failure relates to, when known.
    #[must_use]
    pub fn repository(&self) -> Option<&str> {
        match self {
            Self::InvalidReference { repository, .. }
            | Self::Transport { repository, .. }
            | Self::Timeout { repository, .. }
            | Self::NoMatch { repository, .. }
            | Self::InvalidCredential { repository } => Some(repository),
            Self::Abandoned(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = RegistryError::NotFound {
            repository: "library/nginx".to_string(),
            reference: "1.25".to_string(),
        };
        assert_eq!(err.to_string(), "Not found: library/nginx:1.25");
    }

    #[test]
    fn test_error_display_auth_failed() {
        let err = RegistryError::AuthenticationFailed {
            registry: "ghcr.io".to_string(),
            status: 401,
        };
        assert_eq!(
            err.to_string(),
            "Authentication failed for registry ghcr.io (HTTP 401)"
        );
    }

    #[test]
    fn test_resolve_error_no_match_display() {
        let err = ResolveError::NoMatch {
            repository: "repo".to_string(),
            pattern: "2.*".to_string(),
            candidates: 1,
        };
        assert_eq!(err.to_string(), "No tag of repo matches '2.*' (1 tags listed)");
        assert!(err.is_no_match());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_resolve_error_transport_keeps_source() {
        let err = ResolveError::Transport {
            repository: "repo".to_string(),
            tag_spec: "1.0".to_string(),
            source: Arc::new(RegistryError::HttpError {
                status: 500,
                message: "boom".to_string(),
            }),
        };
        assert!(err.is_transport());
        assert_eq!(err.repository(), Some("repo"));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("boom"));
    }

    #[test]
    fn test_timeout_is_transport() {
        let err = ResolveError::Timeout {
            repository: "repo".to_string(),
            tag_spec: "1.0".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(err.is_transport());
    }

    #[test]
    fn test_abandoned_from() {
        let err: ResolveError = ComputationAbandoned {
            key: "repo:1.0".to_string(),
        }
        .into();
        assert!(err.to_string().contains("repo:1.0"));
        assert_eq!(err.repository(), None);
    }
}
