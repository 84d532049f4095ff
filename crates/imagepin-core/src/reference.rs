//! Image references before and after pinning.
//!
//! An [`ImageSpec`] is what a workload asks for (`repo:tag` or `repo:1.*`);
//! a [`PinnedReference`] is what it gets back. [`Repository`] is the
//! normalised registry address used to talk to the registry API, while the
//! caller's original repository string is always preserved for output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Placeholder token that turns a tag specification into a pattern.
pub const WILDCARD: char = '*';

/// Tag assumed when an image string carries none.
pub const DEFAULT_TAG: &str = "latest";

/// Canonical name of Docker Hub.
pub const DOCKER_HUB: &str = "docker.io";

/// Host that actually serves the Docker Hub registry API.
const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

/// Maximum tag length accepted by OCI registries.
const MAX_TAG_LEN: usize = 128;

/// An unresolved image: repository plus exact tag or wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Repository location as written by the user (e.g. `docker.io/library/nginx`).
    pub repository_url: String,

    /// Exact tag or pattern containing [`WILDCARD`].
    pub tag_spec: String,
}

impl ImageSpec {
    /// Creates a spec from its two halves.
    #[must_use]
    pub fn new(repository_url: impl Into<String>, tag_spec: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            tag_spec: tag_spec.into(),
        }
    }

    /// Parses `repository[:tag]`.
    ///
    /// The tag separator is the last `:` after the last `/`, so a registry
    /// port is never mistaken for a tag. A missing tag means [`DEFAULT_TAG`].
    ///
    /// # Examples
    ///
    /// ```
    /// use imagepin_core::ImageSpec;
    ///
    /// let spec = ImageSpec::parse("localhost:5000/team/api:1.*").unwrap();
    /// assert_eq!(spec.repository_url, "localhost:5000/team/api");
    /// assert_eq!(spec.tag_spec, "1.*");
    /// assert!(spec.is_wildcard());
    ///
    /// let spec = ImageSpec::parse("nginx").unwrap();
    /// assert_eq!(spec.tag_spec, "latest");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReference`] for empty input, digest-qualified
    /// input, or an empty tag.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(invalid_reference(input, "reference is empty"));
        }
        if input.contains('@') {
            return Err(invalid_reference(input, "reference is already digest-qualified"));
        }

        let name_start = input.rfind('/').map_or(0, |i| i + 1);
        let (repository_url, tag_spec) = match input[name_start..].rfind(':') {
            Some(offset) => {
                let split = name_start + offset;
                (&input[..split], &input[split + 1..])
            }
            None => (input, DEFAULT_TAG),
        };

        if repository_url.is_empty() {
            return Err(invalid_reference(input, "repository is empty"));
        }
        if tag_spec.is_empty() {
            return Err(invalid_reference(input, "tag is empty"));
        }

        Ok(Self::new(repository_url, tag_spec))
    }

    /// Returns true if the tag specification is a wildcard pattern.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.tag_spec.contains(WILDCARD)
    }
}

impl fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository_url, self.tag_spec)
    }
}

impl FromStr for ImageSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// How a [`PinnedReference`] is pinned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Pin {
    /// Content digest reported by the registry (e.g. `sha256:...`).
    Digest(String),

    /// Concrete tag selected from a wildcard pattern.
    Tag(String),
}

/// A deployable reference produced by resolution.
///
/// Immutable once built; fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinnedReference {
    repository_url: String,
    pin: Pin,
}

impl PinnedReference {
    /// Creates a digest-qualified reference (`repo@digest`).
    #[must_use]
    pub fn digest(repository_url: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            pin: Pin::Digest(digest.into()),
        }
    }

    /// Creates a tag reference (`repo:tag`).
    #[must_use]
    pub fn tagged(repository_url: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            pin: Pin::Tag(tag.into()),
        }
    }

    /// Repository as originally requested.
    #[must_use]
    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    /// The pin itself.
    #[must_use]
    pub const fn pin(&self) -> &Pin {
        &self.pin
    }

    /// The digest, if pinned by digest.
    #[must_use]
    pub fn digest_value(&self) -> Option<&str> {
        match &self.pin {
            Pin::Digest(d) => Some(d),
            Pin::Tag(_) => None,
        }
    }

    /// The tag, if pinned by tag.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match &self.pin {
            Pin::Tag(t) => Some(t),
            Pin::Digest(_) => None,
        }
    }

    /// The pinned suffix: `@<digest>` or the literal tag.
    #[must_use]
    pub fn pinned(&self) -> String {
        match &self.pin {
            Pin::Digest(d) => format!("@{d}"),
            Pin::Tag(t) => t.clone(),
        }
    }
}

impl fmt::Display for PinnedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pin {
            Pin::Digest(d) => write!(f, "{}@{d}", self.repository_url),
            Pin::Tag(t) => write!(f, "{}:{t}", self.repository_url),
        }
    }
}

/// A repository normalised into registry host and path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    registry: String,
    path: String,
}

impl Repository {
    /// Parses a repository location the way container tooling does.
    ///
    /// The first component is a registry host when it contains `.` or `:`
    /// or is `localhost`; otherwise the repository lives on Docker Hub, where
    /// single-component names get the `library/` prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use imagepin_core::Repository;
    ///
    /// let repo = Repository::parse("nginx").unwrap();
    /// assert_eq!(repo.registry(), "docker.io");
    /// assert_eq!(repo.path(), "library/nginx");
    /// assert_eq!(repo.api_host(), "registry-1.docker.io");
    ///
    /// let repo = Repository::parse("ghcr.io/org/app").unwrap();
    /// assert_eq!(repo.registry(), "ghcr.io");
    /// assert_eq!(repo.path(), "org/app");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReference`] when the location is empty, has a
    /// URL scheme, or contains an invalid path component.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(invalid_reference(url, "repository is empty"));
        }
        if url.contains("://") {
            return Err(invalid_reference(url, "URL schemes are not allowed"));
        }

        let components: Vec<&str> = url.split('/').collect();
        let first = components[0];
        let has_host = components.len() > 1
            && (first.contains('.') || first.contains(':') || first == "localhost");

        let (registry, rest) = if has_host {
            validate_host(url, first)?;
            let registry = if first == "index.docker.io" {
                DOCKER_HUB
            } else {
                first
            };
            (registry, &components[1..])
        } else {
            (DOCKER_HUB, &components[..])
        };

        for component in rest {
            validate_path_component(url, component)?;
        }

        let mut path = rest.join("/");
        if registry == DOCKER_HUB && rest.len() == 1 {
            path = format!("library/{path}");
        }

        Ok(Self {
            registry: registry.to_string(),
            path,
        })
    }

    /// Registry name (e.g. `docker.io`, `localhost:5000`).
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Repository path within the registry.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Host serving the registry API for this repository.
    #[must_use]
    pub fn api_host(&self) -> &str {
        if self.registry == DOCKER_HUB {
            DOCKER_HUB_API_HOST
        } else {
            &self.registry
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.path)
    }
}

/// Validates an exact tag.
///
/// # Errors
///
/// Returns [`Error::InvalidTag`] unless the tag is 1-128 characters of
/// `[A-Za-z0-9_.-]` not starting with `.` or `-`.
pub fn validate_tag(tag: &str) -> Result<()> {
    check_tag_shape(tag, false).map_err(|reason| Error::InvalidTag {
        tag: tag.to_string(),
        reason,
    })
}

/// Validates a wildcard tag pattern: a tag with exactly one [`WILDCARD`].
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] when the wildcard count is not one or
/// the remaining characters are not valid tag characters.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    };

    match pattern.matches(WILDCARD).count() {
        0 => return Err(invalid("pattern has no wildcard".to_string())),
        1 => {}
        n => return Err(invalid(format!("pattern has {n} wildcards, expected one"))),
    }

    check_tag_shape(pattern, true).map_err(invalid)
}

fn check_tag_shape(tag: &str, allow_wildcard: bool) -> std::result::Result<(), String> {
    if tag.is_empty() {
        return Err("tag is empty".to_string());
    }
    if tag.len() > MAX_TAG_LEN {
        return Err(format!("tag is longer than {MAX_TAG_LEN} characters"));
    }
    if tag.starts_with(['.', '-']) {
        return Err("tag cannot start with '.' or '-'".to_string());
    }
    let valid = |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') || (allow_wildcard && c == WILDCARD)
    };
    match tag.chars().find(|c| !valid(*c)) {
        Some(c) => Err(format!("character '{c}' is not allowed")),
        None => Ok(()),
    }
}

fn validate_host(url: &str, host: &str) -> Result<()> {
    let (name, port) = host.split_once(':').map_or((host, None), |(n, p)| (n, Some(p)));
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-')) {
        return Err(invalid_reference(url, &format!("invalid registry host '{host}'")));
    }
    if let Some(port) = port {
        if port.parse::<u16>().is_err() {
            return Err(invalid_reference(url, &format!("invalid registry port '{port}'")));
        }
    }
    Ok(())
}

fn validate_path_component(url: &str, component: &str) -> Result<()> {
    if component.is_empty() {
        return Err(invalid_reference(url, "empty path component"));
    }
    if component.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid_reference(url, "uppercase characters are not allowed"));
    }
    let valid = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-');
    if !component.chars().all(valid) {
        return Err(invalid_reference(
            url,
            &format!("invalid path component '{component}'"),
        ));
    }
    let starts_ok = component.starts_with(|c: char| c.is_ascii_alphanumeric());
    let ends_ok = component.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !starts_ok || !ends_ok {
        return Err(invalid_reference(
            url,
            &format!("path component '{component}' must start and end with a letter or digit"),
        ));
    }
    Ok(())
}

fn invalid_reference(reference: &str, reason: &str) -> Error {
    Error::InvalidReference {
        reference: reference.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spec_with_tag() {
        let spec = ImageSpec::parse("docker.io/library/nginx:1.25").unwrap();
        assert_eq!(spec.repository_url, "docker.io/library/nginx");
        assert_eq!(spec.tag_spec, "1.25");
        assert!(!spec.is_wildcard());
    }

    #[test]
    fn test_parse_spec_registry_port_without_tag() {
        let spec = ImageSpec::parse("localhost:5000/app").unwrap();
        assert_eq!(spec.repository_url, "localhost:5000/app");
        assert_eq!(spec.tag_spec, DEFAULT_TAG);
    }

    #[test]
    fn test_parse_spec_rejects_digest_and_empty_tag() {
        assert!(ImageSpec::parse("nginx@sha256:abc").is_err());
        assert!(ImageSpec::parse("nginx:").is_err());
        assert!(ImageSpec::parse("   ").is_err());
    }

    #[test]
    fn test_spec_display_round_trip() {
        let spec: ImageSpec = "ghcr.io/org/app:v1.*".parse().unwrap();
        assert_eq!(spec.to_string(), "ghcr.io/org/app:v1.*");
    }

    #[test]
    fn test_pinned_reference_digest() {
        let pinned = PinnedReference::digest("repo", "sha256:0123");
        assert_eq!(pinned.to_string(), "repo@sha256:0123");
        assert_eq!(pinned.pinned(), "@sha256:0123");
        assert_eq!(pinned.digest_value(), Some("sha256:0123"));
        assert_eq!(pinned.tag(), None);
    }

    #[test]
    fn test_pinned_reference_tag() {
        let pinned = PinnedReference::tagged("repo", "1.5");
        assert_eq!(pinned.to_string(), "repo:1.5");
        assert_eq!(pinned.pinned(), "1.5");
        assert_eq!(pinned.tag(), Some("1.5"));
    }

    #[test]
    fn test_pinned_reference_serializes_pin_kind() {
        let pinned = PinnedReference::tagged("repo", "1.5");
        let json = serde_json::to_value(&pinned).unwrap();
        assert_eq!(json["pin"]["kind"], "tag");
        assert_eq!(json["pin"]["value"], "1.5");
    }

    #[test]
    fn test_repository_docker_hub_short_name() {
        let repo = Repository::parse("nginx").unwrap();
        assert_eq!(repo.to_string(), "docker.io/library/nginx");
    }

    #[test]
    fn test_repository_docker_hub_user_repo() {
        let repo = Repository::parse("bitnami/redis").unwrap();
        assert_eq!(repo.registry(), DOCKER_HUB);
        assert_eq!(repo.path(), "bitnami/redis");
    }

    #[test]
    fn test_repository_index_docker_io_alias() {
        let repo = Repository::parse("index.docker.io/nginx").unwrap();
        assert_eq!(repo.registry(), DOCKER_HUB);
        assert_eq!(repo.path(), "library/nginx");
    }

    #[test]
    fn test_repository_custom_registry_keeps_path() {
        let repo = Repository::parse("localhost:5000/nginx").unwrap();
        assert_eq!(repo.registry(), "localhost:5000");
        assert_eq!(repo.path(), "nginx");
        assert_eq!(repo.api_host(), "localhost:5000");
    }

    #[test]
    fn test_repository_rejects_bad_input() {
        assert!(Repository::parse("").is_err());
        assert!(Repository::parse("https://ghcr.io/app").is_err());
        assert!(Repository::parse("ghcr.io/Org/app").is_err());
        assert!(Repository::parse("ghcr.io//app").is_err());
        assert!(Repository::parse("ghcr.io/-app").is_err());
        assert!(Repository::parse("registry:notaport/app").is_err());
    }

    #[test]
    fn test_validate_tag() {
        assert!(validate_tag("v1.2.3-alpine_1").is_ok());
        assert!(validate_tag("").is_err());
        assert!(validate_tag(".hidden").is_err());
        assert!(validate_tag("1.*").is_err());
        assert!(validate_tag(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("1.*").is_ok());
        assert!(validate_pattern("v*-alpine").is_ok());
        assert!(validate_pattern("1.0").is_err());
        assert!(validate_pattern("*.*").is_err());
        assert!(validate_pattern("1.*/x").is_err());
    }
}
