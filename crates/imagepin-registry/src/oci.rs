//! OCI Distribution API wire types.

use serde::{Deserialize, Serialize};

/// Manifest media types accepted when resolving a tag.
pub struct MediaType;

impl MediaType {
    /// OCI image manifest media type.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// OCI image index media type.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// Docker image manifest v2 schema 2.
    pub const DOCKER_MANIFEST: &'static str =
        "application/vnd.docker.distribution.manifest.v2+json";

    /// Docker manifest list (multi-arch).
    pub const DOCKER_MANIFEST_LIST: &'static str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// Every manifest type, in the order sent in the `Accept` header.
    pub const MANIFESTS: [&'static str; 4] = [
        Self::OCI_INDEX,
        Self::OCI_MANIFEST,
        Self::DOCKER_MANIFEST_LIST,
        Self::DOCKER_MANIFEST,
    ];

    /// Value of the `Accept` header for manifest requests.
    #[must_use]
    pub fn manifest_accept() -> String {
        Self::MANIFESTS.join(", ")
    }
}

/// Response header carrying the manifest's content digest.
pub const DIGEST_HEADER: &str = "Docker-Content-Digest";

/// Response from the `/v2/<name>/tags/list` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagList {
    /// Repository name.
    pub name: String,

    /// List of tags; registries send `null` for a repository without tags.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Error response from registry API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// List of errors.
    pub errors: Vec<RegistryApiError>,
}

impl ErrorResponse {
    /// Joins the error messages into one line, if the body parses.
    #[must_use]
    pub fn summarize(body: &str) -> Option<String> {
        let parsed: Self = serde_json::from_str(body).ok()?;
        let summary = parsed
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        (!summary.is_empty()).then_some(summary)
    }
}

/// Individual error from registry API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryApiError {
    /// Error code.
    pub code: String,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// Extracts the `rel="next"` target from a `Link` header value.
///
/// # Examples
///
/// ```
/// use imagepin_registry::oci::next_page_link;
///
/// let link = r#"</v2/app/tags/list?n=2&last=b>; rel="next""#;
/// assert_eq!(next_page_link(link), Some("/v2/app/tags/list?n=2&last=b"));
/// ```
#[must_use]
pub fn next_page_link(header: &str) -> Option<&str> {
    header.split(',').find_map(|link| {
        let (target, params) = link.split_once(';')?;
        let is_next = params.split(';').any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .is_some_and(|rel| rel.trim_matches('"') == "next")
        });
        if !is_next {
            return None;
        }
        target
            .trim()
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_accept_lists_all_types() {
        let accept = MediaType::manifest_accept();
        for media_type in MediaType::MANIFESTS {
            assert!(accept.contains(media_type));
        }
    }

    #[test]
    fn test_tag_list_deserialization() {
        let json = r#"{
            "name": "library/nginx",
            "tags": ["1.24", "1.25", "latest"]
        }"#;

        let tags: TagList = serde_json::from_str(json).unwrap();
        assert_eq!(tags.name, "library/nginx");
        assert_eq!(tags.tags.unwrap().len(), 3);
    }

    #[test]
    fn test_tag_list_null_tags() {
        let tags: TagList = serde_json::from_str(r#"{"name": "empty", "tags": null}"#).unwrap();
        assert!(tags.tags.is_none());
    }

    #[test]
    fn test_error_response_summary() {
        let body = r#"{"errors":[{"code":"MANIFEST_UNKNOWN","message":"manifest unknown"}]}"#;
        assert_eq!(
            ErrorResponse::summarize(body).as_deref(),
            Some("MANIFEST_UNKNOWN: manifest unknown")
        );
        assert_eq!(ErrorResponse::summarize("not json"), None);
    }

    #[test]
    fn test_next_page_link() {
        assert_eq!(
            next_page_link(r#"<https://r.example/v2/a/tags/list?last=x>; rel="next""#),
            Some("https://r.example/v2/a/tags/list?last=x")
        );
        assert_eq!(
            next_page_link(r#"</prev>; rel="prev", </next>; rel=next"#),
            Some("/next")
        );
        assert_eq!(next_page_link(r#"</prev>; rel="prev""#), None);
        assert_eq!(next_page_link("garbage"), None);
    }
}
