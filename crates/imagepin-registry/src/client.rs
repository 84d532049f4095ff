//! OCI Distribution API transport.
//!
//! Resolves tags to digests and lists tags against any registry speaking
//! the OCI Distribution API (Docker Hub, GHCR, Harbor, ECR, GCR, ...).

use async_trait::async_trait;
use imagepin_core::Repository;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::{Response, StatusCode};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::TransportConfig;
use crate::credentials::RegistryAuth;
use crate::error::RegistryError;
use crate::oci::{next_page_link, ErrorResponse, MediaType, TagList, DIGEST_HEADER};
use crate::transport::{validate_digest, RegistryTransport};

/// Upper bound on followed tag-list pages.
const MAX_TAG_PAGES: usize = 1000;

/// [`RegistryTransport`] over HTTP.
#[derive(Debug, Clone)]
pub struct OciTransport {
    config: TransportConfig,
    http: reqwest::Client,
}

impl OciTransport {
    /// Creates a transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS material cannot be loaded or the HTTP client
    /// cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use imagepin_registry::{OciTransport, TransportConfig};
    ///
    /// let transport = OciTransport::new(TransportConfig::new())?;
    /// # Ok::<(), imagepin_registry::RegistryError>(())
    /// ```
    pub fn new(config: TransportConfig) -> Result<Self, RegistryError> {
        let http = Self::build_http_client(&config)?;
        Ok(Self { config, http })
    }

    /// Returns the transport configuration.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn manifest_url(&self, repository: &Repository, tag: &str) -> String {
        format!(
            "{}/v2/{}/manifests/{tag}",
            self.config.base_url(repository),
            repository.path()
        )
    }

    fn tags_url(&self, repository: &Repository) -> String {
        format!(
            "{}/v2/{}/tags/list",
            self.config.base_url(repository),
            repository.path()
        )
    }

    /// Maps non-success responses to errors.
    async fn check_status(
        response: Response,
        repository: &Repository,
        reference: &str,
    ) -> Result<Response, RegistryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(RegistryError::AuthenticationFailed {
                    registry: repository.registry().to_string(),
                    status: status.as_u16(),
                })
            }
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound {
                repository: repository.to_string(),
                reference: reference.to_string(),
            }),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(RegistryError::HttpError {
                    status: status.as_u16(),
                    message: ErrorResponse::summarize(&body).unwrap_or(body),
                })
            }
        }
    }

    fn header_digest(response: &Response) -> Option<String> {
        response
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Fetches the manifest body and digests it locally.
    async fn digest_from_body(
        &self,
        repository: &Repository,
        tag: &str,
        headers: HeaderMap,
    ) -> Result<String, RegistryError> {
        let url = self.manifest_url(repository, tag);
        let response = self.http.get(&url).headers(headers).send().await?;
        let response = Self::check_status(response, repository, tag).await?;

        if let Some(digest) = Self::header_digest(&response) {
            return Ok(digest);
        }

        let body = response.bytes().await?;
        Ok(Self::compute_digest(&body))
    }

    /// Builds the HTTP client with proper configuration.
    fn build_http_client(config: &TransportConfig) -> Result<reqwest::Client, RegistryError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent);

        if let Some(ref tls) = config.tls {
            if tls.insecure_skip_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }

            if let Some(ref ca_cert) = tls.ca_cert {
                let cert_pem = std::fs::read(ca_cert).map_err(|e| RegistryError::IoError {
                    path: ca_cert.clone(),
                    source: e,
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem).map_err(|e| {
                    RegistryError::TlsConfig {
                        message: format!("Invalid CA certificate: {e}"),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }

            if let (Some(ref cert_path), Some(ref key_path)) = (&tls.client_cert, &tls.client_key)
            {
                let mut cert_pem = std::fs::read(cert_path).map_err(|e| RegistryError::IoError {
                    path: cert_path.clone(),
                    source: e,
                })?;
                let key_pem = std::fs::read(key_path).map_err(|e| RegistryError::IoError {
                    path: key_path.clone(),
                    source: e,
                })?;
                cert_pem.extend_from_slice(&key_pem);

                let identity = reqwest::Identity::from_pem(&cert_pem).map_err(|e| {
                    RegistryError::TlsConfig {
                        message: format!("Invalid client certificate: {e}"),
                    }
                })?;
                builder = builder.identity(identity);
            }
        }

        builder.build().map_err(|e| RegistryError::TlsConfig {
            message: format!("failed to build HTTP client: {e}"),
        })
    }

    /// Creates authentication headers for one request.
    fn auth_headers(repository: &Repository, auth: &RegistryAuth) -> Result<HeaderMap, RegistryError> {
        let mut headers = HeaderMap::new();

        if let Some(value) = auth.authorization_header() {
            let value = HeaderValue::from_str(&value).map_err(|_| {
                RegistryError::AuthenticationFailed {
                    registry: repository.registry().to_string(),
                    status: 0,
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }

    fn manifest_headers(
        repository: &Repository,
        auth: &RegistryAuth,
    ) -> Result<HeaderMap, RegistryError> {
        let mut headers = Self::auth_headers(repository, auth)?;
        let accept = HeaderValue::from_str(&MediaType::manifest_accept()).map_err(|_| {
            RegistryError::HttpError {
                status: 0,
                message: "invalid Accept header".to_string(),
            }
        })?;
        headers.insert(ACCEPT, accept);
        Ok(headers)
    }

    /// Computes SHA-256 digest of data.
    fn compute_digest(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl RegistryTransport for OciTransport {
    async fn fetch_digest(
        &self,
        repository: &Repository,
        tag: &str,
        auth: &RegistryAuth,
    ) -> Result<String, RegistryError> {
        let headers = Self::manifest_headers(repository, auth)?;
        let url = self.manifest_url(repository, tag);

        let response = self.http.head(&url).headers(headers.clone()).send().await?;
        let response = Self::check_status(response, repository, tag).await?;

        let digest = match Self::header_digest(&response) {
            Some(digest) => digest,
            None => {
                tracing::debug!(
                    repository = %repository,
                    tag,
                    "no digest header on HEAD, fetching manifest"
                );
                self.digest_from_body(repository, tag, headers).await?
            }
        };

        validate_digest(&digest)?;
        Ok(digest)
    }

    async fn list_tags(
        &self,
        repository: &Repository,
        auth: &RegistryAuth,
    ) -> Result<Vec<String>, RegistryError> {
        let headers = Self::auth_headers(repository, auth)?;
        let mut url = Url::parse(&self.tags_url(repository)).map_err(|_| {
            RegistryError::InvalidUrl {
                url: self.tags_url(repository),
            }
        })?;
        let mut tags = Vec::new();

        for _ in 0..MAX_TAG_PAGES {
            let response = self
                .http
                .get(url.clone())
                .headers(headers.clone())
                .send()
                .await?;
            let response = Self::check_status(response, repository, "tags/list").await?;

            let next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_page_link)
                .map(|link| {
                    url.join(link).map_err(|_| RegistryError::InvalidUrl {
                        url: link.to_string(),
                    })
                })
                .transpose()?;

            let page: TagList = response.json().await?;
            tags.extend(page.tags.unwrap_or_default());

            match next {
                Some(next) => url = next,
                None => return Ok(tags),
            }
        }

        tracing::warn!(
            repository = %repository,
            pages = MAX_TAG_PAGES,
            "tag list pagination limit reached"
        );
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        assert!(OciTransport::new(TransportConfig::new()).is_ok());
    }

    #[test]
    fn test_compute_digest() {
        let digest = OciTransport::compute_digest(b"test data");
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), 7 + 64);
        assert!(validate_digest(&digest).is_ok());
    }

    #[test]
    fn test_manifest_url() {
        let transport = OciTransport::new(TransportConfig::new()).unwrap();
        let repo = Repository::parse("nginx").unwrap();
        assert_eq!(
            transport.manifest_url(&repo, "1.25"),
            "https://registry-1.docker.io/v2/library/nginx/manifests/1.25"
        );
    }

    #[test]
    fn test_auth_headers_anonymous() {
        let repo = Repository::parse("nginx").unwrap();
        let headers = OciTransport::auth_headers(&repo, &RegistryAuth::Anonymous).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_auth_headers_bearer() {
        let repo = Repository::parse("nginx").unwrap();
        let headers = OciTransport::auth_headers(&repo, &RegistryAuth::bearer("my-token")).unwrap();
        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert_eq!(auth, "Bearer my-token");
    }

    #[test]
    fn test_manifest_headers_accept() {
        let repo = Repository::parse("nginx").unwrap();
        let headers =
            OciTransport::manifest_headers(&repo, &RegistryAuth::basic("user", "pass")).unwrap();
        assert!(headers.contains_key(AUTHORIZATION));
        let accept = headers.get(ACCEPT).unwrap().to_str().unwrap();
        assert!(accept.contains(MediaType::OCI_INDEX));
    }

    #[test]
    fn test_missing_ca_cert_is_io_error() {
        let config = TransportConfig::new()
            .with_tls(crate::TlsConfig::new().with_ca_cert("/nonexistent/ca.pem"));
        assert!(matches!(
            OciTransport::new(config),
            Err(RegistryError::IoError { .. })
        ));
    }
}
