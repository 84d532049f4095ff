//! Configuration types for the registry transport and the resolver.

use std::path::PathBuf;
use std::time::Duration;

use imagepin_core::Repository;

use crate::cache::CacheConfig;

/// Configuration for [`OciTransport`](crate::OciTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall timeout of one HTTP request.
    pub timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Registry hosts spoken to over plain HTTP (e.g. `localhost:5000`).
    pub plain_http_registries: Vec<String>,

    /// TLS configuration for custom CAs or mTLS.
    pub tls: Option<TlsConfig>,

    /// Sends every request to this endpoint instead of the repository's
    /// registry (e.g. `http://127.0.0.1:8080`).
    pub base_url_override: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportConfig {
    /// Creates a configuration with a 30 second timeout.
    ///
    /// # Examples
    ///
    /// ```
    /// use imagepin_registry::TransportConfig;
    ///
    /// let config = TransportConfig::new().with_plain_http("localhost:5000");
    /// assert!(config.user_agent.starts_with("imagepin/"));
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("imagepin/{}", env!("CARGO_PKG_VERSION")),
            plain_http_registries: Vec::new(),
            tls: None,
            base_url_override: None,
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Marks a registry host as plain HTTP.
    #[must_use]
    pub fn with_plain_http(mut self, registry: impl Into<String>) -> Self {
        self.plain_http_registries.push(registry.into());
        self
    }

    /// Sets the TLS configuration.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Routes every request to `base_url`.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    /// Returns the API base URL (scheme and host, no trailing slash) for a
    /// repository.
    ///
    /// # Examples
    ///
    /// ```
    /// use imagepin_core::Repository;
    /// use imagepin_registry::TransportConfig;
    ///
    /// let config = TransportConfig::new().with_plain_http("localhost:5000");
    ///
    /// let hub = Repository::parse("nginx").unwrap();
    /// assert_eq!(config.base_url(&hub), "https://registry-1.docker.io");
    ///
    /// let local = Repository::parse("localhost:5000/app").unwrap();
    /// assert_eq!(config.base_url(&local), "http://localhost:5000");
    /// ```
    #[must_use]
    pub fn base_url(&self, repository: &Repository) -> String {
        if let Some(ref base) = self.base_url_override {
            return base.trim_end_matches('/').to_string();
        }

        let scheme = if self
            .plain_http_registries
            .iter()
            .any(|host| host == repository.registry())
        {
            "http"
        } else {
            "https"
        };
        format!("{scheme}://{}", repository.api_host())
    }
}

/// TLS configuration for mTLS connections.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Path to CA certificate file.
    pub ca_cert: Option<PathBuf>,

    /// Path to client certificate file.
    pub client_cert: Option<PathBuf>,

    /// Path to client private key file.
    pub client_key: Option<PathBuf>,

    /// Whether to skip certificate verification.
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Creates an empty TLS configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ca_cert: None,
            client_cert: None,
            client_key: None,
            insecure_skip_verify: false,
        }
    }

    /// Sets the CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Sets client certificate and key paths for mTLS.
    #[must_use]
    pub fn with_client_cert(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    /// Skips certificate verification. Only for testing.
    #[must_use]
    pub const fn insecure(mut self) -> Self {
        self.insecure_skip_verify = true;
        self
    }
}

/// Configuration for [`RegistryResolver`](crate::RegistryResolver).
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Result cache TTLs.
    pub cache: CacheConfig,

    /// Upper bound on each transport call.
    pub request_timeout: Duration,

    /// Period of the background sweep of expired entries; `None` disables it.
    pub sweep_interval: Option<Duration>,

    /// Fail repositories that match no credential rule instead of
    /// resolving them anonymously.
    pub strict_credentials: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            request_timeout: Duration::from_secs(30),
            sweep_interval: None,
            strict_credentials: false,
        }
    }
}

impl ResolverConfig {
    /// Creates a configuration with the given cache TTL for successes.
    #[must_use]
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            cache: CacheConfig::new(cache_ttl),
            ..Self::default()
        }
    }

    /// Sets the cache configuration.
    #[must_use]
    pub const fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enables the background sweep.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Enables strict credential routing.
    #[must_use]
    pub const fn with_strict_credentials(mut self, strict: bool) -> Self {
        self.strict_credentials = strict;
        self
    }
}
