//! The resolution facade.
//!
//! [`RegistryResolver`] turns `repository` + `tag spec` into a
//! [`PinnedReference`]: exact tags become `repository@digest`, wildcard
//! patterns become `repository:<highest matching tag>`. Both go through one
//! single-flight cache; wildcard keys use a `___` separator so that a
//! pattern never shares a key with a literal tag. Wildcard lookups whose
//! repository or pattern contains the separator are rejected up front.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use imagepin_core::{
    validate_tag, Error as CoreError, ImageSpec, PinnedReference, Repository, TagPattern,
    VersionSelector, WILDCARD,
};
use tokio::task::JoinHandle;

use crate::cache::{CacheStats, MemoizingCache};
use crate::config::ResolverConfig;
use crate::credentials::{CredentialRouter, RegistryAuth};
use crate::error::{RegistryError, ResolveError};
use crate::transport::{validate_digest, RegistryTransport};

/// Separator between repository and pattern in wildcard cache keys.
const PATTERN_KEY_SEPARATOR: &str = "___";

/// Resolves image specifications to pinned references.
///
/// Safe to share across tasks (wrap in an `Arc`) and to call concurrently
/// with identical arguments; concurrent identical lookups share one
/// registry call.
pub struct RegistryResolver {
    cache: MemoizingCache<PinnedReference, ResolveError>,
    router: CredentialRouter,
    transport: Arc<dyn RegistryTransport>,
    selector: VersionSelector,
    request_timeout: Duration,
    sweeper: Option<JoinHandle<()>>,
}

impl fmt::Debug for RegistryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryResolver")
            .field("cache", &self.cache)
            .field("router", &self.router)
            .field("request_timeout", &self.request_timeout)
            .field("sweeping", &self.sweeper.is_some())
            .finish_non_exhaustive()
    }
}

impl RegistryResolver {
    /// Creates a resolver.
    ///
    /// Strict credential routing is enabled if either the configuration or
    /// the router asks for it. The background sweep, when configured, is
    /// only started if a tokio runtime is available.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use imagepin_registry::{
    ///     CredentialRouter, OciTransport, RegistryResolver, ResolverConfig, TransportConfig,
    /// };
    ///
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let transport = Arc::new(OciTransport::new(TransportConfig::new())?);
    /// let resolver = RegistryResolver::new(
    ///     ResolverConfig::default(),
    ///     CredentialRouter::default(),
    ///     transport,
    /// );
    ///
    /// let pinned = resolver.resolve_image("nginx", "1.*").await?;
    /// println!("{pinned}");
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn new(
        config: ResolverConfig,
        router: CredentialRouter,
        transport: Arc<dyn RegistryTransport>,
    ) -> Self {
        let strict = config.strict_credentials || router.is_strict();
        let cache = MemoizingCache::new(config.cache);

        let sweeper = config.sweep_interval.and_then(|interval| {
            if tokio::runtime::Handle::try_current().is_ok() {
                Some(cache.spawn_sweeper(interval))
            } else {
                tracing::warn!("No tokio runtime, cache sweeper not started");
                None
            }
        });

        Self {
            cache,
            router: router.strict(strict),
            transport,
            selector: VersionSelector::new(),
            request_timeout: config.request_timeout,
            sweeper,
        }
    }

    /// Resolves `repository_url` + `tag_spec` to a pinned reference.
    ///
    /// The returned reference always carries `repository_url` exactly as
    /// given.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::InvalidReference`] for a malformed repository, tag
    ///   or pattern (not cached).
    /// - [`ResolveError::InvalidCredential`] in strict mode when no
    ///   credential rule matches (not cached).
    /// - [`ResolveError::Transport`], [`ResolveError::Timeout`] and
    ///   [`ResolveError::NoMatch`], cached for the failure TTL.
    pub async fn resolve_image(
        &self,
        repository_url: &str,
        tag_spec: &str,
    ) -> Result<PinnedReference, ResolveError> {
        let invalid = |source: CoreError| ResolveError::InvalidReference {
            repository: repository_url.to_string(),
            tag_spec: tag_spec.to_string(),
            source,
        };

        let repository = Repository::parse(repository_url).map_err(invalid)?;
        let pattern = if tag_spec.contains(WILDCARD) {
            let pattern = TagPattern::parse(tag_spec).map_err(invalid)?;
            check_pattern_key(repository_url, tag_spec).map_err(invalid)?;
            Some(pattern)
        } else {
            validate_tag(tag_spec).map_err(invalid)?;
            None
        };

        let auth = self.router.route(repository_url)?.clone();
        let lookup = Lookup {
            repository_url: repository_url.to_string(),
            tag_spec: tag_spec.to_string(),
            repository,
            auth,
            transport: Arc::clone(&self.transport),
            timeout: self.request_timeout,
        };

        let key = cache_key(repository_url, tag_spec);
        match pattern {
            None => {
                self.cache
                    .get_or_compute(&key, move || lookup.pin_digest())
                    .await
            }
            Some(pattern) => {
                let selector = self.selector;
                self.cache
                    .get_or_compute(&key, move || lookup.pin_highest(selector, pattern))
                    .await
            }
        }
    }

    /// Resolves a parsed [`ImageSpec`].
    ///
    /// # Errors
    ///
    /// Same as [`resolve_image`](Self::resolve_image).
    pub async fn resolve_spec(&self, spec: &ImageSpec) -> Result<PinnedReference, ResolveError> {
        self.resolve_image(&spec.repository_url, &spec.tag_spec)
            .await
    }

    /// Drops the cached resolution of `repository_url` + `tag_spec`.
    ///
    /// Returns true if an entry was removed.
    pub fn invalidate(&self, repository_url: &str, tag_spec: &str) -> bool {
        self.cache.invalidate(&cache_key(repository_url, tag_spec))
    }

    /// Removes expired cache entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Returns a snapshot of the cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The credential router in use.
    #[must_use]
    pub const fn router(&self) -> &CredentialRouter {
        &self.router
    }
}

impl Drop for RegistryResolver {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

/// Wildcard keys are only unambiguous if neither half contains the
/// separator.
fn check_pattern_key(repository_url: &str, tag_spec: &str) -> Result<(), CoreError> {
    let reason = || format!("'{PATTERN_KEY_SEPARATOR}' is not allowed in wildcard lookups");
    if repository_url.contains(PATTERN_KEY_SEPARATOR) {
        return Err(CoreError::InvalidReference {
            reference: repository_url.to_string(),
            reason: reason(),
        });
    }
    if tag_spec.contains(PATTERN_KEY_SEPARATOR) {
        return Err(CoreError::InvalidPattern {
            pattern: tag_spec.to_string(),
            reason: reason(),
        });
    }
    Ok(())
}

/// Cache key for a resolution.
fn cache_key(repository_url: &str, tag_spec: &str) -> String {
    if tag_spec.contains(WILDCARD) {
        format!("{repository_url}{PATTERN_KEY_SEPARATOR}{tag_spec}")
    } else {
        format!("{repository_url}:{tag_spec}")
    }
}

/// Everything one cache-miss computation needs, owned so it can run on a
/// spawned task.
struct Lookup {
    repository_url: String,
    tag_spec: String,
    repository: Repository,
    auth: RegistryAuth,
    transport: Arc<dyn RegistryTransport>,
    timeout: Duration,
}

impl Lookup {
    async fn pin_digest(self) -> Result<PinnedReference, ResolveError> {
        tracing::debug!(
            repository = %self.repository_url,
            tag = %self.tag_spec,
            auth = %self.auth,
            "Fetching digest"
        );

        let call = self
            .transport
            .fetch_digest(&self.repository, &self.tag_spec, &self.auth);
        let digest = self
            .bounded(call)
            .await?
            .and_then(|digest| validate_digest(&digest).map(|()| digest))
            .map_err(|e| self.transport_error(e))?;

        Ok(PinnedReference::digest(self.repository_url, digest))
    }

    async fn pin_highest(
        self,
        selector: VersionSelector,
        pattern: TagPattern,
    ) -> Result<PinnedReference, ResolveError> {
        tracing::debug!(
            repository = %self.repository_url,
            pattern = %pattern,
            auth = %self.auth,
            "Listing tags"
        );

        let call = self.transport.list_tags(&self.repository, &self.auth);
        let tags = self
            .bounded(call)
            .await?
            .map_err(|e| self.transport_error(e))?;

        let Some(tag) = selector.ranked(&pattern, &tags).into_iter().next() else {
            let error = ResolveError::NoMatch {
                repository: self.repository_url.clone(),
                pattern: pattern.as_str().to_string(),
                candidates: tags.len(),
            };
            tracing::warn!(error = %error, "Tag selection failed");
            return Err(error);
        };

        tracing::debug!(
            repository = %self.repository_url,
            pattern = %pattern,
            tag = %tag,
            "Selected tag"
        );
        Ok(PinnedReference::tagged(self.repository_url, tag))
    }

    /// Applies the per-call timeout to a transport call.
    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, RegistryError>>,
    ) -> Result<Result<T, RegistryError>, ResolveError> {
        tokio::time::timeout(self.timeout, call).await.map_err(|_| {
            tracing::warn!(
                repository = %self.repository_url,
                tag_spec = %self.tag_spec,
                timeout = ?self.timeout,
                "Registry request timed out"
            );
            ResolveError::Timeout {
                repository: self.repository_url.clone(),
                tag_spec: self.tag_spec.clone(),
                timeout: self.timeout,
            }
        })
    }

    fn transport_error(&self, error: RegistryError) -> ResolveError {
        tracing::warn!(
            repository = %self.repository_url,
            tag_spec = %self.tag_spec,
            error = %error,
            "Registry request failed"
        );
        ResolveError::Transport {
            repository: self.repository_url.clone(),
            tag_spec: self.tag_spec.clone(),
            source: Arc::new(error),
        }
    }
}
