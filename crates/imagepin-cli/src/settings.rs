//! YAML settings file.
//!
//! ```yaml
//! cache_ttl_secs: 60
//! failure_ttl_secs: 10
//! timeout_secs: 30
//! strict_credentials: false
//! plain_http: ["localhost:5000"]
//! credentials:
//!   - prefix: ghcr.io/my-org
//!     token: ${GHCR_TOKEN}
//!   - prefix: docker.io
//!     username: deployer
//!     password: ${DOCKERHUB_PASSWORD}
//! notify:
//!   slack_webhook: ${SLACK_WEBHOOK}
//!   prefix: "[prod]"
//! ```

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use imagepin_notify::{GoogleChatBackend, NotifyBackend, SlackBackend};
use imagepin_registry::{
    CacheConfig, CredentialRouter, CredentialRule, RegistryAuth, ResolverConfig, TransportConfig,
};

/// Settings loaded from the YAML file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// TTL of successful resolutions.
    pub cache_ttl_secs: Option<u64>,

    /// TTL of failed resolutions.
    pub failure_ttl_secs: Option<u64>,

    /// Per-request registry timeout.
    pub timeout_secs: Option<u64>,

    /// Fail repositories that match no credential rule.
    pub strict_credentials: bool,

    /// Registries spoken to over plain HTTP.
    pub plain_http: Vec<String>,

    /// Credential rules, first match wins.
    pub credentials: Vec<CredentialEntry>,

    /// Chat notifications.
    pub notify: Option<NotifySettings>,
}

/// One credential rule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialEntry {
    /// Repository prefix the rule applies to.
    pub prefix: String,

    /// Username for basic authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for basic authentication; `${VAR}` is expanded.
    #[serde(default)]
    pub password: Option<String>,

    /// Bearer token; `${VAR}` is expanded.
    #[serde(default)]
    pub token: Option<String>,
}

/// Webhook settings. At most one webhook may be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifySettings {
    /// Slack incoming webhook URL.
    pub slack_webhook: Option<String>,

    /// Google Chat webhook URL.
    pub google_chat_webhook: Option<String>,

    /// Prefix (environment name) added to every message.
    pub prefix: String,

    /// Forward info messages as well.
    pub verbose: bool,
}

impl Settings {
    /// Loads settings from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid settings
    /// YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Loads `path` if given, else the default settings file if it exists,
    /// else empty settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be loaded.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "Using default settings file");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Resolver configuration; CLI overrides win over file values.
    pub fn resolver_config(&self, overrides: &Overrides) -> ResolverConfig {
        let defaults = ResolverConfig::default();
        let success_ttl = overrides
            .cache_ttl_secs
            .or(self.cache_ttl_secs)
            .map_or(defaults.cache.success_ttl, Duration::from_secs);
        let failure_ttl = overrides
            .failure_ttl_secs
            .or(self.failure_ttl_secs)
            .map_or(defaults.cache.failure_ttl, Duration::from_secs);

        defaults
            .with_cache(CacheConfig::new(success_ttl).with_failure_ttl(failure_ttl))
            .with_request_timeout(self.timeout(overrides))
            .with_strict_credentials(self.strict_credentials)
    }

    /// Transport configuration.
    pub fn transport_config(&self, overrides: &Overrides) -> TransportConfig {
        self.plain_http.iter().fold(
            TransportConfig::new().with_timeout(self.timeout(overrides)),
            |config, registry| config.with_plain_http(registry.clone()),
        )
    }

    fn timeout(&self, overrides: &Overrides) -> Duration {
        overrides
            .timeout_secs
            .or(self.timeout_secs)
            .map_or(ResolverConfig::default().request_timeout, Duration::from_secs)
    }

    /// Builds the credential router, expanding `${VAR}` references.
    ///
    /// # Errors
    ///
    /// Returns an error if a credential entry is incomplete or references an
    /// unset environment variable.
    pub fn router(&self) -> Result<CredentialRouter> {
        let rules = self
            .credentials
            .iter()
            .map(|entry| {
                let auth = entry
                    .to_auth()
                    .with_context(|| format!("Invalid credentials for prefix '{}'", entry.prefix))?;
                Ok(CredentialRule::new(entry.prefix.clone(), auth))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CredentialRouter::new(rules).strict(self.strict_credentials))
    }

    /// Builds the configured notification backend, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if both webhooks are set or the HTTP client cannot be
    /// built.
    pub fn notify_backend(&self) -> Result<Option<Arc<dyn NotifyBackend>>> {
        let Some(ref notify) = self.notify else {
            return Ok(None);
        };

        match (&notify.slack_webhook, &notify.google_chat_webhook) {
            (Some(_), Some(_)) => {
                bail!("Configure either slack_webhook or google_chat_webhook, not both")
            }
            (Some(url), None) => {
                let backend: Arc<dyn NotifyBackend> =
                    Arc::new(SlackBackend::new(expand_env(url)?, notify.prefix.clone())?);
                Ok(Some(backend))
            }
            (None, Some(url)) => {
                let backend: Arc<dyn NotifyBackend> =
                    Arc::new(GoogleChatBackend::new(expand_env(url)?, notify.prefix.clone())?);
                Ok(Some(backend))
            }
            (None, None) => Ok(None),
        }
    }

    /// Whether info messages go to the webhook.
    pub fn notify_verbose(&self) -> bool {
        self.notify.as_ref().is_some_and(|n| n.verbose)
    }
}

impl CredentialEntry {
    /// Determines the authentication method of this rule.
    fn to_auth(&self) -> Result<RegistryAuth> {
        if let Some(ref token) = self.token {
            return Ok(RegistryAuth::bearer(expand_env(token)?));
        }

        if let (Some(ref username), Some(ref password)) = (&self.username, &self.password) {
            return Ok(RegistryAuth::basic(expand_env(username)?, expand_env(password)?));
        }

        if self.username.is_some() || self.password.is_some() {
            bail!("Both username and password are required for basic authentication");
        }

        Ok(RegistryAuth::Anonymous)
    }
}

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    /// `--cache-ttl`
    pub cache_ttl_secs: Option<u64>,
    /// `--failure-ttl`
    pub failure_ttl_secs: Option<u64>,
    /// `--timeout`
    pub timeout_secs: Option<u64>,
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("imagepin").join("config.yaml"))
}

/// Replaces every `${NAME}` (or `$NAME`) with the value of environment
/// variable `NAME`.
///
/// # Errors
///
/// Returns an error if a referenced variable is not set.
pub fn expand_env(value: &str) -> Result<String> {
    shellexpand::env(value)
        .map(Cow::into_owned)
        .map_err(|e| {
            anyhow::Error::new(e.cause)
                .context(format!("Environment variable '{}' is not set", e.var_name))
        })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_settings(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_settings() {
        std::env::set_var("IMAGEPIN_TEST_GHCR_TOKEN", "ghcr-secret");
        let file = write_settings(
            r#"
cache_ttl_secs: 120
failure_ttl_secs: 5
timeout_secs: 3
plain_http: ["localhost:5000"]
credentials:
  - prefix: ghcr.io/org
    token: ${IMAGEPIN_TEST_GHCR_TOKEN}
  - prefix: docker.io
    username: deployer
    password: hunter2
notify:
  slack_webhook: http://localhost/hook
  prefix: "[test]"
"#,
        );

        let settings = Settings::load(file.path()).unwrap();
        let config = settings.resolver_config(&Overrides::default());
        assert_eq!(config.cache.success_ttl, Duration::from_secs(120));
        assert_eq!(config.cache.failure_ttl, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(3));

        let router = settings.router().unwrap();
        assert_eq!(
            router.resolve("ghcr.io/org/app"),
            &RegistryAuth::bearer("ghcr-secret")
        );
        assert_eq!(
            router.resolve("docker.io/library/nginx"),
            &RegistryAuth::basic("deployer", "hunter2")
        );

        assert_eq!(
            settings
                .transport_config(&Overrides::default())
                .plain_http_registries,
            vec!["localhost:5000"]
        );
        let backend = settings.notify_backend().unwrap().unwrap();
        assert_eq!(backend.name(), "slack");
    }

    #[test]
    fn test_overrides_win() {
        let settings = Settings {
            cache_ttl_secs: Some(120),
            timeout_secs: Some(3),
            ..Settings::default()
        };
        let overrides = Overrides {
            cache_ttl_secs: Some(10),
            failure_ttl_secs: Some(1),
            timeout_secs: Some(7),
        };

        let config = settings.resolver_config(&overrides);
        assert_eq!(config.cache.success_ttl, Duration::from_secs(10));
        assert_eq!(config.cache.failure_ttl, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert_eq!(settings.transport_config(&overrides).timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings: Settings = serde_yaml::from_str("{}").unwrap();
        let config = settings.resolver_config(&Overrides::default());
        assert_eq!(config.cache, CacheConfig::default());
        assert!(settings.router().unwrap().rules().is_empty());
        assert!(settings.notify_backend().unwrap().is_none());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let file = write_settings("cache_ttl: 10\n");
        assert!(Settings::load(file.path()).is_err());
    }

    #[test]
    fn test_incomplete_basic_auth_rejected() {
        let settings = Settings {
            credentials: vec![CredentialEntry {
                prefix: "docker.io".to_string(),
                username: Some("user".to_string()),
                ..CredentialEntry::default()
            }],
            ..Settings::default()
        };
        assert!(settings.router().is_err());
    }

    #[test]
    fn test_both_webhooks_rejected() {
        let settings = Settings {
            notify: Some(NotifySettings {
                slack_webhook: Some("http://a".to_string()),
                google_chat_webhook: Some("http://b".to_string()),
                ..NotifySettings::default()
            }),
            ..Settings::default()
        };
        assert!(settings.notify_backend().is_err());
    }

    #[test]
    fn test_expand_env() {
        std::env::set_var("IMAGEPIN_TEST_EXPAND", "value");
        assert_eq!(expand_env("plain").unwrap(), "plain");
        assert_eq!(expand_env("${IMAGEPIN_TEST_EXPAND}").unwrap(), "value");
        assert_eq!(expand_env("a-${IMAGEPIN_TEST_EXPAND}-b").unwrap(), "a-value-b");
        assert_eq!(expand_env("$IMAGEPIN_TEST_EXPAND/x").unwrap(), "value/x");

        let err = expand_env("${IMAGEPIN_TEST_SURELY_UNSET}").unwrap_err();
        assert!(err
            .to_string()
            .contains("Environment variable 'IMAGEPIN_TEST_SURELY_UNSET' is not set"));
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(Settings::load(Path::new("/nonexistent/imagepin.yaml")).is_err());
    }
}
