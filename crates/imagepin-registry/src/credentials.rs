//! Credential selection per repository.
//!
//! Rules are matched by string prefix in configuration order; the first
//! matching rule wins even if a later rule has a longer prefix. Repositories
//! that match no rule use [`RegistryAuth::Anonymous`].

use std::fmt;

use base64::Engine;

use crate::error::ResolveError;

static ANONYMOUS: RegistryAuth = RegistryAuth::Anonymous;

/// Authentication material for one registry (the credential handle).
#[derive(Clone, PartialEq, Eq, Default)]
pub enum RegistryAuth {
    /// No credentials.
    #[default]
    Anonymous,

    /// Basic authentication (username/password or username/token).
    Basic {
        /// Username.
        username: String,
        /// Password or token.
        password: String,
    },

    /// Bearer token authentication.
    Bearer {
        /// Token value.
        token: String,
    },
}

impl RegistryAuth {
    /// Creates basic authentication.
    ///
    /// # Examples
    ///
    /// ```
    /// use imagepin_registry::RegistryAuth;
    ///
    /// let auth = RegistryAuth::basic("user", "pass");
    /// assert_eq!(
    ///     auth.authorization_header().as_deref(),
    ///     Some("Basic dXNlcjpwYXNz")
    /// );
    /// ```
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates bearer token authentication.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Returns true for [`RegistryAuth::Anonymous`].
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Value for the HTTP `Authorization` header, if any.
    #[must_use]
    pub fn authorization_header(&self) -> Option<String> {
        match self {
            Self::Anonymous => None,
            Self::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                Some(format!("Basic {encoded}"))
            }
            Self::Bearer { token } => Some(format!("Bearer {token}")),
        }
    }
}

// Secrets never reach logs.
impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

impl fmt::Display for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Basic { username, .. } => write!(f, "basic({username})"),
            Self::Bearer { .. } => f.write_str("bearer"),
        }
    }
}

/// Maps repositories starting with `prefix` to `auth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRule {
    /// Repository prefix (e.g. `ghcr.io/my-org`). An empty prefix matches
    /// every repository.
    pub prefix: String,

    /// Credentials used for matching repositories.
    pub auth: RegistryAuth,
}

impl CredentialRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(prefix: impl Into<String>, auth: RegistryAuth) -> Self {
        Self {
            prefix: prefix.into(),
            auth,
        }
    }

    /// Returns true if this rule applies to `repository_url`.
    #[must_use]
    pub fn matches(&self, repository_url: &str) -> bool {
        repository_url.starts_with(&self.prefix)
    }
}

/// Ordered prefix rules with an anonymous fallback.
#[derive(Debug, Clone, Default)]
pub struct CredentialRouter {
    rules: Vec<CredentialRule>,
    strict: bool,
}

impl CredentialRouter {
    /// Creates a router from rules in priority order.
    #[must_use]
    pub fn new(rules: impl IntoIterator<Item = CredentialRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
            strict: false,
        }
    }

    /// Appends a rule with the lowest priority so far.
    #[must_use]
    pub fn with_rule(mut self, prefix: impl Into<String>, auth: RegistryAuth) -> Self {
        self.rules.push(CredentialRule::new(prefix, auth));
        self
    }

    /// In strict mode [`route`](Self::route) fails instead of falling back
    /// to anonymous access.
    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Returns true if strict mode is enabled.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Configured rules in priority order.
    #[must_use]
    pub fn rules(&self) -> &[CredentialRule] {
        &self.rules
    }

    /// Returns the credentials of the first matching rule, or anonymous.
    ///
    /// # Examples
    ///
    /// ```
    /// use imagepin_registry::{CredentialRouter, RegistryAuth};
    ///
    /// let router = CredentialRouter::default()
    ///     .with_rule("docker.io/lib", RegistryAuth::bearer("a"))
    ///     .with_rule("docker.io", RegistryAuth::bearer("b"));
    ///
    /// assert_eq!(router.resolve("docker.io/lib/nginx"), &RegistryAuth::bearer("a"));
    /// assert_eq!(router.resolve("docker.io/bitnami/redis"), &RegistryAuth::bearer("b"));
    /// assert!(router.resolve("ghcr.io/org/app").is_anonymous());
    /// ```
    #[must_use]
    pub fn resolve(&self, repository_url: &str) -> &RegistryAuth {
        self.find(repository_url).unwrap_or(&ANONYMOUS)
    }

    /// Like [`resolve`](Self::resolve) but honours strict mode.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidCredential`] in strict mode when no
    /// rule matches.
    pub fn route(&self, repository_url: &str) -> Result<&RegistryAuth, ResolveError> {
        match self.find(repository_url) {
            Some(auth) => Ok(auth),
            None if self.strict => Err(ResolveError::InvalidCredential {
                repository: repository_url.to_string(),
            }),
            None => Ok(&ANONYMOUS),
        }
    }

    fn find(&self, repository_url: &str) -> Option<&RegistryAuth> {
        self.rules
            .iter()
            .find(|rule| rule.matches(repository_url))
            .map(|rule| &rule.auth)
    }
}
