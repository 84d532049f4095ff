//! # imagepin registry
//!
//! Resolution of image references against OCI-compatible registries.
//!
//! This crate turns an image specification (`repository` + exact tag or
//! wildcard pattern) into a pinned reference, caching results so that
//! repeated re-resolution stays cheap on registry rate limits.
//!
//! ## Features
//!
//! - **Single-flight cache**: concurrent identical lookups share one
//!   registry call; successes and failures are cached with separate TTLs
//! - **Credential routing**: ordered repository-prefix rules with an
//!   anonymous fallback and an optional strict mode
//! - **Version selection**: highest tag matching a wildcard pattern,
//!   compared numerically
//! - **OCI transport**: digest lookup and paginated tag listing over the
//!   OCI Distribution API
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use imagepin_registry::{
//!     CredentialRouter, OciTransport, RegistryAuth, RegistryResolver, ResolverConfig,
//!     TransportConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = CredentialRouter::default()
//!         .with_rule("ghcr.io/my-org", RegistryAuth::bearer("token"));
//!     let transport = Arc::new(OciTransport::new(TransportConfig::new())?);
//!     let resolver = RegistryResolver::new(ResolverConfig::default(), router, transport);
//!
//!     let pinned = resolver.resolve_image("ghcr.io/my-org/api", "1.*").await?;
//!     println!("{pinned}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RegistryResolver                         │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌────────────────┐  │
//! │  │ Memoizing   │  │ CredentialRouter │  │ VersionSelector│  │
//! │  │ Cache       │  │ (prefix rules)   │  │ (core crate)   │  │
//! │  └─────────────┘  └──────────────────┘  └────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                          │ RegistryTransport
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  OciTransport (HTTP)                        │
//! │     (Docker Hub, GHCR, Harbor, ECR, GCR, etc.)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod client;
mod config;
mod credentials;
mod error;
pub mod oci;
mod resolver;
mod transport;

pub use cache::{CacheConfig, CacheStats, EntryTtl, MemoizingCache};
pub use client::OciTransport;
pub use config::{ResolverConfig, TlsConfig, TransportConfig};
pub use credentials::{CredentialRouter, CredentialRule, RegistryAuth};
pub use error::{ComputationAbandoned, RegistryError, ResolveError};
pub use resolver::RegistryResolver;
pub use transport::{validate_digest, RegistryTransport};
