//! # imagepin Core
//!
//! Core types shared by the imagepin crates:
//!
//! - [`ImageSpec`] - an image as requested: repository plus exact tag or wildcard pattern
//! - [`PinnedReference`] - the resolved, deployable reference
//! - [`Repository`] - registry host and path used to address the registry API
//! - [`VersionSelector`] - picks the highest tag matching a [`TagPattern`]
//!
//! ## Example
//!
//! ```rust
//! use imagepin_core::{ImageSpec, PinnedReference, VersionSelector};
//!
//! let spec = ImageSpec::parse("ghcr.io/org/api:1.*").unwrap();
//! assert!(spec.is_wildcard());
//!
//! let tag = VersionSelector::new()
//!     .select_highest(&spec.tag_spec, &["1.0", "1.5", "2.0"])
//!     .unwrap();
//! let pinned = PinnedReference::tagged(&spec.repository_url, tag);
//! assert_eq!(pinned.to_string(), "ghcr.io/org/api:1.5");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod reference;
pub mod version;


pub use error::{Error, Result};
pub use reference::{
    validate_pattern, validate_tag, ImageSpec, Pin, PinnedReference, Repository, DEFAULT_TAG,
    DOCKER_HUB, WILDCARD,
};
pub use version::{TagPattern, VersionSelector};
