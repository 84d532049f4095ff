//! # imagepin notify
//!
//! Chat webhook notifications for imagepin.
//!
//! A [`Notifier`] logs every message through `tracing` and forwards
//! warnings and errors (and, when verbose, info messages) to a
//! [`NotifyBackend`]. Backends queue messages without blocking; a flusher
//! task started with [`spawn_flusher`] delivers them once per interval:
//!
//! - [`SlackBackend`] pools everything queued since the last tick into one
//!   code block.
//! - [`GoogleChatBackend`] sends one message per tick as a card.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use imagepin_notify::{spawn_flusher, Notifier, SlackBackend, DEFAULT_FLUSH_INTERVAL};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = Arc::new(SlackBackend::new("https://hooks.slack.com/services/...", "[prod]")?);
//!     let (shutdown, signal) = tokio::sync::watch::channel(false);
//!     let flusher = spawn_flusher(backend.clone(), DEFAULT_FLUSH_INTERVAL, signal);
//!
//!     let notifier = Notifier::new().with_backend(backend);
//!     notifier.error("nginx:1.* could not be resolved");
//!
//!     shutdown.send(true)?;
//!     flusher.await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod google_chat;
mod message;
mod notifier;
mod slack;

pub use backend::{spawn_flusher, NotifyBackend, DEFAULT_FLUSH_INTERVAL};
pub use error::NotifyError;
pub use google_chat::GoogleChatBackend;
pub use message::{Level, Message};
pub use notifier::Notifier;
pub use slack::SlackBackend;
