//! The notification facade used by the rest of the application.

use std::sync::Arc;

use crate::backend::NotifyBackend;
use crate::message::{Level, Message};

/// Logs through `tracing` and forwards to an optional chat backend.
///
/// Warnings and errors are always forwarded; info messages only when the
/// notifier is verbose.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    backend: Option<Arc<dyn NotifyBackend>>,
    verbose: bool,
}

impl Notifier {
    /// Creates a notifier with no backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forwards messages to `backend`.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn NotifyBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Forwards info messages too.
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The configured backend, if any.
    #[must_use]
    pub fn backend(&self) -> Option<&Arc<dyn NotifyBackend>> {
        self.backend.as_ref()
    }

    /// Reports an informational message.
    #[track_caller]
    pub fn info(&self, text: impl Into<String>) {
        self.emit(Message::new(Level::Info, text));
    }

    /// Reports a warning.
    #[track_caller]
    pub fn warning(&self, text: impl Into<String>) {
        self.emit(Message::new(Level::Warning, text));
    }

    /// Reports an error.
    #[track_caller]
    pub fn error(&self, text: impl Into<String>) {
        self.emit(Message::new(Level::Error, text));
    }

    fn emit(&self, message: Message) {
        let origin = message.origin();
        match message.level {
            Level::Info => tracing::info!(origin = %origin, "{}", message.text),
            Level::Warning => tracing::warn!(origin = %origin, "{}", message.text),
            Level::Error => tracing::error!(origin = %origin, "{}", message.text),
        }

        if message.level == Level::Info && !self.verbose {
            return;
        }
        if let Some(ref backend) = self.backend {
            backend.push(message);
        }
    }
}
