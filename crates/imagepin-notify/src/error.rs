//! Notification errors.

/// Errors that can occur while delivering notifications.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// HTTP transport error
    #[error("Webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The webhook answered but did not accept the message
    #[error("{backend} rejected the message (HTTP {status}): {body}")]
    Rejected {
        /// Backend name.
        backend: &'static str,
        /// HTTP status returned.
        status: u16,
        /// Response body.
        body: String,
    },
}
