//! Slack incoming-webhook backend.
//!
//! Messages are pooled and sent as one code block per flush.

use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::SecondsFormat;
use parking_lot::Mutex;
use serde::Serialize;

use crate::backend::{NotifyBackend, WEBHOOK_TIMEOUT};
use crate::error::NotifyError;
use crate::message::Message;

#[derive(Serialize)]
struct SlackRequestBody<'a> {
    text: &'a str,
}

/// Posts pooled messages to a Slack incoming webhook.
#[derive(Debug)]
pub struct SlackBackend {
    webhook_url: String,
    prefix: String,
    http: reqwest::Client,
    queue: Mutex<Vec<Message>>,
}

impl SlackBackend {
    /// Creates a backend posting to `webhook_url`; every line is prefixed
    /// with `prefix` (e.g. the environment name).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(webhook_url: impl Into<String>, prefix: impl Into<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            webhook_url: webhook_url.into(),
            prefix: prefix.into(),
            http,
            queue: Mutex::new(Vec::new()),
        })
    }

    /// Renders a batch as one Slack code block.
    #[must_use]
    pub fn format_batch(prefix: &str, messages: &[Message]) -> String {
        let mut text = String::from("```");
        for message in messages {
            let _ = writeln!(
                text,
                "{prefix}[{}][{}][{}] {}",
                message.time.to_rfc3339_opts(SecondsFormat::Secs, true),
                message.level,
                message.origin(),
                message.text
            );
        }
        text.push_str("```");
        text
    }
}

#[async_trait]
impl NotifyBackend for SlackBackend {
    fn push(&self, message: Message) {
        self.queue.lock().push(message);
    }

    fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    async fn flush(&self) -> Result<usize, NotifyError> {
        let batch = std::mem::take(&mut *self.queue.lock());
        if batch.is_empty() {
            return Ok(0);
        }

        let text = Self::format_batch(&self.prefix, &batch);
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&SlackRequestBody { text: &text })
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        if body != "ok" {
            return Err(NotifyError::Rejected {
                backend: self.name(),
                status,
                body,
            });
        }

        Ok(batch.len())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::message::Level;

    fn message(level: Level, text: &str, line: u32) -> Message {
        Message {
            level,
            text: text.to_string(),
            time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            file: "resolve.rs".to_string(),
            line,
        }
    }

    #[test]
    fn test_format_batch() {
        let batch = vec![
            message(Level::Warning, "slow registry", 10),
            message(Level::Error, "nginx:1.* failed", 42),
        ];

        assert_eq!(
            SlackBackend::format_batch("[prod]", &batch),
            "```[prod][2024-05-01T12:30:00Z][warn][resolve.rs:10] slow registry\n\
             [prod][2024-05-01T12:30:00Z][error][resolve.rs:42] nginx:1.* failed\n```"
        );
    }

    #[test]
    fn test_push_queues() {
        let backend = SlackBackend::new("http://localhost/hook", "").unwrap();
        backend.push(Message::new(Level::Info, "one"));
        backend.push(Message::new(Level::Info, "two"));
        assert_eq!(backend.pending(), 2);
    }

    #[tokio::test]
    async fn test_flush_empty_queue_sends_nothing() {
        let backend = SlackBackend::new("http://127.0.0.1:9/unreachable", "").unwrap();
        assert_eq!(backend.flush().await.unwrap(), 0);
    }
}
