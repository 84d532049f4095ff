//! Google Chat webhook backend.
//!
//! Sends one queued message per flush as a `cardsV2` card.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::backend::{NotifyBackend, WEBHOOK_TIMEOUT};
use crate::error::NotifyError;
use crate::message::Message;

/// Columns per card row.
const COLUMNS_PER_ROW: usize = 2;

/// Posts queued messages to a Google Chat webhook, one per flush.
#[derive(Debug)]
pub struct GoogleChatBackend {
    webhook_url: String,
    prefix: String,
    http: reqwest::Client,
    queue: Mutex<VecDeque<Message>>,
}

impl GoogleChatBackend {
    /// Creates a backend posting to `webhook_url`; `prefix` fills the card's
    /// `Env` column.
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
            queue: Mutex::new(VecDeque::new()),
        })
    }

    /// Builds the webhook payload for one message.
    #[must_use]
    pub fn card_payload(prefix: &str, message: &Message) -> Value {
        let columns = [
            ("Level", message.level.to_string()),
            ("Env", prefix.to_string()),
            ("File", message.origin()),
        ];

        let mut widgets = vec![json!({ "textParagraph": { "text": message.text } })];
        widgets.extend(columns.chunks(COLUMNS_PER_ROW).map(|row| {
            let items: Vec<Value> = row
                .iter()
                .map(|(name, value)| {
                    json!({
                        "widgets": [
                            { "textParagraph": { "text": name } },
                            { "textParagraph": { "text": value } },
                        ]
                    })
                })
                .collect();
            json!({ "columns": { "columnItems": items } })
        }));

        json!({
            "cardsV2": [{
                "cardId": "card1",
                "card": {
                    "sections": [{
                        "collapsible": false,
                        "widgets": widgets,
                    }]
                }
            }]
        })
    }
}

#[async_trait]
impl NotifyBackend for GoogleChatBackend {
    fn push(&self, message: Message) {
        self.queue.lock().push_back(message);
    }

    fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    async fn flush(&self) -> Result<usize, NotifyError> {
        let Some(message) = self.queue.lock().pop_front() else {
            return Ok(0);
        };

        let payload = Self::card_payload(&self.prefix, &message);
        let response = self.http.post(&self.webhook_url).json(&payload).send().await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                backend: self.name(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(1)
    }

    fn name(&self) -> &'static str {
        "google-chat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Level;

    #[test]
    fn test_card_layout() {
        let message = Message {
            level: Level::Error,
            text: "resolution failed".to_string(),
            time: chrono::Utc::now(),
            file: "main.rs".to_string(),
            line: 7,
        };

        let payload = GoogleChatBackend::card_payload("staging", &message);
        let widgets = &payload["cardsV2"][0]["card"]["sections"][0]["widgets"];

        assert_eq!(widgets[0]["textParagraph"]["text"], "resolution failed");

        let first_row = widgets[1]["columns"]["columnItems"].as_array().unwrap();
        assert_eq!(first_row.len(), 2);
        assert_eq!(first_row[0]["widgets"][0]["textParagraph"]["text"], "Level");
        assert_eq!(first_row[0]["widgets"][1]["textParagraph"]["text"], "error");
        assert_eq!(first_row[1]["widgets"][1]["textParagraph"]["text"], "staging");

        let second_row = widgets[2]["columns"]["columnItems"].as_array().unwrap();
        assert_eq!(second_row.len(), 1);
        assert_eq!(second_row[0]["widgets"][1]["textParagraph"]["text"], "main.rs:7");
    }

    #[test]
    fn test_queue_is_fifo() {
        let backend = GoogleChatBackend::new("http://localhost/hook", "").unwrap();
        backend.push(Message::new(Level::Info, "first"));
        backend.push(Message::new(Level::Info, "second"));
        assert_eq!(backend.pending(), 2);
        assert_eq!(backend.queue.lock().front().map(|m| m.text.as_str()), Some("first"));
    }
}
