//! Telegram Bot API client: message delivery and update polling.

use async_trait::async_trait;
use pipewatch_core::{MessageFormat, NotificationSink};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Upper bound of one `sendMessage` call.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram Bot API client.
pub struct TelegramClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    send_timeout: Duration,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_url(DEFAULT_API_URL, token)
    }

    pub fn with_api_url(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            send_timeout: SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Send a text message. Rich messages are parsed as Markdown.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        format: MessageFormat,
    ) -> Result<(), TelegramError> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: match format {
                MessageFormat::Rich => Some("Markdown"),
                MessageFormat::Plain => None,
            },
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .timeout(self.send_timeout)
            .send()
            .await
            .map_err(|e| TelegramError::Request(e.to_string()))?;

        parse_response::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Long-poll for updates with an id of at least `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout.as_secs().to_string()),
                ("allowed_updates", r#"["message","edited_message"]"#.to_string()),
            ])
            // Leave the server room to answer an empty poll.
            .timeout(timeout + Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| TelegramError::Request(e.to_string()))?;

        Ok(parse_response::<Vec<Update>>(response)
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl NotificationSink for TelegramClient {
    async fn deliver(
        &self,
        recipient: i64,
        text: &str,
        format: MessageFormat,
    ) -> pipewatch_core::Result<()> {
        self.send_message(recipient, text, format)
            .await
            .map_err(|e| pipewatch_core::Error::Delivery(e.to_string()))
    }
}

/// Telegram answers with an envelope even on HTTP errors, so the envelope
/// is checked before the status code.
async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Option<T>, TelegramError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| TelegramError::Request(e.to_string()))?;

    let envelope: ApiResponse<T> = match serde_json::from_str(&text) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(TelegramError::Api(format!("{}: {}", status, text)));
        }
        Err(e) => return Err(TelegramError::Parse(e.to_string())),
    };

    if !envelope.ok {
        return Err(TelegramError::Api(
            envelope
                .description
                .unwrap_or_else(|| status.to_string()),
        ));
    }
    Ok(envelope.result)
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub edited_message: Option<Message>,
}

impl Update {
    /// The message carried by this update. A new message wins over an edit.
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref().or(self.edited_message.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

/// Telegram API errors.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
