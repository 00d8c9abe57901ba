//! Bot API client

use super::types::{ApiResponse, Update, User};
use super::TransportError;
use crate::dispatch::{ChatId, ImageSource, MessageId};
use crate::runtime::Transport;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Headroom on top of the long-poll timeout before the HTTP request gives up
const POLL_GRACE: Duration = Duration::from_secs(10);

/// HTTP deadline for a long poll of `poll` length
fn request_timeout(poll: Duration) -> Duration {
    poll.saturating_add(POLL_GRACE)
}

/// Telegram Bot API client
pub struct TelegramClient {
    client: Client,
    /// `{api_base}/bot{token}`; never logged
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str, api_base: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{token}", api_base.trim_end_matches('/')),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<Update>, TransportError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: &["message"],
        };
        let builder = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(request_timeout(timeout))
            .json(&request);
        self.execute(builder).await
    }

    /// The bot's own account
    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Drop any configured webhook so long polling is accepted
    pub async fn delete_webhook(&self) -> Result<(), TransportError> {
        let builder = self
            .client
            .post(self.method_url("deleteWebhook"))
            .json(&serde_json::json!({ "drop_pending_updates": false }));
        let _: bool = self.execute(builder).await?;
        Ok(())
    }

    async fn call<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let builder = self.client.post(self.method_url(method)).json(body);
        self.execute(builder).await
    }

    async fn upload_photo(&self, chat_id: ChatId, path: &Path) -> Result<(), TransportError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            TransportError::invalid_request(format!("Failed to read {}: {e}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "photo".to_string(), |n| n.to_string_lossy().into_owned());

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", Part::bytes(bytes).file_name(file_name));
        let builder = self.client.post(self.method_url("sendPhoto")).multipart(form);
        let _: serde_json::Value = self.execute(builder).await?;
        Ok(())
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        // Strip the URL from reqwest errors: it carries the token
        let response = builder.send().await.map_err(|e| {
            let e = e.without_url();
            if e.is_timeout() {
                TransportError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                TransportError::network(format!("Connection failed: {e}"))
            } else {
                TransportError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("Failed to read response: {}", e.without_url())))?;

        let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                TransportError::unknown(format!("Failed to parse response: {e} - body: {body}"))
            } else {
                TransportError::from_api(status.as_u16(), &body, None)
            }
        })?;

        let ApiResponse {
            ok,
            result,
            description,
            error_code,
            parameters,
        } = parsed;
        match result {
            Some(result) if ok => Ok(result),
            _ => Err(TransportError::from_api(
                error_code.unwrap_or_else(|| status.as_u16()),
                description.as_deref().unwrap_or("no description"),
                parameters.and_then(|p| p.retry_after),
            )),
        }
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: None,
        };
        let _: serde_json::Value = self.call("sendMessage", &request).await?;
        Ok(())
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<(), TransportError> {
        let request = SendMessageRequest {
            chat_id,
            text: html,
            parse_mode: Some("HTML"),
        };
        let _: serde_json::Value = self.call("sendMessage", &request).await?;
        Ok(())
    }

    async fn send_image(&self, chat_id: ChatId, image: &ImageSource) -> Result<(), TransportError> {
        match image {
            ImageSource::Url(url) => {
                let request = SendPhotoRequest { chat_id, photo: url };
                let _: serde_json::Value = self.call("sendPhoto", &request).await?;
                Ok(())
            }
            ImageSource::File(path) => self.upload_photo(chat_id, path).await,
        }
    }

    async fn send_sticker(
        &self,
        chat_id: ChatId,
        sticker: &str,
        reply_to: Option<MessageId>,
    ) -> Result<(), TransportError> {
        let request = SendStickerRequest {
            chat_id,
            sticker,
            reply_parameters: reply_to.map(|message_id| ReplyParameters { message_id }),
        };
        let _: serde_json::Value = self.call("sendSticker", &request).await?;
        Ok(())
    }
}

// Bot API request types

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: ChatId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct SendPhotoRequest<'a> {
    chat_id: ChatId,
    photo: &'a str,
}

#[derive(Debug, Serialize)]
struct SendStickerRequest<'a> {
    chat_id: ChatId,
    sticker: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_parameters: Option<ReplyParameters>,
}

#[derive(Debug, Serialize)]
struct ReplyParameters {
    message_id: MessageId,
}
