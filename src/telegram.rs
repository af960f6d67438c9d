//! Telegram Bot API client
//!
//! Only the handful of calls the relay needs: text, photo, document, media group and location.
//! Every relayed message is sent silently (`disable_notification`). Local files are uploaded as
//! multipart parts; media groups reference their parts through `attach://` names.
//!
//! Failures are classified into [`TelegramError`] so the deliverer can tell a timeout (retry)
//! from a rejected payload (give up on that one message).

use crate::config::TelegramConfig;
use crate::error::{Error, Result, TelegramError};
use crate::types::Location;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Text of the notice sent when the relay cannot start
pub const CRASH_NOTICE: &str = "Bot crashed!";

/// Destination for relayed messages
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send a text message; `link_preview` controls the web page preview
    async fn send_text(&self, text: &str, link_preview: bool) -> Result<()>;

    /// Upload a local picture as a photo
    async fn send_photo(&self, path: &Path) -> Result<()>;

    /// Upload a local file as a document (used for animated pictures)
    async fn send_document(&self, path: &Path) -> Result<()>;

    /// Upload several local pictures as one grouped message (2 to 10 items)
    async fn send_media_group(&self, paths: &[&Path]) -> Result<()>;

    /// Send a location pin
    async fn send_location(&self, location: Location) -> Result<()>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_notification: bool,
    disable_web_page_preview: bool,
}

#[derive(Serialize)]
struct SendLocation<'a> {
    chat_id: &'a str,
    latitude: f64,
    longitude: f64,
    disable_notification: bool,
}

#[derive(Serialize)]
struct InputMediaPhoto {
    #[serde(rename = "type")]
    kind: &'static str,
    media: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Bot API client bound to one destination chat
pub struct TelegramClient {
    http_client: reqwest::Client,
    base_url: String,
    chat_id: String,
}

impl TelegramClient {
    /// Create a client from Telegram settings
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: format!(
                "{}/bot{}",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        })
    }

    /// Send the crash notice (with notification, unlike relayed messages)
    pub async fn notify_crash(&self) -> Result<()> {
        self.send_message(CRASH_NOTICE, false, false).await
    }

    async fn send_message(&self, text: &str, link_preview: bool, silent: bool) -> Result<()> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            disable_notification: silent,
            disable_web_page_preview: !link_preview,
        };
        self.call_json("sendMessage", &body).await
    }

    async fn send_file(&self, method: &'static str, field: &'static str, path: &Path) -> Result<()> {
        let form = self.base_form().part(field, file_part(path).await?);
        self.call_multipart(method, form).await
    }

    fn base_form(&self) -> Form {
        Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("disable_notification", "true")
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call_json<T: Serialize + ?Sized>(&self, method: &'static str, body: &T) -> Result<()> {
        let result = self
            .http_client
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await;
        check_response(method, result).await
    }

    async fn call_multipart(&self, method: &'static str, form: Form) -> Result<()> {
        let result = self
            .http_client
            .post(self.endpoint(method))
            .multipart(form)
            .send()
            .await;
        check_response(method, result).await
    }
}

#[async_trait]
impl MessageSink for TelegramClient {
    async fn send_text(&self, text: &str, link_preview: bool) -> Result<()> {
        self.send_message(text, link_preview, true).await
    }

    async fn send_photo(&self, path: &Path) -> Result<()> {
        self.send_file("sendPhoto", "photo", path).await
    }

    async fn send_document(&self, path: &Path) -> Result<()> {
        self.send_file("sendDocument", "document", path).await
    }

    async fn send_media_group(&self, paths: &[&Path]) -> Result<()> {
        let mut media = Vec::with_capacity(paths.len());
        let mut form = self.base_form();

        for (index, path) in paths.iter().enumerate() {
            let name = format!("file{}", index);
            media.push(InputMediaPhoto {
                kind: "photo",
                media: format!("attach://{}", name),
            });
            form = form.part(name, file_part(path).await?);
        }

        let form = form.text("media", serde_json::to_string(&media)?);
        self.call_multipart("sendMediaGroup", form).await
    }

    async fn send_location(&self, location: Location) -> Result<()> {
        let body = SendLocation {
            chat_id: &self.chat_id,
            latitude: location.latitude,
            longitude: location.longitude,
            disable_notification: true,
        };
        self.call_json("sendLocation", &body).await
    }
}

async fn file_part(path: &Path) -> Result<Part> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    Ok(Part::bytes(bytes).file_name(file_name))
}

/// Turn a Bot API round trip into `Ok(())` or a classified error
async fn check_response(
    method: &'static str,
    result: std::result::Result<reqwest::Response, reqwest::Error>,
) -> Result<()> {
    let response = match result {
        Ok(response) => response,
        Err(e) if e.is_timeout() => return Err(TelegramError::TimedOut { method }.into()),
        Err(e) => return Err(e.into()),
    };

    let status = response.status();
    let body = match response.json::<ApiResponse>().await {
        Ok(body) => Some(body),
        Err(e) if e.is_timeout() => return Err(TelegramError::TimedOut { method }.into()),
        Err(_) => None,
    };

    if status.is_success() && body.as_ref().is_some_and(|b| b.ok) {
        debug!(method, "telegram call succeeded");
        return Ok(());
    }

    let code = body
        .as_ref()
        .and_then(|b| b.error_code)
        .unwrap_or_else(|| status.as_u16());
    let retry_after = body
        .as_ref()
        .and_then(|b| b.parameters.as_ref())
        .and_then(|p| p.retry_after);
    let description = body
        .and_then(|b| b.description)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    Err(match code {
        400 => TelegramError::BadRequest {
            method,
            description,
        },
        429 => TelegramError::RateLimited {
            method,
            retry_after,
        },
        _ => TelegramError::Api {
            method,
            code,
            description,
        },
    }
    .into())
}
