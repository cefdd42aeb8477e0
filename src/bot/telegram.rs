// Telegram Transport
// Bot API calls over reqwest: long polling, replies, document upload and download

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {code} - {description}")]
    ApiError { code: i64, description: String },
    #[error("Missing result in response")]
    MissingResult,
    #[error("File I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

fn unwrap_response<T>(response: ApiResponse<T>) -> Result<T, TelegramError> {
    if !response.ok {
        return Err(TelegramError::ApiError {
            code: response.error_code.unwrap_or(0),
            description: response.description.unwrap_or_default(),
        });
    }
    response.result.ok_or(TelegramError::MissingResult)
}

/// What the dispatcher needs from a chat platform.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Updates with id >= `offset`, waiting up to `timeout_secs` for new ones.
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TelegramError>;
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError>;
    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<(), TelegramError>;
    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<(), TelegramError>;
}

pub struct TelegramClient {
    client: Client,
    api_base: String,
    file_base: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(TELEGRAM_API_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Self {
        // Must outlive the long-poll timeout
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_default();
        let base = base_url.trim_end_matches('/');

        Self {
            client,
            api_base: format!("{}/bot{}", base, token),
            file_base: format!("{}/file/bot{}", base, token),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &serde_json::Value) -> Result<T, TelegramError> {
        let start = Instant::now();
        let response: ApiResponse<T> = self
            .client
            .post(self.method_url(method))
            .json(params)
            .send()
            .await?
            .json()
            .await?;
        debug!(method, latency_ms = start.elapsed().as_millis() as i64, "telegram.call");
        unwrap_response(response)
    }
}

impl Transport for TelegramClient {
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TelegramError> {
        let params = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", &params).await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let params = serde_json::json!({ "chat_id": chat_id, "text": text });
        let _: serde_json::Value = self.call("sendMessage", &params).await?;
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<(), TelegramError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "report".to_string());

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", Part::bytes(bytes).file_name(file_name));

        let response: ApiResponse<serde_json::Value> = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;
        unwrap_response(response)?;
        debug!(chat_id, path = %path.display(), "telegram.document_sent");
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> Result<(), TelegramError> {
        let info: FileInfo = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await?;
        let file_path = info.file_path.ok_or(TelegramError::MissingResult)?;

        let bytes = self
            .client
            .get(format!("{}/{}", self.file_base, file_path))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(dest, &bytes).await?;
        debug!(file_id, bytes = bytes.len(), "telegram.file_downloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_with_document_deserializes() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 5,
                "chat": {"id": 99, "type": "private"},
                "from": {"id": 42, "is_bot": false, "first_name": "A"},
                "document": {"file_id": "abc", "file_name": "essay.docx", "file_size": 1200}
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 99);
        assert_eq!(message.from.unwrap().id, 42);
        assert!(message.text.is_none());
        assert_eq!(message.document.unwrap().file_name.as_deref(), Some("essay.docx"));
    }

    #[test]
    fn test_error_response_maps_to_api_error() {
        let raw = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        match unwrap_response(response) {
            Err(TelegramError::ApiError { code, description }) => {
                assert_eq!(code, 401);
                assert_eq!(description, "Unauthorized");
            }
            other => panic!("unexpected: {:?}", other.map(|u| u.len())),
        }
    }

    #[test]
    fn test_urls_embed_token() {
        let client = TelegramClient::with_base_url("http://localhost:8081/", "123:abc");
        assert_eq!(client.method_url("getMe"), "http://localhost:8081/bot123:abc/getMe");
        assert_eq!(client.file_base, "http://localhost:8081/file/bot123:abc");
    }
}
