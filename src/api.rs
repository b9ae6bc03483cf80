//! HTTP transport to the chat backend.

use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode, Url};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ChatError, Result};
use crate::protocol::{HistoryResponse, InitData, Submission, SubmissionInput};

pub const SESSION_COOKIE: &str = "session_id";

#[derive(Debug, Clone)]
pub struct ChatApi {
    client: Client,
    base: String,
    request_timeout: std::time::Duration,
}

impl ChatApi {
    /// Build a client bound to `config.server_url`, carrying the session
    /// cookie on every request.
    pub fn new(config: &ClientConfig, session_id: &str) -> Result<Self> {
        let base = config.server_url.trim_end_matches('/').to_string();
        let jar = Jar::default();
        match Url::parse(&base) {
            Ok(url) => jar.add_cookie_str(&format!("{SESSION_COOKIE}={session_id}; Path=/"), &url),
            Err(e) => warn!(error = %e, server = %base, "server url does not parse; no session cookie"),
        }
        let client = Client::builder()
            .cookie_provider(Arc::new(jar))
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            client,
            base,
            request_timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// `POST /api/chat/`. On success the body is the response stream.
    ///
    /// No overall timeout applies: a spoken answer can stream for a while.
    pub async fn submit(&self, submission: &Submission) -> Result<Response> {
        let mut form = match &submission.input {
            SubmissionInput::Text(text) => Form::new().text("text", text.clone()),
            SubmissionInput::Audio(audio) => {
                let part = Part::bytes(audio.bytes.clone())
                    .file_name(audio.file_name.clone())
                    .mime_str(&audio.mime_type)?;
                Form::new().part("file", part)
            }
        };
        if let Some(id) = &submission.channel_id {
            form = form.text("channel_id", id.clone());
        }
        if let Some(model) = &submission.model {
            form = form.text("model", model.clone());
        }

        let url = self.url("/api/chat/");
        info!(
            kind = submission.input.kind(),
            channel = submission.channel_id.as_deref().unwrap_or("-"),
            model = submission.model.as_deref().unwrap_or("-"),
            "dispatching submission"
        );
        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();
        debug!(%status, "submission answered");

        if status == StatusCode::NOT_FOUND {
            return Err(ChatError::NoModels);
        }
        if !status.is_success() {
            return Err(ChatError::Status { status: status.as_u16(), url });
        }
        Ok(response)
    }

    /// `GET /api/history/{id}`.
    pub async fn fetch_history(&self, channel_id: &str) -> Result<HistoryResponse> {
        let url = self.url(&format!("/api/history/{channel_id}"));
        let response = self.checked(self.client.get(&url), &url).await?;
        Ok(response.json().await?)
    }

    /// `GET /api/data`: channels and models.
    pub async fn fetch_init_data(&self) -> Result<InitData> {
        let url = self.url("/api/data");
        let response = self.checked(self.client.get(&url), &url).await?;
        Ok(response.json().await?)
    }

    /// `DELETE /api/history/{id}/`.
    pub async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        let url = self.url(&format!("/api/history/{channel_id}/"));
        self.checked(self.client.delete(&url), &url).await?;
        info!(channel = channel_id, "channel deleted");
        Ok(())
    }

    /// `DELETE /api/history/delete-all`.
    pub async fn delete_all(&self) -> Result<()> {
        let url = self.url("/api/history/delete-all");
        self.checked(self.client.delete(&url), &url).await?;
        info!("all channels deleted");
        Ok(())
    }

    async fn checked(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Response> {
        let response = request.timeout(self.request_timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, url, "request failed");
            return Err(ChatError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ClientConfig {
            server_url: "http://localhost:8000/".into(),
            ..ClientConfig::default()
        };
        let api = ChatApi::new(&config, "s1").unwrap();
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("/api/data"), "http://localhost:8000/api/data");
    }

    #[test]
    fn test_unparseable_server_still_builds() {
        let config = ClientConfig {
            server_url: "not a url".into(),
            ..ClientConfig::default()
        };
        assert!(ChatApi::new(&config, "s1").is_ok());
    }
}
