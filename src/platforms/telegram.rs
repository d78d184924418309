// src/platforms/telegram.rs - Telegram Bot API transport

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use url::Url;

use crate::platforms::Transport;
use crate::types::{CollaboratorError, MemberStatus};

const DEFAULT_API_URL: &str = "https://api.telegram.org";
const REPLY_TARGET_GONE: &str = "message to be replied not found";
const DELETE_TARGET_GONE: &str = "message to delete not found";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the Telegram Bot API
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_url: Url,
}

impl TelegramConfig {
    /// Load Telegram configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("BOT_TOKEN").context("BOT_TOKEN environment variable not set")?;

        // Tokens look like "<bot id>:<secret>"
        if !bot_token.contains(':') {
            return Err(anyhow::anyhow!(
                "BOT_TOKEN does not look like a bot token - got: {}...",
                bot_token.chars().take(6).collect::<String>()
            ));
        }

        let raw_url = lookup("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(&raw_url).with_context(|| format!("Invalid TELEGRAM_API_URL: {}", raw_url))?;

        info!("Loaded Telegram config for API {}", api_url);
        Ok(Self { bot_token, api_url })
    }

    /// `https://api.telegram.org/bot<token>/`
    pub fn method_base(&self) -> Result<Url> {
        if self.api_url.cannot_be_a_base() {
            return Err(anyhow::anyhow!("TELEGRAM_API_URL cannot be used as a base URL"));
        }

        // Built by path rather than `join`: the token's colon would parse as a scheme
        let mut base = self.api_url.clone();
        let prefix = base.path().trim_end_matches('/').to_string();
        base.set_path(&format!("{}/bot{}/", prefix, self.bot_token));
        Ok(base)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ChatMemberResult {
    status: String,
    is_member: Option<bool>,
}

/// Numeric ids go out as numbers; anything else as given
fn id_value(id: &str) -> Value {
    id.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(id))
}

/// Telegram Bot API client
pub struct TelegramClient {
    http: reqwest::Client,
    base: Url,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            http,
            base: config.method_base()?,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<ApiResponse<T>, CollaboratorError> {
        let url = self
            .base
            .join(method)
            .map_err(|e| CollaboratorError::Unavailable(format!("bad method URL: {}", e)))?;

        debug!("Calling Telegram method {}", method);
        let response = self.http.post(url).json(&body).send().await?;
        Ok(response.json::<ApiResponse<T>>().await?)
    }
}

fn rejection(method: &str, description: Option<String>) -> CollaboratorError {
    CollaboratorError::Rejected(format!(
        "{}: {}",
        method,
        description.unwrap_or_else(|| "no description".to_string())
    ))
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_reply(
        &self,
        chat_id: &str,
        text: &str,
        thread_id: Option<&str>,
        reply_to: Option<&str>,
    ) -> Result<(), CollaboratorError> {
        let mut body = json!({
            "chat_id": id_value(chat_id),
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(thread) = thread_id {
            body["message_thread_id"] = id_value(thread);
        }
        if let Some(message) = reply_to {
            body["reply_to_message_id"] = id_value(message);
        }

        let response: ApiResponse<Value> = self.call("sendMessage", body).await?;
        if response.ok {
            return Ok(());
        }

        match response.description {
            Some(description) if description.contains(REPLY_TARGET_GONE) => {
                warn!("Reply target {:?} in {} is gone, skipping message", reply_to, chat_id);
                Ok(())
            }
            description => Err(rejection("sendMessage", description)),
        }
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), CollaboratorError> {
        let body = json!({
            "chat_id": id_value(chat_id),
            "message_id": id_value(message_id),
        });

        let response: ApiResponse<bool> = self.call("deleteMessage", body).await?;
        if response.ok {
            return Ok(());
        }

        match response.description {
            Some(description) if description.contains(DELETE_TARGET_GONE) => {
                warn!("Message {} in {} was already deleted", message_id, chat_id);
                Ok(())
            }
            description => Err(rejection("deleteMessage", description)),
        }
    }

    async fn chat_member_count(&self, chat_id: &str) -> Result<u64, CollaboratorError> {
        let response: ApiResponse<u64> = self
            .call("getChatMemberCount", json!({ "chat_id": id_value(chat_id) }))
            .await?;

        match (response.ok, response.result) {
            (true, Some(count)) => Ok(count),
            (_, _) => Err(rejection("getChatMemberCount", response.description)),
        }
    }

    async fn member_status(&self, chat_id: &str, user_id: &str) -> Result<MemberStatus, CollaboratorError> {
        let body = json!({
            "chat_id": id_value(chat_id),
            "user_id": id_value(user_id),
        });

        let response: ApiResponse<ChatMemberResult> = self.call("getChatMember", body).await?;
        match (response.ok, response.result) {
            (true, Some(member)) => Ok(MemberStatus::from_platform(&member.status, member.is_member)),
            (_, _) => Err(rejection("getChatMember", response.description)),
        }
    }

    async fn set_webhook(&self, url: &str) -> Result<(), CollaboratorError> {
        let response: ApiResponse<bool> = self.call("setWebhook", json!({ "url": url })).await?;
        if response.ok {
            info!("Registered webhook {}", url);
            Ok(())
        } else {
            Err(rejection("setWebhook", response.description))
        }
    }

    fn platform_name(&self) -> &str {
        "telegram"
    }
}
