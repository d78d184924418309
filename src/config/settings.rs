// src/config/settings.rs - Environment-supplied engine settings

use anyhow::{Context, Result};
use log::{debug, info};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::PathBuf;

use crate::bot::exemptions::ExemptionSet;
use crate::types::ThreadRole;

const DEFAULT_CONFIG_DIR: &str = "config";
const DEFAULT_WEBHOOK_PORT: u16 = 8443;

/// Thread identifiers for the special-purpose threads of one chat
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatThreads {
    #[serde(default, deserialize_with = "optional_id")]
    pub newbies: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub test_results: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub group_test: Option<String>,
}

impl ChatThreads {
    fn role_of(&self, thread_id: &str) -> Option<ThreadRole> {
        let is = |slot: &Option<String>| slot.as_deref() == Some(thread_id);
        if is(&self.newbies) {
            Some(ThreadRole::Newbies)
        } else if is(&self.test_results) {
            Some(ThreadRole::TestResults)
        } else if is(&self.group_test) {
            Some(ThreadRole::GroupTest)
        } else {
            None
        }
    }
}

/// Thread ids arrive either as JSON strings or numbers
fn optional_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("expected a thread id, got {}", other))),
    }
}

/// Which chats are moderated and what role each of their threads plays
#[derive(Debug, Clone, Default)]
pub struct ChatRouting {
    pub moderated_chats: HashSet<String>,
    pub threads: HashMap<String, ChatThreads>,
}

impl ChatRouting {
    pub fn is_moderated(&self, chat_id: &str) -> bool {
        self.moderated_chats.contains(chat_id)
    }

    pub fn thread_role(&self, chat_id: &str, thread_id: Option<&str>) -> Option<ThreadRole> {
        let thread_id = thread_id?;
        self.threads.get(chat_id)?.role_of(thread_id)
    }

    /// `(chat_id, thread_id)` of every moderated chat's newbies thread
    pub fn newbie_threads(&self) -> Vec<(String, String)> {
        let mut targets: Vec<(String, String)> = self
            .moderated_chats
            .iter()
            .filter_map(|chat| {
                let thread = self.threads.get(chat)?.newbies.clone()?;
                Some((chat.clone(), thread))
            })
            .collect();
        targets.sort();
        targets
    }
}

/// Process-wide settings, read once at startup
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub routing: ChatRouting,
    pub exemptions: ExemptionSet,
    pub config_dir: PathBuf,
    pub webhook_port: u16,
    pub watch_config: bool,
    pub announcements_enabled: bool,
    pub dry_run: bool,
    pub admin_token: Option<String>,
    /// Public URL registered with Telegram at startup
    pub webhook_url: Option<String>,
    /// Chat whose membership `/login` checks
    pub login_chat_id: Option<String>,
}

impl EngineSettings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let moderated_chats: HashSet<String> = split_list(
            &lookup("MODERATED_CHATS").context("MODERATED_CHATS environment variable not set")?,
        )
        .into_iter()
        .collect();

        if moderated_chats.is_empty() {
            return Err(anyhow::anyhow!("No chats specified in MODERATED_CHATS"));
        }

        let threads: HashMap<String, ChatThreads> = match lookup("CHAT_THREADS") {
            Some(raw) if !raw.trim().is_empty() => {
                serde_json::from_str(&raw).context("CHAT_THREADS must be a JSON object keyed by chat id")?
            }
            _ => HashMap::new(),
        };

        for chat in threads.keys() {
            if !moderated_chats.contains(chat) {
                debug!("CHAT_THREADS lists chat {} which is not moderated", chat);
            }
        }

        let exemptions = ExemptionSet::new(
            split_list(&lookup("MODERATOR_HANDLES").unwrap_or_default()),
            split_list(&lookup("EXEMPT_THREADS").unwrap_or_default()),
        );

        let webhook_port = match lookup("WEBHOOK_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("WEBHOOK_PORT is not a valid port: {}", raw))?,
            None => DEFAULT_WEBHOOK_PORT,
        };

        let settings = Self {
            routing: ChatRouting { moderated_chats, threads },
            exemptions,
            config_dir: PathBuf::from(lookup("CONFIG_DIR").unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string())),
            webhook_port,
            watch_config: parse_flag(lookup("WATCH_CONFIG"), true),
            announcements_enabled: parse_flag(lookup("ANNOUNCEMENTS_ENABLED"), false),
            dry_run: parse_flag(lookup("DRY_RUN"), false),
            admin_token: non_empty(lookup("ADMIN_TOKEN")),
            webhook_url: non_empty(lookup("WEBHOOK_URL")),
            login_chat_id: non_empty(lookup("LOGIN_CHAT_ID")),
        };

        info!(
            "Loaded settings for {} moderated chat(s), {} moderator(s)",
            settings.routing.moderated_chats.len(),
            settings.exemptions.moderator_count()
        );
        Ok(settings)
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(raw: Option<String>, default: bool) -> bool {
    match raw.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        _ => default,
    }
}
