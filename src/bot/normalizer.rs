// src/bot/normalizer.rs - Telegram update payloads to canonical events

use log::debug;
use serde::Deserialize;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::types::{Event, EventKind, MalformedEventError, MemberStatus, MembershipTransition};

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    chat: TelegramChat,
    #[serde(default)]
    message_thread_id: Option<i64>,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    document: Option<TelegramFile>,
    #[serde(default)]
    photo: Option<Vec<TelegramFile>>,
    #[serde(default)]
    new_chat_participant: Option<TelegramUser>,
    #[serde(default)]
    new_chat_members: Option<Vec<TelegramUser>>,
}

#[derive(Debug, Deserialize)]
struct TelegramChatMember {
    status: String,
    user: TelegramUser,
    #[serde(default)]
    is_member: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TelegramChatMemberUpdated {
    chat: TelegramChat,
    old_chat_member: TelegramChatMember,
    new_chat_member: TelegramChatMember,
}

/// NFKC canonicalization followed by whitespace trimming
pub fn normalize_text(raw: &str) -> String {
    raw.nfkc().collect::<String>().trim().to_string()
}

/// Turn a raw webhook body into an event.
///
/// `Ok(None)` means the update is valid but carries nothing the engine
/// looks at (e.g. a poll or a callback query).
pub fn normalize(payload: &[u8]) -> Result<Option<Event>, MalformedEventError> {
    let value: Value = serde_json::from_slice(payload).map_err(MalformedEventError::InvalidJson)?;
    let Value::Object(mut update) = value else {
        return Err(MalformedEventError::NotAnObject);
    };

    if let Some(section) = update.remove("message") {
        let message: TelegramMessage =
            serde_json::from_value(section).map_err(MalformedEventError::InvalidShape)?;
        return Ok(Some(from_message(message, false)));
    }

    if let Some(section) = update.remove("edited_message") {
        let message: TelegramMessage =
            serde_json::from_value(section).map_err(MalformedEventError::InvalidShape)?;
        return Ok(Some(from_message(message, true)));
    }

    if let Some(section) = update.remove("chat_member") {
        let change: TelegramChatMemberUpdated =
            serde_json::from_value(section).map_err(MalformedEventError::InvalidShape)?;
        return Ok(Some(from_member_update(change)));
    }

    debug!("Update carries no message or membership section");
    Ok(None)
}

fn from_message(message: TelegramMessage, edited: bool) -> Event {
    let raw_text = message.text.or(message.caption).unwrap_or_default();
    let normalized_text = normalize_text(&raw_text);

    let joined = message
        .new_chat_participant
        .or_else(|| message.new_chat_members.and_then(|members| members.into_iter().next()));

    let (kind, membership) = if joined.is_some() {
        (EventKind::MembershipChange, Some(MembershipTransition::legacy_join()))
    } else if edited {
        (EventKind::EditedMessage, None)
    } else if normalized_text.starts_with('/') {
        (EventKind::Command, None)
    } else {
        (EventKind::Message, None)
    };

    // Joins describe the member who arrived, not whoever added them
    let sender = joined.or(message.from);

    let photo_id = message
        .photo
        .as_ref()
        .and_then(|sizes| sizes.last())
        .map(|p| p.file_id.clone());
    let document_id = message.document.as_ref().map(|d| d.file_id.clone());

    Event {
        kind,
        chat_id: message.chat.id.to_string(),
        thread_id: message.message_thread_id.map(|id| id.to_string()),
        message_id: message.message_id.to_string(),
        sender_id: sender.as_ref().map(|u| u.id.to_string()).unwrap_or_default(),
        sender_handle: sender.as_ref().and_then(|u| u.username.clone()),
        sender_display_name: sender.and_then(|u| u.first_name),
        raw_text,
        normalized_text,
        has_document: message.document.is_some(),
        has_photo: photo_id.is_some(),
        attachment_file_id: document_id.or(photo_id),
        membership,
    }
}

fn from_member_update(change: TelegramChatMemberUpdated) -> Event {
    let old = &change.old_chat_member;
    let new = change.new_chat_member;
    let transition = MembershipTransition {
        from: MemberStatus::from_platform(&old.status, old.is_member),
        to: MemberStatus::from_platform(&new.status, new.is_member),
    };

    Event {
        kind: EventKind::MembershipChange,
        chat_id: change.chat.id.to_string(),
        thread_id: None,
        message_id: String::new(),
        sender_id: new.user.id.to_string(),
        sender_handle: new.user.username,
        sender_display_name: new.user.first_name,
        raw_text: String::new(),
        normalized_text: String::new(),
        has_document: false,
        has_photo: false,
        attachment_file_id: None,
        membership: Some(transition),
    }
}
