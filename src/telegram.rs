//! Telegram Bot API glue
//!
//! Updates, users, chats and keyboards are `teloxide::types`. This module adds the
//! request bodies the gateway posts and a few accessors mapping teloxide ids onto
//! the crate's plain ids.

use serde::{Deserialize, Serialize};
use teloxide::types::{
    Chat, ChatMember, ChatMemberUpdated, InlineKeyboardButton, InlineKeyboardMarkup, Message,
    ParseMode, User,
};

use crate::models::{ChatId, MessageRef, UserId};
use crate::workflow::Keyboard;

pub use teloxide::types::{CallbackQuery, Update, UpdateKind};

/// "@username" when available, otherwise the first name
pub fn mention(user: &User) -> String {
    match &user.username {
        Some(username) => format!("@{}", username),
        None => user.first_name.clone(),
    }
}

pub fn user_id(user: &User) -> UserId {
    user.id.0 as UserId
}

pub fn chat_id(chat: &Chat) -> ChatId {
    chat.id.0
}

/// Groups and supergroups; private chats and channels are not broadcast targets
pub fn is_group(chat: &Chat) -> bool {
    chat.is_group() || chat.is_supergroup()
}

/// Whether this membership lets the bot post to the chat
pub fn is_present(member: &ChatMember) -> bool {
    member.kind.is_present()
}

pub fn bot_membership(update: &ChatMemberUpdated) -> (bool, bool) {
    (
        is_present(&update.old_chat_member),
        is_present(&update.new_chat_member),
    )
}

pub fn message_ref(message: &Message) -> MessageRef {
    MessageRef::new(chat_id(&message.chat), i64::from(message.id.0))
}

pub fn markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.text.clone(), button.token.encode()))
            .collect::<Vec<_>>()
    }))
}

// Request bodies

#[derive(Debug, Serialize)]
pub struct SendMessageParams {
    pub chat_id: ChatId,
    pub text: String,
    pub parse_mode: ParseMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
pub struct EditReplyMarkupParams {
    pub chat_id: ChatId,
    pub message_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
pub struct MessageParams {
    pub chat_id: ChatId,
    pub message_id: i64,
}

#[derive(Debug, Serialize)]
pub struct GetChatParams {
    pub chat_id: ChatId,
}

#[derive(Debug, Serialize)]
pub struct AnswerCallbackParams {
    pub callback_query_id: String,
}

/// The part of `getChat` used for display names
#[derive(Debug, Deserialize)]
pub struct ChatNames {
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// Envelope around every Bot API response
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// Escape text for HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}
