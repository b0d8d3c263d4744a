//! Per-chat handover session state

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::{ChatId, UserId};

/// An incoming holder who has taken over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub holder_id: UserId,
    pub username: String,
    pub info: String,
}

/// Result of recording one acknowledgement on a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckResult {
    /// Recorded; usernames still to acknowledge, sorted
    Recorded { remaining: Vec<String> },
    /// Recorded and nobody is left
    Complete,
    AlreadyAcknowledged,
    NotExpected,
    MissingInfo,
}

/// A handover in progress in one chat
#[derive(Debug, Clone)]
pub struct HotoSession {
    pub id: Uuid,
    pub initiator: UserId,
    pub started_at: DateTime<Utc>,
    /// Incoming usernames as announced
    pub incoming: Vec<String>,
    pub acknowledged: Vec<Acknowledgement>,
    /// Normalized usernames yet to acknowledge
    pub not_acknowledged: BTreeSet<String>,
}

impl HotoSession {
    /// `incoming` must already be normalized and deduplicated
    pub fn new(initiator: UserId, incoming: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            initiator,
            started_at: Utc::now(),
            not_acknowledged: incoming.iter().cloned().collect(),
            incoming,
            acknowledged: Vec::new(),
        }
    }

    pub fn remaining(&self) -> Vec<String> {
        self.not_acknowledged.iter().cloned().collect()
    }

    pub fn is_complete(&self) -> bool {
        self.not_acknowledged.is_empty()
    }

    /// Record an acknowledgement. Unexpected usernames leave the session untouched.
    pub fn acknowledge(
        &mut self,
        holder_id: UserId,
        username: Option<&str>,
        info: Option<&str>,
    ) -> AckResult {
        // Acknowledgements are keyed by identity; a renamed holder cannot take a second slot
        if self.acknowledged.iter().any(|ack| ack.holder_id == holder_id) {
            return AckResult::AlreadyAcknowledged;
        }

        let username = username.map(normalize_username);
        let expected = username
            .as_ref()
            .is_some_and(|name| self.not_acknowledged.contains(name));

        if !expected {
            let already = self
                .acknowledged
                .iter()
                .any(|ack| Some(&ack.username) == username.as_ref());
            return if already {
                AckResult::AlreadyAcknowledged
            } else {
                AckResult::NotExpected
            };
        }

        let info = match info.map(str::trim) {
            Some(info) if !info.is_empty() => info.to_string(),
            _ => return AckResult::MissingInfo,
        };

        let Some(username) = username else {
            return AckResult::NotExpected;
        };
        self.not_acknowledged.remove(&username);
        self.acknowledged.push(Acknowledgement {
            holder_id,
            username,
            info,
        });

        if self.is_complete() {
            AckResult::Complete
        } else {
            AckResult::Recorded {
                remaining: self.remaining(),
            }
        }
    }

    /// Roster rows for the completed handover, in acknowledgement order
    pub fn batch(&self) -> Vec<(UserId, String)> {
        self.acknowledged
            .iter()
            .map(|ack| (ack.holder_id, ack.info.clone()))
            .collect()
    }
}

/// Lowercase and without the leading '@'
pub fn normalize_username(name: &str) -> String {
    name.trim_start_matches('@').to_ascii_lowercase()
}

/// Whether `arg` has the "@name" shape
pub fn is_mention(arg: &str) -> bool {
    match arg.strip_prefix('@') {
        Some(name) => {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

pub type SessionSlot = Arc<Mutex<Option<HotoSession>>>;

/// Keyed store of handover sessions. Each chat has its own slot, so
/// operations in different chats never contend.
#[derive(Default)]
pub struct SessionStore {
    slots: RwLock<HashMap<ChatId, SessionSlot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn slot(&self, chat_id: ChatId) -> SessionSlot {
        if let Some(slot) = self.slots.read().await.get(&chat_id) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(chat_id)
            .or_default()
            .clone()
    }

    /// Slot of a chat that has one, without creating it
    pub async fn existing(&self, chat_id: ChatId) -> Option<SessionSlot> {
        self.slots.read().await.get(&chat_id).cloned()
    }

    /// Drop the chat's slot when it holds no session and no caller holds the slot.
    /// Callers must drop their own handle first.
    pub async fn release(&self, chat_id: ChatId) {
        let mut slots = self.slots.write().await;
        let idle = slots.get(&chat_id).is_some_and(|slot| {
            Arc::strong_count(slot) == 1
                && slot.try_lock().is_ok_and(|session| session.is_none())
        });
        if idle {
            slots.remove(&chat_id);
        }
    }

    /// Number of chats with a slot
    pub async fn slot_count(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Snapshot of the session in a chat, if any
    pub async fn get(&self, chat_id: ChatId) -> Option<HotoSession> {
        let slot = self.existing(chat_id).await?;
        let session = slot.lock().await;
        session.clone()
    }
}
