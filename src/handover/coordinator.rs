//! HOTO coordinator: the duty handover handshake
//!
//! A handover is started by a current duty holder naming the incoming holders.
//! Each incoming holder acknowledges with their duty info; the last
//! acknowledgement commits one roster batch and closes the session.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::roster::RosterService;
use super::session::{
    is_mention, normalize_username, AckResult, HotoSession, SessionSlot, SessionStore,
};
use crate::error::Result;
use crate::models::{ChatId, UserId};
use crate::store::Store;
use crate::telegram::escape_html;

pub const START_USAGE: &str =
    "To hand over duty to the incoming SDOs, send <code>/hoto @incoming_sdo_1 @incoming_sdo_2 ...</code>.";

pub const ACK_USAGE: &str =
    "To take over duty, send <code>/ack [your duty info, e.g. duty phone number]</code>.";

/// Outcome of a handover event, with the reply to post in the chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoverOutcome {
    Started { incoming: Vec<String> },
    /// Empty or malformed incoming list
    Usage,
    AlreadyInProgress,
    NotEligible,
    Acknowledged { remaining: Vec<String> },
    Completed { batch_timestamp: DateTime<Utc>, holders: usize },
    AlreadyAcknowledged,
    NotExpected,
    MissingInfo,
    NoSession,
    Cancelled,
}

impl HandoverOutcome {
    pub fn reply(&self) -> String {
        match self {
            HandoverOutcome::Started { incoming } => format!(
                "HOTO started. Incoming SDOs:\n{}\n\n{}",
                mentions(incoming).join("\n"),
                ACK_USAGE
            ),
            HandoverOutcome::Usage => START_USAGE.to_string(),
            HandoverOutcome::AlreadyInProgress => {
                "A HOTO is already in progress. Send /cancelhoto to cancel it first.".to_string()
            }
            HandoverOutcome::NotEligible => {
                "Only current SDOs can start a HOTO. Send /sdo to see who is on duty.".to_string()
            }
            HandoverOutcome::Acknowledged { remaining } => format!(
                "Acknowledged. {} incoming SDO(s) remaining:\n{}",
                remaining.len(),
                mentions(remaining).join("\n")
            ),
            HandoverOutcome::Completed { .. } => "HOTO complete.".to_string(),
            HandoverOutcome::AlreadyAcknowledged => "You have already acknowledged.".to_string(),
            HandoverOutcome::NotExpected => {
                "You are not one of the incoming SDOs for this HOTO.".to_string()
            }
            HandoverOutcome::MissingInfo => ACK_USAGE.to_string(),
            HandoverOutcome::NoSession => format!("No HOTO is in progress. {}", START_USAGE),
            HandoverOutcome::Cancelled => "HOTO cancelled.".to_string(),
        }
    }
}

fn mentions(usernames: &[String]) -> Vec<String> {
    usernames
        .iter()
        .map(|name| format!("@{}", escape_html(name)))
        .collect()
}

pub struct HandoverCoordinator {
    store: Store,
    roster: Arc<RosterService>,
    sessions: SessionStore,
}

impl HandoverCoordinator {
    pub fn new(store: Store, roster: Arc<RosterService>) -> Self {
        Self {
            store,
            roster,
            sessions: SessionStore::new(),
        }
    }

    /// Session currently open in a chat
    pub async fn session(&self, chat_id: ChatId) -> Option<HotoSession> {
        self.sessions.get(chat_id).await
    }

    pub async fn start(
        &self,
        chat_id: ChatId,
        initiator: UserId,
        incoming: &[&str],
    ) -> Result<HandoverOutcome> {
        if incoming.is_empty() || !incoming.iter().all(|arg| is_mention(arg)) {
            tracing::debug!(chat_id, initiator, "Malformed HOTO start");
            return Ok(HandoverOutcome::Usage);
        }

        let slot = self.sessions.slot(chat_id).await;
        let outcome = self.start_in(&slot, chat_id, initiator, incoming).await;
        drop(slot);
        if !matches!(outcome, Ok(HandoverOutcome::Started { .. })) {
            self.sessions.release(chat_id).await;
        }
        outcome
    }

    async fn start_in(
        &self,
        slot: &SessionSlot,
        chat_id: ChatId,
        initiator: UserId,
        incoming: &[&str],
    ) -> Result<HandoverOutcome> {
        let mut session = slot.lock().await;
        if session.is_some() {
            return Ok(HandoverOutcome::AlreadyInProgress);
        }
        if !self.roster.may_hand_over(initiator).await? {
            tracing::warn!(chat_id, initiator, "HOTO start by non-SDO");
            return Ok(HandoverOutcome::NotEligible);
        }

        let mut names: Vec<String> = Vec::with_capacity(incoming.len());
        for arg in incoming {
            let name = normalize_username(arg);
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let new_session = HotoSession::new(initiator, names.clone());
        tracing::info!(
            chat_id,
            initiator,
            session_id = %new_session.id,
            incoming = ?names,
            "HOTO started"
        );
        *session = Some(new_session);

        Ok(HandoverOutcome::Started { incoming: names })
    }

    pub async fn acknowledge(
        &self,
        chat_id: ChatId,
        holder_id: UserId,
        username: Option<&str>,
        info: Option<&str>,
    ) -> Result<HandoverOutcome> {
        let Some(slot) = self.sessions.existing(chat_id).await else {
            return Ok(HandoverOutcome::NoSession);
        };
        let outcome = self
            .acknowledge_in(&slot, chat_id, holder_id, username, info)
            .await;
        drop(slot);
        if matches!(outcome, Ok(HandoverOutcome::Completed { .. })) {
            self.sessions.release(chat_id).await;
        }
        outcome
    }

    async fn acknowledge_in(
        &self,
        slot: &SessionSlot,
        chat_id: ChatId,
        holder_id: UserId,
        username: Option<&str>,
        info: Option<&str>,
    ) -> Result<HandoverOutcome> {
        let mut guard = slot.lock().await;
        let Some(current) = guard.as_ref() else {
            return Ok(HandoverOutcome::NoSession);
        };

        // Work on a copy so a failed commit leaves the session as it was
        let mut updated = current.clone();
        match updated.acknowledge(holder_id, username, info) {
            AckResult::Recorded { remaining } => {
                tracing::info!(chat_id, holder_id, remaining = remaining.len(), "HOTO acknowledged");
                *guard = Some(updated);
                Ok(HandoverOutcome::Acknowledged { remaining })
            }
            AckResult::Complete => {
                let rows = updated.batch();
                let batch_timestamp = self.store.append_handover_batch(&rows).await?;
                tracing::info!(
                    chat_id,
                    session_id = %updated.id,
                    holders = rows.len(),
                    %batch_timestamp,
                    "HOTO complete"
                );
                *guard = None;
                Ok(HandoverOutcome::Completed {
                    batch_timestamp,
                    holders: rows.len(),
                })
            }
            AckResult::AlreadyAcknowledged => Ok(HandoverOutcome::AlreadyAcknowledged),
            AckResult::NotExpected => {
                tracing::warn!(chat_id, holder_id, ?username, "HOTO acknowledgement from non-incoming user");
                Ok(HandoverOutcome::NotExpected)
            }
            AckResult::MissingInfo => Ok(HandoverOutcome::MissingInfo),
        }
    }

    pub async fn cancel(&self, chat_id: ChatId, by: UserId) -> Result<HandoverOutcome> {
        let Some(slot) = self.sessions.existing(chat_id).await else {
            return Ok(HandoverOutcome::NoSession);
        };
        let cancelled = slot.lock().await.take();
        drop(slot);
        self.sessions.release(chat_id).await;

        match cancelled {
            Some(session) => {
                tracing::info!(chat_id, by, session_id = %session.id, "HOTO cancelled");
                Ok(HandoverOutcome::Cancelled)
            }
            None => Ok(HandoverOutcome::NoSession),
        }
    }

    /// Number of chats currently holding session state
    pub async fn tracked_chats(&self) -> usize {
        self.sessions.slot_count().await
    }
}
