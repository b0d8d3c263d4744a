//! In-memory gateway that records every call
//!
//! Used by tests to observe notification surfaces. Operations can be made to
//! fail to exercise the gateway-failure paths.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::NotificationGateway;
use crate::error::{AppError, Result};
use crate::models::{ChatId, Destination, MessageRef, UserId};
use crate::workflow::Keyboard;

/// Gateway operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Send,
    Edit,
    Delete,
    Resolve,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Sent {
        destination: Destination,
        message: MessageRef,
        text: String,
        actions: Option<Keyboard>,
    },
    Edited {
        message: MessageRef,
        actions: Option<Keyboard>,
    },
    Deleted {
        message: MessageRef,
    },
    Answered {
        callback_id: String,
    },
}

#[derive(Default)]
struct Inner {
    next_message_id: i64,
    calls: Vec<GatewayCall>,
    /// Live messages and their current buttons
    live: HashMap<MessageRef, Option<Keyboard>>,
    display_names: HashMap<UserId, String>,
    failing: HashSet<GatewayOp>,
    unreachable_chats: HashSet<ChatId>,
}

#[derive(Default)]
pub struct RecordingGateway {
    inner: Mutex<Inner>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_display_name(&self, user: UserId, name: impl Into<String>) {
        self.inner
            .lock()
            .await
            .display_names
            .insert(user, name.into());
    }

    /// Make every call of `op` fail until [`RecordingGateway::heal`]
    pub async fn fail(&self, op: GatewayOp) {
        self.inner.lock().await.failing.insert(op);
    }

    /// Make sends to one chat fail
    pub async fn make_unreachable(&self, chat_id: ChatId) {
        self.inner.lock().await.unreachable_chats.insert(chat_id);
    }

    pub async fn heal(&self) {
        let mut inner = self.inner.lock().await;
        inner.failing.clear();
        inner.unreachable_chats.clear();
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.inner.lock().await.calls.clear();
    }

    /// Texts sent to a destination, oldest first
    pub async fn texts_to(&self, destination: Destination) -> Vec<String> {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::Sent {
                    destination: d,
                    text,
                    ..
                } if *d == destination => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Current buttons on a live message; `None` if the message does not exist
    pub async fn actions_of(&self, message: MessageRef) -> Option<Option<Keyboard>> {
        self.inner.lock().await.live.get(&message).cloned()
    }

    pub async fn is_live(&self, message: MessageRef) -> bool {
        self.inner.lock().await.live.contains_key(&message)
    }

    fn check(inner: &Inner, op: GatewayOp) -> Result<()> {
        if inner.failing.contains(&op) {
            return Err(AppError::Gateway(format!("{:?} failed", op)));
        }
        Ok(())
    }

    async fn record_send(
        &self,
        destination: Destination,
        text: &str,
        actions: Option<&Keyboard>,
    ) -> Result<MessageRef> {
        let mut inner = self.inner.lock().await;
        Self::check(&inner, GatewayOp::Send)?;
        if inner.unreachable_chats.contains(&destination.chat_id()) {
            return Err(AppError::Gateway(format!(
                "chat {} unreachable",
                destination.chat_id()
            )));
        }

        inner.next_message_id += 1;
        let message = MessageRef::new(destination.chat_id(), inner.next_message_id);
        inner.live.insert(message, actions.cloned());
        inner.calls.push(GatewayCall::Sent {
            destination,
            message,
            text: text.to_string(),
            actions: actions.cloned(),
        });
        Ok(message)
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send_text(&self, destination: Destination, text: &str) -> Result<MessageRef> {
        self.record_send(destination, text, None).await
    }

    async fn send_text_with_actions(
        &self,
        destination: Destination,
        text: &str,
        actions: &Keyboard,
    ) -> Result<MessageRef> {
        self.record_send(destination, text, Some(actions)).await
    }

    async fn edit_actions(&self, message: MessageRef, actions: Option<&Keyboard>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::check(&inner, GatewayOp::Edit)?;
        match inner.live.get_mut(&message) {
            Some(current) => *current = actions.cloned(),
            None => return Err(AppError::Gateway("message to edit not found".into())),
        }
        inner.calls.push(GatewayCall::Edited {
            message,
            actions: actions.cloned(),
        });
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::check(&inner, GatewayOp::Delete)?;
        if inner.live.remove(&message).is_none() {
            return Err(AppError::Gateway("message to delete not found".into()));
        }
        inner.calls.push(GatewayCall::Deleted { message });
        Ok(())
    }

    async fn resolve_display_name(&self, user: UserId) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        Self::check(&inner, GatewayOp::Resolve)?;
        Ok(inner.display_names.get(&user).cloned())
    }

    async fn answer_action(&self, callback_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        Self::check(&inner, GatewayOp::Answer)?;
        inner.calls.push(GatewayCall::Answered {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_assigns_distinct_refs() {
        let gateway = RecordingGateway::new();
        let a = gateway.send_text(Destination::User(1), "a").await.unwrap();
        let b = gateway.send_text(Destination::Group(-5), "b").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(b.chat_id, -5);
        assert_eq!(gateway.texts_to(Destination::User(1)).await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_edit_tracks_current_actions() {
        let gateway = RecordingGateway::new();
        let msg = gateway
            .send_text_with_actions(Destination::Group(-1), "x", &Keyboard::decision(1))
            .await
            .unwrap();
        gateway.edit_actions(msg, None).await.unwrap();
        assert_eq!(gateway.actions_of(msg).await, Some(None));
    }

    #[tokio::test]
    async fn test_delete_missing_message_fails() {
        let gateway = RecordingGateway::new();
        let msg = gateway.send_text(Destination::User(1), "x").await.unwrap();
        gateway.delete_message(msg).await.unwrap();
        assert!(!gateway.is_live(msg).await);
        assert!(gateway.delete_message(msg).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let gateway = RecordingGateway::new();
        gateway.fail(GatewayOp::Send).await;
        assert!(gateway.send_text(Destination::User(1), "x").await.is_err());
        gateway.heal().await;
        assert!(gateway.send_text(Destination::User(1), "x").await.is_ok());

        gateway.make_unreachable(9).await;
        assert!(gateway.send_text(Destination::Group(9), "x").await.is_err());
        assert!(gateway.send_text(Destination::Group(8), "x").await.is_ok());
    }
}
