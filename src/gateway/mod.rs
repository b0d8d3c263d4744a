//! Notification gateway: the outbound side of the messaging transport
//!
//! Every text is sent in HTML parse mode; callers escape dynamic content with
//! [`crate::telegram::escape_html`].

pub mod recording;
pub mod telegram;

pub use recording::{GatewayCall, GatewayOp, RecordingGateway};
pub use telegram::TelegramGateway;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Destination, MessageRef, UserId};
use crate::workflow::Keyboard;

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Send a text message
    async fn send_text(&self, destination: Destination, text: &str) -> Result<MessageRef>;

    /// Send a text message with inline action buttons
    async fn send_text_with_actions(
        &self,
        destination: Destination,
        text: &str,
        actions: &Keyboard,
    ) -> Result<MessageRef>;

    /// Replace the buttons on a sent message; `None` removes them
    async fn edit_actions(&self, message: MessageRef, actions: Option<&Keyboard>) -> Result<()>;

    async fn delete_message(&self, message: MessageRef) -> Result<()>;

    /// Display name for a user, or `None` if the user no longer resolves
    async fn resolve_display_name(&self, user: UserId) -> Result<Option<String>>;

    /// Acknowledge a button press so the client stops its spinner and does not retry
    async fn answer_action(&self, callback_id: &str) -> Result<()>;
}
