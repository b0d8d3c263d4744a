//! Telegram Bot API bridge - HTTP client implementing the notification gateway

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use teloxide::types::{InlineKeyboardMarkup, Message, ParseMode};

use super::NotificationGateway;
use crate::error::{AppError, Result};
use crate::models::{Destination, MessageRef, UserId};
use crate::telegram::{
    self, AnswerCallbackParams, ApiResponse, ChatNames, EditReplyMarkupParams, GetChatParams,
    MessageParams, SendMessageParams,
};
use crate::workflow::Keyboard;

/// Re-sending identical markup is reported as an error by the API
const NOT_MODIFIED: &str = "message is not modified";

pub struct TelegramGateway {
    client: Client,
    base_url: String,
    token: String,
}

impl TelegramGateway {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        tracing::debug!(method, "Calling Bot API");

        // Strip the URL from transport errors: it embeds the bot token
        let response = self
            .client
            .post(self.method_url(method))
            .json(params)
            .send()
            .await
            .map_err(|e| AppError::Gateway(e.without_url().to_string()))?;

        let status = response.status();
        let body: ApiResponse<R> = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("{}: {}", method, e.without_url())))?;

        if !body.ok {
            return Err(AppError::Gateway(format!(
                "{} failed: {} - {}",
                method,
                status,
                body.description.unwrap_or_default()
            )));
        }

        body.result
            .ok_or_else(|| AppError::Gateway(format!("{} returned no result", method)))
    }

    async fn send(
        &self,
        destination: Destination,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageRef> {
        let params = SendMessageParams {
            chat_id: destination.chat_id(),
            text: text.to_string(),
            parse_mode: ParseMode::Html,
            reply_markup,
        };
        let message: Message = self.call("sendMessage", &params).await?;
        Ok(telegram::message_ref(&message))
    }
}

#[async_trait]
impl NotificationGateway for TelegramGateway {
    async fn send_text(&self, destination: Destination, text: &str) -> Result<MessageRef> {
        self.send(destination, text, None).await
    }

    async fn send_text_with_actions(
        &self,
        destination: Destination,
        text: &str,
        actions: &Keyboard,
    ) -> Result<MessageRef> {
        self.send(destination, text, Some(telegram::markup(actions)))
            .await
    }

    async fn edit_actions(&self, message: MessageRef, actions: Option<&Keyboard>) -> Result<()> {
        let params = EditReplyMarkupParams {
            chat_id: message.chat_id,
            message_id: message.message_id,
            reply_markup: actions.map(telegram::markup),
        };
        match self
            .call::<_, serde_json::Value>("editMessageReplyMarkup", &params)
            .await
        {
            Ok(_) => Ok(()),
            Err(AppError::Gateway(e)) if e.contains(NOT_MODIFIED) => {
                tracing::debug!(
                    chat_id = message.chat_id,
                    message_id = message.message_id,
                    "Buttons already up to date"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_message(&self, message: MessageRef) -> Result<()> {
        let params = MessageParams {
            chat_id: message.chat_id,
            message_id: message.message_id,
        };
        let _: bool = self.call("deleteMessage", &params).await?;
        Ok(())
    }

    async fn resolve_display_name(&self, user: UserId) -> Result<Option<String>> {
        let chat: ChatNames = self.call("getChat", &GetChatParams { chat_id: user }).await?;
        Ok(chat
            .username
            .map(|username| format!("@{}", username))
            .or(chat.first_name))
    }

    async fn answer_action(&self, callback_id: &str) -> Result<()> {
        let params = AnswerCallbackParams {
            callback_query_id: callback_id.to_string(),
        };
        let _: bool = self.call("answerCallbackQuery", &params).await?;
        Ok(())
    }
}
