//! HTTP handlers: the Telegram webhook and the JSON API

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use teloxide::types::{Chat, Message};

use crate::commands::{self, Command};
use crate::error::{AppError, Result};
use crate::handover::Roster;
use crate::membership;
use crate::models::{Destination, RequestFields, RequestId, UserId};
use crate::telegram::{self, escape_html, CallbackQuery, Update, UpdateKind};
use crate::workflow::{ActionToken, RequestKind, Transition};
use crate::AppState;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Webhook endpoint. Answers 200 for every authenticated delivery so the
/// transport does not redeliver; failures are logged instead.
pub async fn telegram_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(secret) = &state.webhook_secret {
        let supplied = headers
            .get(SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if supplied != Some(secret.as_str()) {
            tracing::warn!("Webhook call with missing or wrong secret");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!("Undecodable update: {}", e);
            return StatusCode::OK;
        }
    };

    if let Err(e) = handle_update(&state, update).await {
        tracing::error!("Failed to handle update: {}", e);
    }
    StatusCode::OK
}

pub async fn handle_update(state: &AppState, update: Update) -> Result<()> {
    match update.kind {
        UpdateKind::CallbackQuery(query) => handle_callback(state, query).await,
        UpdateKind::Message(message) => handle_message(state, message).await,
        UpdateKind::MyChatMember(member) => {
            membership::track(&state.store, &member).await.map(|_| ())
        }
        _ => {
            tracing::debug!(update_id = ?update.id, "Ignoring update");
            Ok(())
        }
    }
}

async fn handle_callback(state: &AppState, query: CallbackQuery) -> Result<()> {
    let data = query.data.as_deref().unwrap_or_default();
    let result = match ActionToken::decode(data) {
        Ok(token) => state
            .engine
            .dispatch(token, &telegram::mention(&query.from))
            .await
            .map(|outcome| {
                tracing::debug!(?token, ?outcome, "Callback handled");
            }),
        Err(e) => {
            tracing::warn!(data, "Unhandled callback: {}", e);
            Ok(())
        }
    };

    // Always answer, or the client keeps retrying
    let callback_id = query.id.to_string();
    if let Err(e) = state.gateway.answer_action(&callback_id).await {
        tracing::warn!(callback_id, "Failed to answer callback: {}", e);
    }
    result
}

fn reply_destination(chat: &Chat) -> Destination {
    let id = telegram::chat_id(chat);
    if telegram::is_group(chat) {
        Destination::Group(id)
    } else {
        Destination::User(id)
    }
}

async fn handle_message(state: &AppState, message: Message) -> Result<()> {
    let (Some(text), Some(from)) = (message.text(), message.from.as_ref()) else {
        return Ok(());
    };
    let Some(command) = commands::parse(text) else {
        return Ok(());
    };
    let chat = &message.chat;
    let chat_id = telegram::chat_id(chat);
    let from_id = telegram::user_id(from);

    let reply = if command.group_only() && !telegram::is_group(chat) {
        "This command can only be used in group chats.".to_string()
    } else {
        match command {
            Command::Start => format!(
                "{}\n\n{}",
                commands::WELCOME_MESSAGE,
                commands::HELP_MESSAGE
            ),
            Command::Help => commands::HELP_MESSAGE.to_string(),
            Command::Sdo => state.roster.current_holders().await?.render(),
            Command::Hoto(args) => {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                state
                    .coordinator
                    .start(chat_id, from_id, &args)
                    .await?
                    .reply()
            }
            Command::Ack(info) => state
                .coordinator
                .acknowledge(chat_id, from_id, from.username.as_deref(), info.as_deref())
                .await?
                .reply(),
            Command::CancelHoto => state.coordinator.cancel(chat_id, from_id).await?.reply(),
            Command::Pm(None) => commands::PM_USAGE.to_string(),
            Command::Pm(Some((id, text))) => message_requester(state, id, &text).await?,
            Command::Resolve(None) => commands::RESOLVE_USAGE.to_string(),
            Command::Resolve(Some(id)) => match state
                .engine
                .resolve(id, &telegram::mention(from))
                .await?
            {
                Transition::Applied(_) => format!("Reference no. {} resolved.", id),
                Transition::NotFound => format!("No request with reference no. {}.", id),
                _ => format!("Reference no. {} is not an open enquiry.", id),
            },
            Command::Unknown(name) => {
                tracing::debug!(chat_id, command = %name, "Ignoring command");
                return Ok(());
            }
        }
    };

    state
        .gateway
        .send_text(reply_destination(chat), &reply)
        .await?;
    Ok(())
}

async fn message_requester(state: &AppState, id: RequestId, text: &str) -> Result<String> {
    let requester = match state.engine.message_requester(id, text).await {
        Ok(Some(requester)) => requester,
        Ok(None) => return Ok(format!("No request with reference no. {}.", id)),
        Err(AppError::Gateway(e)) => {
            tracing::warn!(request_id = id, "Failed to message requester: {}", e);
            return Ok("The message could not be delivered to the requester.".to_string());
        }
        Err(e) => return Err(e),
    };

    let name = match state.gateway.resolve_display_name(requester).await {
        Ok(Some(name)) => name,
        Ok(None) => "requester".to_string(),
        Err(e) => {
            tracing::warn!(requester_id = requester, "Failed to resolve requester: {}", e);
            "requester".to_string()
        }
    };
    Ok(format!(
        "Message sent to <a href=\"tg://user?id={}\">{}</a>.",
        requester,
        escape_html(&name)
    ))
}

// JSON API

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub kind: String,
    pub requester_id: UserId,
    #[serde(default)]
    pub fields: RequestFields,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub reference: RequestId,
}

/// Entry point for the field-collection dialogs
pub async fn submit_request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let kind: RequestKind = body.kind.parse().map_err(AppError::BadRequest)?;
    let request = state
        .engine
        .submit_request(kind, body.requester_id, body.fields)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            reference: request.id,
        }),
    ))
}

pub async fn roster(State(state): State<Arc<AppState>>) -> Result<Json<Roster>> {
    Ok(Json(state.roster.current_holders().await?))
}

pub async fn health() -> &'static str {
    "ok"
}
