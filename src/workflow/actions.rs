//! Action buttons and the tokens they carry
//!
//! A token is `<action>:<len>:<request id>`, where `len` is the byte length of the
//! decimal request id. Action codes come from a closed set without `:`, and decoding
//! rejects any payload whose length disagrees with the prefix.

use serde::{Deserialize, Serialize};

use super::kind::RequestKind;
use crate::models::RequestId;

/// Upper bound on encoded token size imposed by the transport
pub const MAX_TOKEN_LEN: usize = 64;

/// What pressing a button asks the engine to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Acknowledge,
    ApproverNotified,
    Approve,
    Reject,
    UndoApprove,
    UndoReject,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Acknowledge => "ack",
            ActionKind::ApproverNotified => "notified",
            ActionKind::Approve => "approve",
            ActionKind::Reject => "reject",
            ActionKind::UndoApprove => "undo_approve",
            ActionKind::UndoReject => "undo_reject",
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ack" => Ok(ActionKind::Acknowledge),
            "notified" => Ok(ActionKind::ApproverNotified),
            "approve" => Ok(ActionKind::Approve),
            "reject" => Ok(ActionKind::Reject),
            "undo_approve" => Ok(ActionKind::UndoApprove),
            "undo_reject" => Ok(ActionKind::UndoReject),
            _ => Err(TokenError::UnknownAction(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed: {0:?}")]
    Malformed(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("payload length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("token exceeds 64 bytes")]
    TooLong,
}

/// Decoded button payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionToken {
    pub action: ActionKind,
    pub request_id: RequestId,
}

impl ActionToken {
    pub fn new(action: ActionKind, request_id: RequestId) -> Self {
        Self { action, request_id }
    }

    pub fn encode(&self) -> String {
        let payload = self.request_id.to_string();
        format!("{}:{}:{}", self.action.as_str(), payload.len(), payload)
    }

    pub fn decode(token: &str) -> Result<Self, TokenError> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(TokenError::TooLong);
        }

        let (action, rest) = token
            .split_once(':')
            .ok_or_else(|| TokenError::Malformed(token.to_string()))?;
        let (len, payload) = rest
            .split_once(':')
            .ok_or_else(|| TokenError::Malformed(token.to_string()))?;

        let action: ActionKind = action.parse()?;
        let expected: usize = len
            .parse()
            .map_err(|_| TokenError::Malformed(token.to_string()))?;
        if payload.len() != expected {
            return Err(TokenError::LengthMismatch {
                expected,
                actual: payload.len(),
            });
        }
        let request_id = payload
            .parse()
            .map_err(|_| TokenError::Malformed(token.to_string()))?;

        Ok(Self { action, request_id })
    }
}

/// A single inline button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub token: ActionToken,
}

impl Button {
    pub fn new(text: impl Into<String>, action: ActionKind, request_id: RequestId) -> Self {
        Self {
            text: text.into(),
            token: ActionToken::new(action, request_id),
        }
    }
}

/// Rows of inline buttons attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn single(button: Button) -> Self {
        Self {
            rows: vec![vec![button]],
        }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    /// Buttons shown on a fresh broadcast; informational kinds get none
    pub fn submitted(kind: RequestKind, request_id: RequestId) -> Option<Self> {
        if !kind.requires_approval() {
            return None;
        }
        let action = if kind.requires_independent_approval() {
            ActionKind::Acknowledge
        } else {
            ActionKind::Approve
        };
        Some(Self::single(Button::new("Acknowledge", action, request_id)))
    }

    /// After acknowledgement of an independently approved request
    pub fn acknowledged(request_id: RequestId) -> Self {
        Self {
            rows: vec![
                vec![Button::new(
                    "Approving party informed",
                    ActionKind::ApproverNotified,
                    request_id,
                )],
                vec![Button::new(
                    "Reject without notifying approver",
                    ActionKind::Reject,
                    request_id,
                )],
            ],
        }
    }

    /// Approve / Reject pair awaiting a decision
    pub fn decision(request_id: RequestId) -> Self {
        Self {
            rows: vec![vec![
                Button::new("Approve", ActionKind::Approve, request_id),
                Button::new("Reject", ActionKind::Reject, request_id),
            ]],
        }
    }

    pub fn approved(kind: RequestKind, request_id: RequestId, actor: &str) -> Self {
        let verb = kind.approval_verb();
        let mut label = verb.to_string();
        if let Some(first) = label.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        Self::single(Button::new(
            format!("{} by {}. Click to undo.", label, actor),
            ActionKind::UndoApprove,
            request_id,
        ))
    }

    pub fn rejected(request_id: RequestId, actor: &str) -> Self {
        Self::single(Button::new(
            format!("Rejected by {}. Click to undo.", actor),
            ActionKind::UndoReject,
            request_id,
        ))
    }

    /// Pre-verdict buttons restored after an undo
    pub fn reopened(kind: RequestKind, request_id: RequestId) -> Self {
        if kind.requires_independent_approval() {
            Self::decision(request_id)
        } else {
            Self::single(Button::new("Acknowledge", ActionKind::Approve, request_id))
        }
    }
}
