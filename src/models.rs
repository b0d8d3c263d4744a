//! Data models for requests, notifications and the duty roster

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram user identity
pub type UserId = i64;

/// Telegram chat identity (private chats share the user's id)
pub type ChatId = i64;

/// Reference number of a request
pub type RequestId = i64;

/// Where a message is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Destination {
    User(UserId),
    Group(ChatId),
}

impl Destination {
    pub fn chat_id(&self) -> ChatId {
        match self {
            Destination::User(id) => *id,
            Destination::Group(id) => *id,
        }
    }
}

/// Locates a message previously sent through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

impl MessageRef {
    pub fn new(chat_id: ChatId, message_id: i64) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// Status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingAcknowledgement,
    Acknowledged,
    ApproverNotified,
    Approved,
    Rejected,
    ApprovalRevoked,
    RejectionRevoked,
    /// Informational request closed by an operator
    Resolved,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::PendingAcknowledgement => "pending_acknowledgement",
            RequestStatus::Acknowledged => "acknowledged",
            RequestStatus::ApproverNotified => "approver_notified",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::ApprovalRevoked => "approval_revoked",
            RequestStatus::RejectionRevoked => "rejection_revoked",
            RequestStatus::Resolved => "resolved",
        }
    }

    /// Statuses that carry a delivered verdict message
    pub fn has_verdict(&self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }

    /// A revoked verdict reopens the request for a fresh decision
    pub fn is_revoked(&self) -> bool {
        matches!(
            self,
            RequestStatus::ApprovalRevoked | RequestStatus::RejectionRevoked
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_acknowledgement" => Ok(RequestStatus::PendingAcknowledgement),
            "acknowledged" => Ok(RequestStatus::Acknowledged),
            "approver_notified" => Ok(RequestStatus::ApproverNotified),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "approval_revoked" => Ok(RequestStatus::ApprovalRevoked),
            "rejection_revoked" => Ok(RequestStatus::RejectionRevoked),
            "resolved" => Ok(RequestStatus::Resolved),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

/// Value captured for a single request field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Timestamp(DateTime<Utc>),
    List(Vec<String>),
}

impl FieldValue {
    /// Human-readable rendering used in broadcast summaries
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::Timestamp(ts) => ts.format("%d%m%y %H%MH").to_string(),
            FieldValue::List(items) => {
                let mut out = String::new();
                for item in items {
                    out.push('\n');
                    out.push_str(item);
                }
                out
            }
        }
    }
}

/// A named field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// Ordered field mapping produced by a collection dialog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFields(Vec<Field>);

impl RequestFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field, keeping first-insertion order
    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.0.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Field { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A request tracked through the approval lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub requester_id: UserId,
    pub kind: crate::workflow::RequestKind,
    pub fields: RequestFields,
    pub status: RequestStatus,
    pub notifications: Vec<RequestNotification>,
    pub verdict_notification: Option<RequestVerdictNotification>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Verdict message is present exactly while a verdict stands
    pub fn verdict_consistent(&self) -> bool {
        self.verdict_notification.is_some() == self.status.has_verdict()
    }
}

/// One group broadcast of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestNotification {
    pub message: MessageRef,
    pub request_id: RequestId,
}

/// The private verdict message sent to the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVerdictNotification {
    pub message: MessageRef,
    pub request_id: RequestId,
}

/// One row of the duty roster log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdoLogEntry {
    pub batch_timestamp: DateTime<Utc>,
    pub holder_id: UserId,
    pub holder_info: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_status_roundtrip() {
        for status in [
            RequestStatus::PendingAcknowledgement,
            RequestStatus::Acknowledged,
            RequestStatus::ApproverNotified,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::ApprovalRevoked,
            RequestStatus::RejectionRevoked,
            RequestStatus::Resolved,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_request_status_invalid() {
        assert!("accepted".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_has_verdict() {
        assert!(RequestStatus::Approved.has_verdict());
        assert!(RequestStatus::Rejected.has_verdict());
        assert!(!RequestStatus::ApprovalRevoked.has_verdict());
        assert!(!RequestStatus::PendingAcknowledgement.has_verdict());
    }

    #[test]
    fn test_field_value_render() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(FieldValue::Timestamp(ts).render(), "010125 1200H");
        assert_eq!(FieldValue::Text("Nil".into()).render(), "Nil");
        assert_eq!(
            FieldValue::List(vec!["PTE A".into(), "PTE B".into()]).render(),
            "\nPTE A\nPTE B"
        );
    }

    #[test]
    fn test_request_fields_keep_order_and_replace() {
        let fields = RequestFields::new()
            .with("rank_name", FieldValue::Text("PTE Jay".into()))
            .with("purpose", FieldValue::Text("Exercise".into()))
            .with("rank_name", FieldValue::Text("CPL Jay".into()));

        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["rank_name", "purpose"]);
        assert_eq!(
            fields.get("rank_name"),
            Some(&FieldValue::Text("CPL Jay".into()))
        );
    }

    #[test]
    fn test_request_fields_json_shape() {
        let fields = RequestFields::new().with("enquiry", FieldValue::Text("hi".into()));
        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(
            json,
            r#"[{"name":"enquiry","value":{"type":"text","value":"hi"}}]"#
        );
        let back: RequestFields = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fields);
    }

    #[test]
    fn test_destination_chat_id() {
        assert_eq!(Destination::User(5).chat_id(), 5);
        assert_eq!(Destination::Group(-100).chat_id(), -100);
    }
}
