//! Request workflow engine
//!
//! Owns the request state machine. Every transition validates against the
//! persisted request, commits to the store, then brings the notification
//! surfaces (requester messages and broadcast buttons) in line with the new
//! status. Surface failures after a commit are logged and never undo it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::future::join_all;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::actions::{ActionKind, ActionToken, Keyboard};
use super::kind::RequestKind;
use crate::error::Result;
use crate::gateway::NotificationGateway;
use crate::models::{Destination, MessageRef, Request, RequestFields, RequestId, RequestStatus, UserId};
use crate::store::Store;
use crate::telegram::escape_html;

/// Result of applying an event to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The request moved to this status
    Applied(RequestStatus),
    /// No request with the given reference
    NotFound,
    /// The event is not valid from the request's current status
    WrongState(RequestStatus),
    /// Persisted state contradicts itself or the event
    Violation(String),
    /// The verdict could not be delivered, so nothing was committed
    Undelivered,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

pub struct RequestEngine {
    store: Store,
    gateway: Arc<dyn NotificationGateway>,
    /// One lock per request with a transition in flight
    locks: Mutex<HashMap<RequestId, Weak<Mutex<()>>>>,
}

impl RequestEngine {
    pub fn new(store: Store, gateway: Arc<dyn NotificationGateway>) -> Self {
        Self {
            store,
            gateway,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Serialize transitions on one request; other requests proceed independently
    async fn lock(&self, id: RequestId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(&id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(id, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    /// Persist a new request, send the requester a receipt and broadcast it to
    /// every registered group
    pub async fn submit_request(
        &self,
        kind: RequestKind,
        requester_id: UserId,
        fields: RequestFields,
    ) -> Result<Request> {
        let mut request = self.store.create_request(kind, requester_id, &fields).await?;
        let id = request.id;
        tracing::info!(request_id = id, kind = kind.as_str(), requester_id, "Request submitted");

        let mut receipt = format!("{} request submitted; reference no. is {}.\n", kind.label(), id);
        if let Some(note) = kind.profile().completion_note {
            receipt.push_str(note);
            receipt.push('\n');
        }
        receipt.push_str("If you wish to carry out more actions, send /help for a list of commands.");
        self.notify_requester(&request, &receipt).await;

        let requester = match self.gateway.resolve_display_name(requester_id).await {
            Ok(Some(name)) => name,
            Ok(None) => "an unknown user".to_string(),
            Err(e) => {
                tracing::warn!(requester_id, "Failed to resolve requester name: {}", e);
                "an unknown user".to_string()
            }
        };
        let text = format!(
            "New {} request from {}:\n{}\n<b>Reference no.: {}</b>\n\n\
             To send additional information to this requester via the bot, use:\n\
             <code>/pm {} [text to send]</code>.",
            kind.label(),
            escape_html(&requester),
            escape_html(&kind.summarize(&fields)),
            id,
            id
        );
        let actions = Keyboard::submitted(kind, id);

        for group in self.store.list_groups().await? {
            let destination = Destination::Group(group);
            let sent = match &actions {
                Some(actions) => {
                    self.gateway
                        .send_text_with_actions(destination, &text, actions)
                        .await
                }
                None => self.gateway.send_text(destination, &text).await,
            };
            let message = match sent {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(request_id = id, chat_id = group, "Failed to broadcast request: {}", e);
                    continue;
                }
            };
            match self.store.add_notification(id, message).await {
                Ok(notification) => request.notifications.push(notification),
                Err(e) => {
                    tracing::error!(
                        request_id = id,
                        chat_id = message.chat_id,
                        message_id = message.message_id,
                        "Failed to record broadcast; its buttons will not be updated: {}",
                        e
                    );
                }
            }
        }

        Ok(request)
    }

    /// Route a decoded button press
    pub async fn dispatch(&self, token: ActionToken, actor: &str) -> Result<Transition> {
        let id = token.request_id;
        match token.action {
            ActionKind::Acknowledge => self.acknowledge(id).await,
            ActionKind::ApproverNotified => self.approver_notified(id).await,
            ActionKind::Approve => self.approve(id, actor).await,
            ActionKind::Reject => self.reject(id, actor).await,
            ActionKind::UndoApprove => self.undo_approve(id).await,
            ActionKind::UndoReject => self.undo_reject(id).await,
        }
    }

    pub async fn acknowledge(&self, id: RequestId) -> Result<Transition> {
        let _guard = self.lock(id).await;
        let Some(request) = self.load(id, "acknowledge").await? else {
            return Ok(Transition::NotFound);
        };
        if !request.kind.requires_independent_approval()
            || request.status != RequestStatus::PendingAcknowledgement
        {
            return Ok(wrong_state(&request, "acknowledge"));
        }

        let next = RequestStatus::Acknowledged;
        if !self.store.set_status(id, request.status, next).await? {
            return Ok(wrong_state(&request, "acknowledge"));
        }
        tracing::info!(request_id = id, "Request acknowledged");

        self.notify_requester(
            &request,
            &format!(
                "Your {} (ref. {}) has been acknowledged by the SDO. \
                 You will be notified when the relevant approving party has been informed.",
                request.kind.label(),
                id
            ),
        )
        .await;
        self.replace_actions(&request, Some(&Keyboard::acknowledged(id)))
            .await;

        Ok(Transition::Applied(next))
    }

    pub async fn approver_notified(&self, id: RequestId) -> Result<Transition> {
        let _guard = self.lock(id).await;
        let Some(request) = self.load(id, "approver notified").await? else {
            return Ok(Transition::NotFound);
        };
        if request.status != RequestStatus::Acknowledged {
            return Ok(wrong_state(&request, "approver notified"));
        }

        let next = RequestStatus::ApproverNotified;
        if !self.store.set_status(id, request.status, next).await? {
            return Ok(wrong_state(&request, "approver notified"));
        }
        tracing::info!(request_id = id, "Approving party informed");

        self.notify_requester(
            &request,
            &format!(
                "The relevant approving party has been informed of your {} (ref. {}). \
                 You will be notified when it is approved or rejected.",
                request.kind.label(),
                id
            ),
        )
        .await;
        self.replace_actions(&request, Some(&Keyboard::decision(id)))
            .await;

        Ok(Transition::Applied(next))
    }

    pub async fn approve(&self, id: RequestId, actor: &str) -> Result<Transition> {
        let _guard = self.lock(id).await;
        let Some(request) = self.load(id, "approve").await? else {
            return Ok(Transition::NotFound);
        };
        if !can_approve(request.kind, request.status) {
            return Ok(wrong_state(&request, "approve"));
        }

        let text = format!(
            "Your {} (ref. {}) has been {}.",
            request.kind.label(),
            id,
            request.kind.approval_verb()
        );
        let outcome = self
            .deliver_verdict(&request, RequestStatus::Approved, &text)
            .await?;
        if outcome.is_applied() {
            tracing::info!(request_id = id, actor, "Request approved");
            self.replace_actions(
                &request,
                Some(&Keyboard::approved(request.kind, id, actor)),
            )
            .await;
        }
        Ok(outcome)
    }

    pub async fn reject(&self, id: RequestId, actor: &str) -> Result<Transition> {
        let _guard = self.lock(id).await;
        let Some(request) = self.load(id, "reject").await? else {
            return Ok(Transition::NotFound);
        };
        if !can_reject(request.kind, request.status) {
            return Ok(wrong_state(&request, "reject"));
        }

        let text = format!(
            "Your {} (ref. {}) has been rejected.",
            request.kind.label(),
            id
        );
        let outcome = self
            .deliver_verdict(&request, RequestStatus::Rejected, &text)
            .await?;
        if outcome.is_applied() {
            tracing::info!(request_id = id, actor, "Request rejected");
            self.replace_actions(&request, Some(&Keyboard::rejected(id, actor)))
                .await;
        }
        Ok(outcome)
    }

    pub async fn undo_approve(&self, id: RequestId) -> Result<Transition> {
        self.undo_verdict(id, RequestStatus::Approved, RequestStatus::ApprovalRevoked)
            .await
    }

    pub async fn undo_reject(&self, id: RequestId) -> Result<Transition> {
        self.undo_verdict(id, RequestStatus::Rejected, RequestStatus::RejectionRevoked)
            .await
    }

    /// Close an informational request
    pub async fn resolve(&self, id: RequestId, actor: &str) -> Result<Transition> {
        let _guard = self.lock(id).await;
        let Some(request) = self.load(id, "resolve").await? else {
            return Ok(Transition::NotFound);
        };
        if request.kind.requires_approval()
            || request.status != RequestStatus::PendingAcknowledgement
        {
            return Ok(wrong_state(&request, "resolve"));
        }

        let next = RequestStatus::Resolved;
        if !self.store.set_status(id, request.status, next).await? {
            return Ok(wrong_state(&request, "resolve"));
        }
        tracing::info!(request_id = id, actor, "Request resolved");

        self.notify_requester(
            &request,
            &format!(
                "Your {} (ref. {}) has been resolved.",
                request.kind.label(),
                id
            ),
        )
        .await;

        Ok(Transition::Applied(next))
    }

    /// Forward operator text to the requester of a request.
    /// Returns the requester, or `None` if the request does not exist.
    pub async fn message_requester(&self, id: RequestId, text: &str) -> Result<Option<UserId>> {
        let Some(request) = self.load(id, "message requester").await? else {
            return Ok(None);
        };
        self.gateway
            .send_text(Destination::User(request.requester_id), &escape_html(text))
            .await?;
        tracing::info!(request_id = id, requester_id = request.requester_id, "Message forwarded to requester");
        Ok(Some(request.requester_id))
    }

    async fn load(&self, id: RequestId, event: &str) -> Result<Option<Request>> {
        let request = self.store.find_request(id).await?;
        if request.is_none() {
            tracing::warn!(request_id = id, event, "Event for nonexistent request");
        }
        Ok(request)
    }

    /// Send the verdict to the requester, then commit status and verdict together.
    /// The message is withdrawn again if the commit does not happen.
    async fn deliver_verdict(
        &self,
        request: &Request,
        status: RequestStatus,
        text: &str,
    ) -> Result<Transition> {
        if let Some(existing) = &request.verdict_notification {
            tracing::error!(
                request_id = request.id,
                chat_id = existing.message.chat_id,
                message_id = existing.message.message_id,
                "Request already has a verdict notification"
            );
            return Ok(Transition::Violation(format!(
                "request {} already has a verdict notification",
                request.id
            )));
        }

        let message = match self
            .gateway
            .send_text(Destination::User(request.requester_id), text)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(request_id = request.id, "Failed to deliver verdict: {}", e);
                return Ok(Transition::Undelivered);
            }
        };

        match self
            .store
            .record_verdict(request.id, request.status, status, message)
            .await
        {
            Ok(true) => Ok(Transition::Applied(status)),
            Ok(false) => {
                self.withdraw(request.id, message).await;
                Ok(wrong_state(request, status.as_str()))
            }
            Err(e) => {
                self.withdraw(request.id, message).await;
                Err(e)
            }
        }
    }

    async fn undo_verdict(
        &self,
        id: RequestId,
        expected: RequestStatus,
        revoked: RequestStatus,
    ) -> Result<Transition> {
        let _guard = self.lock(id).await;
        let Some(request) = self.load(id, "undo").await? else {
            return Ok(Transition::NotFound);
        };
        if request.status != expected {
            tracing::error!(
                request_id = id,
                status = %request.status,
                "Tried to undo {} but the request is {}",
                expected,
                request.status
            );
            return Ok(Transition::Violation(format!(
                "request {} is {}, not {}",
                id, request.status, expected
            )));
        }
        if request.verdict_notification.is_none() {
            tracing::error!(request_id = id, "Tried to undo {} without a verdict notification", expected);
            return Ok(Transition::Violation(format!(
                "request {} has no verdict notification",
                id
            )));
        }

        let Some(verdict) = self.store.revoke_verdict(id, expected, revoked).await? else {
            tracing::error!(request_id = id, "Verdict changed while undoing {}", expected);
            return Ok(Transition::Violation(format!(
                "request {} verdict changed concurrently",
                id
            )));
        };
        tracing::info!(request_id = id, status = %revoked, "Verdict revoked");

        self.withdraw(id, verdict.message).await;
        self.replace_actions(&request, Some(&Keyboard::reopened(request.kind, id)))
            .await;

        Ok(Transition::Applied(revoked))
    }

    async fn notify_requester(&self, request: &Request, text: &str) {
        if let Err(e) = self
            .gateway
            .send_text(Destination::User(request.requester_id), text)
            .await
        {
            tracing::warn!(
                request_id = request.id,
                requester_id = request.requester_id,
                "Failed to notify requester: {}",
                e
            );
        }
    }

    async fn withdraw(&self, id: RequestId, message: MessageRef) {
        if let Err(e) = self.gateway.delete_message(message).await {
            tracing::warn!(
                request_id = id,
                chat_id = message.chat_id,
                message_id = message.message_id,
                "Failed to delete verdict message: {}",
                e
            );
        }
    }

    /// Bring the buttons on every broadcast copy in line with the current status
    async fn replace_actions(&self, request: &Request, actions: Option<&Keyboard>) {
        let edits = request.notifications.iter().map(|notification| async move {
            let message = notification.message;
            (message, self.gateway.edit_actions(message, actions).await)
        });
        for (message, result) in join_all(edits).await {
            if let Err(e) = result {
                tracing::warn!(
                    request_id = request.id,
                    chat_id = message.chat_id,
                    message_id = message.message_id,
                    "Failed to update buttons: {}",
                    e
                );
            }
        }
    }
}

fn wrong_state(request: &Request, event: &str) -> Transition {
    tracing::warn!(
        request_id = request.id,
        kind = request.kind.as_str(),
        status = %request.status,
        event,
        "Event not valid in current state"
    );
    Transition::WrongState(request.status)
}

/// A revoked verdict reopens the decision
fn can_approve(kind: RequestKind, status: RequestStatus) -> bool {
    if !kind.requires_approval() {
        return false;
    }
    if kind.requires_independent_approval() {
        status == RequestStatus::ApproverNotified || status.is_revoked()
    } else {
        status == RequestStatus::PendingAcknowledgement || status.is_revoked()
    }
}

/// Rejection is only offered where acknowledgement and verdict are separate steps
fn can_reject(kind: RequestKind, status: RequestStatus) -> bool {
    kind.requires_independent_approval()
        && (matches!(
            status,
            RequestStatus::Acknowledged | RequestStatus::ApproverNotified
        ) || status.is_revoked())
}
