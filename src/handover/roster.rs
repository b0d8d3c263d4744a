//! Roster query service: who currently holds duty

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::gateway::NotificationGateway;
use crate::models::UserId;
use crate::store::Store;
use crate::telegram::escape_html;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DutyHolder {
    pub holder_id: UserId,
    pub name: String,
    pub info: String,
}

/// The most recent handover batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Roster {
    /// `None` when no handover has ever completed
    pub batch_timestamp: Option<DateTime<Utc>>,
    pub holders: Vec<DutyHolder>,
}

impl Roster {
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// Reply text for the `/sdo` command
    pub fn render(&self) -> String {
        if self.holders.is_empty() {
            return "No SDOs on record.".to_string();
        }
        let mut text = String::from("Current SDOs:");
        for holder in &self.holders {
            text.push_str(&format!(
                "\n{}: {}",
                escape_html(&holder.name),
                escape_html(&holder.info)
            ));
        }
        text
    }
}

pub struct RosterService {
    store: Store,
    gateway: Arc<dyn NotificationGateway>,
}

impl RosterService {
    pub fn new(store: Store, gateway: Arc<dyn NotificationGateway>) -> Self {
        Self { store, gateway }
    }

    /// Holders of the latest batch with display names. Holders whose names no
    /// longer resolve are left out.
    pub async fn current_holders(&self) -> Result<Roster> {
        let batch = self.store.latest_batch().await?;
        let batch_timestamp = batch.first().map(|entry| entry.batch_timestamp);

        let mut holders = Vec::with_capacity(batch.len());
        for entry in batch {
            match self.gateway.resolve_display_name(entry.holder_id).await {
                Ok(Some(name)) => holders.push(DutyHolder {
                    holder_id: entry.holder_id,
                    name,
                    info: entry.holder_info,
                }),
                Ok(None) => {
                    tracing::debug!(holder_id = entry.holder_id, "Duty holder no longer resolves");
                }
                Err(e) => {
                    tracing::warn!(
                        holder_id = entry.holder_id,
                        "Failed to resolve duty holder: {}",
                        e
                    );
                }
            }
        }

        Ok(Roster {
            batch_timestamp,
            holders,
        })
    }

    /// Whether `user` may start a handover. Anyone may while the log is empty.
    pub async fn may_hand_over(&self, user: UserId) -> Result<bool> {
        let batch = self.store.latest_batch().await?;
        Ok(batch.is_empty() || batch.iter().any(|entry| entry.holder_id == user))
    }
}
