//! Audit store for requests, broadcast groups and the duty roster log

use chrono::{DateTime, Duration, SubsecRound, Utc};
use sqlx::SqlitePool;

use crate::error::{AppError, Result};
use crate::models::{
    ChatId, MessageRef, Request, RequestFields, RequestId, RequestNotification, RequestStatus,
    RequestVerdictNotification, SdoLogEntry, UserId,
};
use crate::workflow::RequestKind;

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // Request operations

    pub async fn create_request(
        &self,
        kind: RequestKind,
        requester_id: UserId,
        fields: &RequestFields,
    ) -> Result<Request> {
        let now = Utc::now();
        let status = RequestStatus::PendingAcknowledgement;
        let fields_json = serde_json::to_string(fields)
            .map_err(|e| AppError::Internal(format!("Invalid fields: {}", e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO requests (requester_id, kind, fields, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(requester_id)
        .bind(kind.as_str())
        .bind(&fields_json)
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Request {
            id: result.last_insert_rowid(),
            requester_id,
            kind,
            fields: fields.clone(),
            status,
            notifications: Vec::new(),
            verdict_notification: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Load a request with its notifications, or `None` if it does not exist
    pub async fn find_request(&self, id: RequestId) -> Result<Option<Request>> {
        let row = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, requester_id, kind, fields, status, created_at, updated_at
            FROM requests
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut request: Request = row.try_into()?;

        request.notifications = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT chat_id, message_id, request_id
            FROM request_notifications
            WHERE request_id = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| RequestNotification {
            message: MessageRef::new(r.chat_id, r.message_id),
            request_id: r.request_id,
        })
        .collect();

        request.verdict_notification = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT chat_id, message_id, request_id
            FROM request_verdict_notifications
            WHERE request_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(|r| RequestVerdictNotification {
            message: MessageRef::new(r.chat_id, r.message_id),
            request_id: r.request_id,
        });

        Ok(Some(request))
    }

    pub async fn get_request(&self, id: RequestId) -> Result<Request> {
        self.find_request(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Request {} not found", id)))
    }

    pub async fn add_notification(
        &self,
        request_id: RequestId,
        message: MessageRef,
    ) -> Result<RequestNotification> {
        sqlx::query(
            r#"
            INSERT INTO request_notifications (chat_id, message_id, request_id)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(message.chat_id)
        .bind(message.message_id)
        .bind(request_id)
        .execute(&self.pool)
        .await?;

        Ok(RequestNotification {
            message,
            request_id,
        })
    }

    /// Move a request from `expected` to `status`.
    /// Returns false if the request was no longer in `expected`.
    pub async fn set_status(
        &self,
        id: RequestId,
        expected: RequestStatus,
        status: RequestStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE requests SET status = ?, updated_at = ? WHERE id = ? AND status = ?
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Commit a verdict: status change and verdict message in one transaction.
    /// Returns false, writing nothing, if the request was no longer in `expected`.
    pub async fn record_verdict(
        &self,
        id: RequestId,
        expected: RequestStatus,
        status: RequestStatus,
        message: MessageRef,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE requests SET status = ?, updated_at = ? WHERE id = ? AND status = ?
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        // request_id is UNIQUE: a second verdict fails the whole transaction
        sqlx::query(
            r#"
            INSERT INTO request_verdict_notifications (chat_id, message_id, request_id)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(message.chat_id)
        .bind(message.message_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Revoke a verdict: status change and verdict removal in one transaction.
    /// Returns the removed verdict, or `None` (writing nothing) if the request was
    /// no longer in `expected` or had no verdict.
    pub async fn revoke_verdict(
        &self,
        id: RequestId,
        expected: RequestStatus,
        status: RequestStatus,
    ) -> Result<Option<RequestVerdictNotification>> {
        let mut tx = self.pool.begin().await?;

        let verdict = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT chat_id, message_id, request_id
            FROM request_verdict_notifications
            WHERE request_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(verdict) = verdict else {
            tx.rollback().await?;
            return Ok(None);
        };

        let result = sqlx::query(
            r#"
            UPDATE requests SET status = ?, updated_at = ? WHERE id = ? AND status = ?
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            r#"
            DELETE FROM request_verdict_notifications WHERE request_id = ?
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(RequestVerdictNotification {
            message: MessageRef::new(verdict.chat_id, verdict.message_id),
            request_id: verdict.request_id,
        }))
    }

    // Chat group operations

    /// Returns true if the group was newly registered
    pub async fn register_group(&self, chat_id: ChatId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO chat_groups (id) VALUES (?)
            "#,
        )
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Returns true if the group was registered
    pub async fn unregister_group(&self, chat_id: ChatId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM chat_groups WHERE id = ?
            "#,
        )
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_groups(&self) -> Result<Vec<ChatId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM chat_groups ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    // Duty roster operations

    /// Append one handover batch atomically. Every row gets the same timestamp,
    /// strictly later than any existing batch.
    pub async fn append_handover_batch(
        &self,
        holders: &[(UserId, String)],
    ) -> Result<DateTime<Utc>> {
        if holders.is_empty() {
            return Err(AppError::BadRequest("Handover batch is empty".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let latest = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            SELECT batch_timestamp FROM sdo_log ORDER BY batch_timestamp DESC LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let mut batch_timestamp = Utc::now().trunc_subsecs(3);
        if let Some(latest) = latest {
            if batch_timestamp <= latest {
                batch_timestamp = latest + Duration::milliseconds(1);
            }
        }

        for (holder_id, holder_info) in holders {
            sqlx::query(
                r#"
                INSERT INTO sdo_log (batch_timestamp, holder_id, holder_info)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(batch_timestamp)
            .bind(holder_id)
            .bind(holder_info)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(batch_timestamp)
    }

    /// Rows of the most recent batch; empty when the log is empty
    pub async fn latest_batch(&self) -> Result<Vec<SdoLogEntry>> {
        let rows = sqlx::query_as::<_, SdoLogRow>(
            r#"
            SELECT batch_timestamp, holder_id, holder_info
            FROM sdo_log
            WHERE batch_timestamp = (SELECT MAX(batch_timestamp) FROM sdo_log)
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SdoLogEntry::from).collect())
    }

    /// Every roster row, oldest batch first
    pub async fn roster_history(&self) -> Result<Vec<SdoLogEntry>> {
        let rows = sqlx::query_as::<_, SdoLogRow>(
            r#"
            SELECT batch_timestamp, holder_id, holder_info
            FROM sdo_log
            ORDER BY batch_timestamp ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SdoLogEntry::from).collect())
    }
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: i64,
    requester_id: i64,
    kind: String,
    fields: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for Request {
    type Error = AppError;

    fn try_from(row: RequestRow) -> Result<Self> {
        Ok(Request {
            id: row.id,
            requester_id: row.requester_id,
            kind: row
                .kind
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid request kind: {}", e)))?,
            fields: serde_json::from_str(&row.fields)
                .map_err(|e| AppError::Internal(format!("Invalid request fields: {}", e)))?,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))?,
            notifications: Vec::new(),
            verdict_notification: None,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    chat_id: i64,
    message_id: i64,
    request_id: i64,
}

#[derive(sqlx::FromRow)]
struct SdoLogRow {
    batch_timestamp: DateTime<Utc>,
    holder_id: i64,
    holder_info: String,
}

impl From<SdoLogRow> for SdoLogEntry {
    fn from(row: SdoLogRow) -> Self {
        SdoLogEntry {
            batch_timestamp: row.batch_timestamp,
            holder_id: row.holder_id,
            holder_info: row.holder_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        let store = Store::new(pool);
        store.migrate().await.expect("Failed to run migrations");
        store
    }

    fn bcp_fields() -> RequestFields {
        RequestFields::new()
            .with("rank_name", FieldValue::Text("PTE Jay Chou".into()))
            .with("purpose", FieldValue::Text("Exercise".into()))
    }

    #[tokio::test]
    async fn test_create_request_assigns_increasing_ids() {
        let store = setup_test_db().await;
        let first = store
            .create_request(RequestKind::BcpClearance, 1, &bcp_fields())
            .await
            .unwrap();
        let second = store
            .create_request(RequestKind::Mc, 1, &RequestFields::new())
            .await
            .unwrap();

        assert!(second.id > first.id);
        assert_eq!(first.status, RequestStatus::PendingAcknowledgement);
    }

    #[tokio::test]
    async fn test_find_request_roundtrip() {
        let store = setup_test_db().await;
        let created = store
            .create_request(RequestKind::BcpClearance, 42, &bcp_fields())
            .await
            .unwrap();

        let fetched = store.find_request(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.requester_id, 42);
        assert_eq!(fetched.kind, RequestKind::BcpClearance);
        assert_eq!(fetched.fields, bcp_fields());
        assert!(fetched.notifications.is_empty());
        assert!(fetched.verdict_notification.is_none());
    }

    #[tokio::test]
    async fn test_get_request_not_found() {
        let store = setup_test_db().await;
        assert!(store.find_request(999).await.unwrap().is_none());
        let result = store.get_request(999).await;
        assert!(matches!(result.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_notifications_are_loaded_in_order() {
        let store = setup_test_db().await;
        let request = store
            .create_request(RequestKind::Mc, 1, &RequestFields::new())
            .await
            .unwrap();

        store
            .add_notification(request.id, MessageRef::new(-200, 5))
            .await
            .unwrap();
        store
            .add_notification(request.id, MessageRef::new(-100, 9))
            .await
            .unwrap();

        let fetched = store.get_request(request.id).await.unwrap();
        let messages: Vec<_> = fetched.notifications.iter().map(|n| n.message).collect();
        assert_eq!(
            messages,
            vec![MessageRef::new(-200, 5), MessageRef::new(-100, 9)]
        );
    }

    #[tokio::test]
    async fn test_set_status_compare_and_set() {
        let store = setup_test_db().await;
        let request = store
            .create_request(RequestKind::BcpClearance, 1, &bcp_fields())
            .await
            .unwrap();

        let moved = store
            .set_status(
                request.id,
                RequestStatus::PendingAcknowledgement,
                RequestStatus::Acknowledged,
            )
            .await
            .unwrap();
        assert!(moved);

        // A stale expectation does not apply
        let moved_again = store
            .set_status(
                request.id,
                RequestStatus::PendingAcknowledgement,
                RequestStatus::Acknowledged,
            )
            .await
            .unwrap();
        assert!(!moved_again);

        let fetched = store.get_request(request.id).await.unwrap();
        assert_eq!(fetched.status, RequestStatus::Acknowledged);
    }

    #[tokio::test]
    async fn test_record_and_revoke_verdict() {
        let store = setup_test_db().await;
        let request = store
            .create_request(RequestKind::Mc, 7, &RequestFields::new())
            .await
            .unwrap();
        let verdict = MessageRef::new(7, 100);

        assert!(store
            .record_verdict(
                request.id,
                RequestStatus::PendingAcknowledgement,
                RequestStatus::Approved,
                verdict,
            )
            .await
            .unwrap());

        let fetched = store.get_request(request.id).await.unwrap();
        assert_eq!(fetched.status, RequestStatus::Approved);
        assert_eq!(fetched.verdict_notification.unwrap().message, verdict);
        assert!(fetched.verdict_consistent());

        let removed = store
            .revoke_verdict(
                request.id,
                RequestStatus::Approved,
                RequestStatus::ApprovalRevoked,
            )
            .await
            .unwrap();
        assert_eq!(removed.unwrap().message, verdict);

        let fetched = store.get_request(request.id).await.unwrap();
        assert_eq!(fetched.status, RequestStatus::ApprovalRevoked);
        assert!(fetched.verdict_notification.is_none());
        assert!(fetched.verdict_consistent());
    }

    #[tokio::test]
    async fn test_record_verdict_wrong_state_writes_nothing() {
        let store = setup_test_db().await;
        let request = store
            .create_request(RequestKind::BcpClearance, 7, &bcp_fields())
            .await
            .unwrap();

        let applied = store
            .record_verdict(
                request.id,
                RequestStatus::ApproverNotified,
                RequestStatus::Approved,
                MessageRef::new(7, 1),
            )
            .await
            .unwrap();
        assert!(!applied);

        let fetched = store.get_request(request.id).await.unwrap();
        assert_eq!(fetched.status, RequestStatus::PendingAcknowledgement);
        assert!(fetched.verdict_notification.is_none());
    }

    #[tokio::test]
    async fn test_second_verdict_is_rejected_atomically() {
        let store = setup_test_db().await;
        let request = store
            .create_request(RequestKind::Mc, 7, &RequestFields::new())
            .await
            .unwrap();
        store
            .record_verdict(
                request.id,
                RequestStatus::PendingAcknowledgement,
                RequestStatus::Approved,
                MessageRef::new(7, 1),
            )
            .await
            .unwrap();

        let result = store
            .record_verdict(
                request.id,
                RequestStatus::Approved,
                RequestStatus::Rejected,
                MessageRef::new(7, 2),
            )
            .await;
        assert!(matches!(result.unwrap_err(), AppError::Database(_)));

        let fetched = store.get_request(request.id).await.unwrap();
        assert_eq!(fetched.status, RequestStatus::Approved);
        assert_eq!(
            fetched.verdict_notification.unwrap().message,
            MessageRef::new(7, 1)
        );
    }

    #[tokio::test]
    async fn test_revoke_without_verdict_is_noop() {
        let store = setup_test_db().await;
        let request = store
            .create_request(RequestKind::Mc, 7, &RequestFields::new())
            .await
            .unwrap();

        let removed = store
            .revoke_verdict(
                request.id,
                RequestStatus::PendingAcknowledgement,
                RequestStatus::ApprovalRevoked,
            )
            .await
            .unwrap();
        assert!(removed.is_none());
        let fetched = store.get_request(request.id).await.unwrap();
        assert_eq!(fetched.status, RequestStatus::PendingAcknowledgement);
    }

    #[tokio::test]
    async fn test_group_registration() {
        let store = setup_test_db().await;
        assert!(store.register_group(-100).await.unwrap());
        assert!(!store.register_group(-100).await.unwrap());
        assert!(store.register_group(-200).await.unwrap());
        assert_eq!(store.list_groups().await.unwrap(), vec![-200, -100]);

        assert!(store.unregister_group(-100).await.unwrap());
        assert!(!store.unregister_group(-100).await.unwrap());
        assert_eq!(store.list_groups().await.unwrap(), vec![-200]);
    }

    #[tokio::test]
    async fn test_latest_batch_empty_log() {
        let store = setup_test_db().await;
        assert!(store.latest_batch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_rows_share_timestamp() {
        let store = setup_test_db().await;
        let ts = store
            .append_handover_batch(&[(1, "Phone 1".into()), (2, "Phone 2".into())])
            .await
            .unwrap();

        let batch = store.latest_batch().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|e| e.batch_timestamp == ts));
    }

    #[tokio::test]
    async fn test_latest_batch_only_returns_newest() {
        let store = setup_test_db().await;
        let first = store
            .append_handover_batch(&[(1, "a".into()), (2, "b".into())])
            .await
            .unwrap();
        let second = store
            .append_handover_batch(&[(3, "c".into())])
            .await
            .unwrap();
        assert!(second > first);

        let batch = store.latest_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].holder_id, 3);
        assert_eq!(batch[0].batch_timestamp, second);

        assert_eq!(store.roster_history().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let store = setup_test_db().await;
        let result = store.append_handover_batch(&[]).await;
        assert!(matches!(result.unwrap_err(), AppError::BadRequest(_)));
        assert!(store.roster_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_row_invalid_status() {
        let row = RequestRow {
            id: 1,
            requester_id: 1,
            kind: "mc".to_string(),
            fields: "[]".to_string(),
            status: "accepted".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let result: Result<Request> = row.try_into();
        assert!(matches!(result.unwrap_err(), AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_request_row_invalid_kind() {
        let row = RequestRow {
            id: 1,
            requester_id: 1,
            kind: "leave".to_string(),
            fields: "[]".to_string(),
            status: "approved".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let result: Result<Request> = row.try_into();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_request_row_invalid_fields() {
        let row = RequestRow {
            id: 1,
            requester_id: 1,
            kind: "mc".to_string(),
            fields: "{not json".to_string(),
            status: "approved".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let result: Result<Request> = row.try_into();
        assert!(result.is_err());
    }
}
