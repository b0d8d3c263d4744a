//! Broadcast group tracking from the bot's own membership updates

use teloxide::types::ChatMemberUpdated;

use crate::error::Result;
use crate::store::Store;
use crate::telegram;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Joined,
    Left,
    Unchanged,
}

impl MembershipChange {
    pub fn of(update: &ChatMemberUpdated) -> Self {
        match telegram::bot_membership(update) {
            (false, true) => MembershipChange::Joined,
            (true, false) => MembershipChange::Left,
            _ => MembershipChange::Unchanged,
        }
    }
}

/// Register or unregister the chat as a broadcast group. Private chats are ignored.
pub async fn track(store: &Store, update: &ChatMemberUpdated) -> Result<MembershipChange> {
    if !telegram::is_group(&update.chat) {
        return Ok(MembershipChange::Unchanged);
    }

    let change = MembershipChange::of(update);
    let chat_id = telegram::chat_id(&update.chat);
    match change {
        MembershipChange::Joined => {
            store.register_group(chat_id).await?;
            tracing::info!(chat_id, "Bot joined group");
        }
        MembershipChange::Left => {
            store.unregister_group(chat_id).await?;
            tracing::info!(chat_id, "Bot removed from group");
        }
        MembershipChange::Unchanged => {}
    }
    Ok(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Store::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn update(chat_type: &str, old: &str, new: &str) -> ChatMemberUpdated {
        serde_json::from_value(serde_json::json!({
            "chat": {"id": -100, "type": chat_type, "title": "SDO", "first_name": "SDO"},
            "from": {"id": 1, "is_bot": false, "first_name": "Admin"},
            "date": 1700000000,
            "old_chat_member": {"status": old, "user": {"id": 99, "is_bot": true, "first_name": "bot"}},
            "new_chat_member": {"status": new, "user": {"id": 99, "is_bot": true, "first_name": "bot"}}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let store = setup_test_db().await;

        let joined = track(&store, &update("group", "left", "member")).await.unwrap();
        assert_eq!(joined, MembershipChange::Joined);
        assert_eq!(store.list_groups().await.unwrap(), vec![-100]);

        let left = track(&store, &update("group", "member", "left")).await.unwrap();
        assert_eq!(left, MembershipChange::Left);
        assert!(store.list_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_membership_is_not_an_edge() {
        let store = setup_test_db().await;
        let change = track(&store, &update("supergroup", "member", "member"))
            .await
            .unwrap();
        assert_eq!(change, MembershipChange::Unchanged);
        assert!(store.list_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_private_chat_ignored() {
        let store = setup_test_db().await;
        let change = track(&store, &update("private", "left", "member"))
            .await
            .unwrap();
        assert_eq!(change, MembershipChange::Unchanged);
        assert!(store.list_groups().await.unwrap().is_empty());
    }
}
