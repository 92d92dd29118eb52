use anyhow::Result;
use rusqlite::OptionalExtension;
use serde_json::Value;

use parlor_types::models::{DirectMessage, FollowStatus, GroupMessage};

use crate::Database;
use crate::models::{GroupMessageRow, MessageRow};

/// Persistence operations the realtime gateway depends on.
///
/// Calls are blocking; async callers run them on `spawn_blocking`.
pub trait Store: Send + Sync {
    /// Persist a direct message and return it with the id and `sent_at`
    /// assigned by the database.
    fn insert_direct_message(&self, from: &str, to: &str, text: &str) -> Result<DirectMessage>;

    fn insert_group_message(&self, sender: &str, group_id: &str, text: &str)
    -> Result<GroupMessage>;

    fn is_accepted_group_member(&self, user_id: &str, group_id: &str) -> Result<bool>;

    /// Accepted members only.
    fn group_member_ids(&self, group_id: &str) -> Result<Vec<String>>;

    fn follow_status(&self, follower: &str, following: &str) -> Result<Option<FollowStatus>>;

    fn insert_notification(&self, recipient: &str, kind: &str, content: &Value) -> Result<i64>;

    fn unread_count(&self, recipient: &str) -> Result<i64>;

    /// Follow requests addressed to `user_id` that are still pending.
    fn pending_follow_request_count(&self, user_id: &str) -> Result<i64>;
}

impl Store for Database {
    fn insert_direct_message(&self, from: &str, to: &str, text: &str) -> Result<DirectMessage> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, content) VALUES (?1, ?2, ?3)",
                (from, to, text),
            )?;
            let id = conn.last_insert_rowid();

            // Read back the row so sent_at is what SQLite stored
            let row = conn.query_row(
                "SELECT id, sender_id, receiver_id, content, sent_at FROM messages WHERE id = ?1",
                [id],
                |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        content: row.get(3)?,
                        sent_at: row.get(4)?,
                    })
                },
            )?;
            Ok(row.into_model())
        })
    }

    fn insert_group_message(
        &self,
        sender: &str,
        group_id: &str,
        text: &str,
    ) -> Result<GroupMessage> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO group_chat (group_id, sender_id, content) VALUES (?1, ?2, ?3)",
                (group_id, sender, text),
            )?;
            let id = conn.last_insert_rowid();

            let row = conn.query_row(
                "SELECT id, group_id, sender_id, content, sent_at FROM group_chat WHERE id = ?1",
                [id],
                |row| {
                    Ok(GroupMessageRow {
                        id: row.get(0)?,
                        group_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        content: row.get(3)?,
                        sent_at: row.get(4)?,
                    })
                },
            )?;
            Ok(row.into_model())
        })
    }

    fn is_accepted_group_member(&self, user_id: &str, group_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS (
                    SELECT 1 FROM group_members
                    WHERE group_id = ?1 AND user_id = ?2 AND status = 'accepted'
                 )",
                (group_id, user_id),
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    fn group_member_ids(&self, group_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM group_members WHERE group_id = ?1 AND status = 'accepted'",
            )?;
            let ids = stmt
                .query_map([group_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    fn follow_status(&self, follower: &str, following: &str) -> Result<Option<FollowStatus>> {
        self.with_conn(|conn| {
            let status: Option<String> = conn
                .query_row(
                    "SELECT status FROM followers WHERE follower_id = ?1 AND following_id = ?2",
                    (follower, following),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(status.as_deref().and_then(FollowStatus::parse))
        })
    }

    fn insert_notification(&self, recipient: &str, kind: &str, content: &Value) -> Result<i64> {
        let blob = serde_json::to_string(content)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (recipient_id, type, content) VALUES (?1, ?2, ?3)",
                (recipient, kind, &blob),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn unread_count(&self, recipient: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
                [recipient],
                |row| row.get(0),
            )?)
        })
    }

    fn pending_follow_request_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM followers WHERE following_id = ?1 AND status = 'pending'",
                [user_id],
                |row| row.get(0),
            )?)
        })
    }
}
