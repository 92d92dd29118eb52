use crate::Database;
use crate::models::{GroupMessageRow, MessageRow, NotificationRow, SessionRow};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension;

use parlor_types::models::{DirectMessage, FollowStatus, GroupMessage, Notification};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, nickname: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, nickname) VALUES (?1, ?2)",
                (id, nickname),
            )?;
            Ok(())
        })
    }

    // -- Sessions --

    pub fn create_session(&self, token: &str, user_id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let expires_at = expires_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
                (token, user_id, &expires_at),
            )?;
            Ok(())
        })
    }

    pub fn get_session(&self, token: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, expires_at FROM sessions WHERE token = ?1",
                    [token],
                    |row| {
                        Ok(SessionRow {
                            user_id: row.get(0)?,
                            expires_at: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_session(&self, token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
            Ok(())
        })
    }

    // -- Relationships --

    /// Insert or overwrite the follow edge follower -> following.
    pub fn set_follow_status(&self, follower: &str, following: &str, status: FollowStatus) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO followers (follower_id, following_id, status) VALUES (?1, ?2, ?3)
                 ON CONFLICT (follower_id, following_id) DO UPDATE SET status = excluded.status",
                (follower, following, status.as_str()),
            )?;
            Ok(())
        })
    }

    // -- Groups --

    pub fn create_group(&self, id: &str, title: &str, creator_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO groups (id, title, creator_id) VALUES (?1, ?2, ?3)",
                (id, title, creator_id),
            )?;
            Ok(())
        })
    }

    pub fn set_group_member(&self, group_id: &str, user_id: &str, status: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO group_members (group_id, user_id, status) VALUES (?1, ?2, ?3)
                 ON CONFLICT (group_id, user_id) DO UPDATE SET status = excluded.status",
                (group_id, user_id, status),
            )?;
            Ok(())
        })
    }

    // -- Messages --

    /// Both directions of the conversation between `me` and `peer`, oldest first.
    pub fn direct_message_history(&self, me: &str, peer: &str, limit: u32) -> Result<Vec<DirectMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, sent_at
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY sent_at ASC, id ASC
                 LIMIT ?3",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![me, peer, limit], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        content: row.get(3)?,
                        sent_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows.into_iter().map(MessageRow::into_model).collect())
        })
    }

    /// Messages posted to `group_id`, oldest first.
    pub fn group_message_history(&self, group_id: &str, limit: u32) -> Result<Vec<GroupMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, group_id, sender_id, content, sent_at
                 FROM group_chat
                 WHERE group_id = ?1
                 ORDER BY sent_at ASC, id ASC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![group_id, limit], |row| {
                    Ok(GroupMessageRow {
                        id: row.get(0)?,
                        group_id: row.get(1)?,
                        sender_id: row.get(2)?,
                        content: row.get(3)?,
                        sent_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows.into_iter().map(GroupMessageRow::into_model).collect())
        })
    }

    // -- Notifications --

    pub fn get_notifications(&self, recipient: &str, limit: u32) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recipient_id, type, content, is_read, created_at
                 FROM notifications
                 WHERE recipient_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![recipient, limit], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        recipient_id: row.get(1)?,
                        kind: row.get(2)?,
                        content: row.get(3)?,
                        is_read: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows.into_iter().map(NotificationRow::into_model).collect())
        })
    }

    /// Flip the read flag. Only touches the row if it belongs to `recipient`.
    /// Returns the number of rows changed.
    pub fn mark_notification_read(&self, id: i64, recipient: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2",
                rusqlite::params![id, recipient],
            )?)
        })
    }

    /// Mark every DM notification that points at `message_id` as read.
    pub fn mark_dm_notifications_read(&self, recipient: &str, message_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET is_read = 1
                 WHERE recipient_id = ?1 AND type = 'dm'
                   AND json_extract(content, '$.messageId') = ?2",
                (recipient, message_id),
            )?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use chrono::Duration;
    use serde_json::json;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        for id in ["alice", "bob", "carol"] {
            db.create_user(id, id).unwrap();
        }
        db
    }

    #[test]
    fn session_round_trip() {
        let db = seeded();
        let expires = Utc::now() + Duration::hours(1);
        db.create_session("tok", "alice", expires).unwrap();

        let row = db.get_session("tok").unwrap().unwrap();
        assert_eq!(row.user_id, "alice");
        assert!(!row.is_expired(Utc::now()));
        assert!(row.is_expired(Utc::now() + Duration::hours(2)));

        db.delete_session("tok").unwrap();
        assert!(db.get_session("tok").unwrap().is_none());
    }

    #[test]
    fn history_covers_both_directions_only() {
        let db = seeded();
        db.insert_direct_message("alice", "bob", "one").unwrap();
        db.insert_direct_message("bob", "alice", "two").unwrap();
        db.insert_direct_message("alice", "carol", "other").unwrap();

        let history = db.direct_message_history("alice", "bob", 200).unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn group_history_is_scoped_and_capped() {
        let db = seeded();
        db.create_group("g1", "Climbers", "alice").unwrap();
        db.create_group("g2", "Cyclists", "bob").unwrap();
        db.insert_group_message("alice", "g1", "first").unwrap();
        db.insert_group_message("bob", "g2", "elsewhere").unwrap();
        db.insert_group_message("carol", "g1", "second").unwrap();
        db.insert_group_message("alice", "g1", "third").unwrap();

        let history = db.group_message_history("g1", 200).unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(history[1].sender, "carol");

        assert_eq!(db.group_message_history("g1", 2).unwrap().len(), 2);
        assert!(db.group_message_history("missing", 200).unwrap().is_empty());
    }

    #[test]
    fn mark_read_only_affects_own_notifications() {
        let db = seeded();
        let id = db.insert_notification("bob", "dm", &json!({"messageId": "1"})).unwrap();

        assert_eq!(db.mark_notification_read(id, "alice").unwrap(), 0);
        assert_eq!(db.unread_count("bob").unwrap(), 1);

        assert_eq!(db.mark_notification_read(id, "bob").unwrap(), 1);
        assert_eq!(db.unread_count("bob").unwrap(), 0);
    }

    #[test]
    fn mark_read_by_message_id() {
        let db = seeded();
        db.insert_notification("bob", "dm", &json!({"messageId": "7"})).unwrap();
        db.insert_notification("bob", "dm", &json!({"messageId": "8"})).unwrap();
        db.insert_notification("bob", "group_invite", &json!({"messageId": "7"})).unwrap();

        assert_eq!(db.mark_dm_notifications_read("bob", "7").unwrap(), 1);
        assert_eq!(db.unread_count("bob").unwrap(), 2);
    }

    #[test]
    fn notifications_newest_first_with_content() {
        let db = seeded();
        db.insert_notification("bob", "dm", &json!({"text": "first"})).unwrap();
        db.insert_notification("bob", "dm", &json!({"text": "second"})).unwrap();

        let list = db.get_notifications("bob", 100).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].content["text"], "second");
        assert!(!list[0].is_read);
    }
}
