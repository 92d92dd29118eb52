use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            nickname    TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS sessions (
            token       TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            expires_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS followers (
            follower_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            following_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status          TEXT NOT NULL CHECK (status IN ('pending', 'accepted', 'declined')),
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (follower_id, following_id)
        );

        CREATE INDEX IF NOT EXISTS idx_followers_following
            ON followers(following_id, status);

        CREATE TABLE IF NOT EXISTS groups (
            id          TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            creator_id  TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS group_members (
            group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status      TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            receiver_id     TEXT NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL,
            sent_at         TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, sent_at);

        CREATE TABLE IF NOT EXISTS group_chat (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id        TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL,
            sent_at         TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_group_chat_group
            ON group_chat(group_id, sent_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            type            TEXT NOT NULL,
            content         TEXT NOT NULL DEFAULT '{}',
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_unread
            ON notifications(recipient_id, is_read);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
