//! SQLite-backed local store.
//!
//! Persists the signed-in session across launches and keeps a copy of the
//! last fetched feed so a cold start can show content immediately while the
//! real fetch runs (the `Loading { stale }` state).  Entities are stored as
//! their wire JSON, so the cache always round-trips exactly what the façade
//! returned.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};

use crate::model::{Post, Session};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StoreError::Serde(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Local store handle.  Not `Sync`; share behind a mutex when an actor needs
/// access (SQLite WAL keeps a second connection safe too, but one connection
/// per process is enough here).
pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS session (
                slot        INTEGER PRIMARY KEY CHECK (slot = 0),
                token       TEXT NOT NULL,
                user_json   TEXT NOT NULL,
                saved_at    INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS feed_cache (
                position    INTEGER PRIMARY KEY,
                post_id     TEXT NOT NULL,
                post_json   TEXT NOT NULL,
                cached_at   INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Persist the signed-in session, replacing any previous one.
    pub fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let user_json = serde_json::to_string(&session.user)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO session (slot, token, user_json, saved_at)
             VALUES (0, ?1, ?2, ?3)",
            params![session.token, user_json, now_secs()],
        )?;
        Ok(())
    }

    /// The persisted session, if any.
    pub fn load_session(&self) -> Result<Option<Session>, StoreError> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT token, user_json FROM session WHERE slot = 0",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((token, user_json)) => Ok(Some(Session {
                token,
                user: serde_json::from_str(&user_json)?,
            })),
            None => Ok(None),
        }
    }

    /// Drop the persisted session (logout).
    pub fn clear_session(&self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM session", [])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Feed cache
    // -----------------------------------------------------------------------

    /// Replace the cached feed wholesale, preserving order.
    pub fn cache_feed(&self, posts: &[Post]) -> Result<(), StoreError> {
        let now = now_secs();
        self.conn.execute("DELETE FROM feed_cache", [])?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO feed_cache (position, post_id, post_json, cached_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (position, post) in posts.iter().enumerate() {
            let post_json = serde_json::to_string(post)?;
            stmt.execute(params![position as i64, post.id, post_json, now])?;
        }
        Ok(())
    }

    /// The cached feed in its original order; empty when nothing is cached.
    pub fn load_cached_feed(&self) -> Result<Vec<Post>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT post_json FROM feed_cache ORDER BY position")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut posts = Vec::new();
        for json in rows {
            posts.push(serde_json::from_str(&json?)?);
        }
        Ok(posts)
    }

    /// Drop the cached feed.
    pub fn clear_feed_cache(&self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM feed_cache", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    fn test_store() -> LocalStore {
        LocalStore::open_in_memory().unwrap()
    }

    fn test_session() -> Session {
        Session {
            token: "session_abc".to_string(),
            user: User {
                id: "user_1".to_string(),
                username: "alice".to_string(),
                display_name: Some("Alice".to_string()),
                bio: None,
                avatar: None,
                created_at: Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
            },
        }
    }

    fn test_post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            author_id: "user_1".to_string(),
            content: format!("post {id}"),
            images: Vec::new(),
            liked_by: HashSet::new(),
            disliked_by: HashSet::new(),
            comment_ids: Vec::new(),
            has_bad_comments: false,
            community_id: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
            edited_at: None,
        }
    }

    #[test]
    fn test_session_roundtrip() {
        let store = test_store();
        assert!(store.load_session().unwrap().is_none());

        let session = test_session();
        store.save_session(&session).unwrap();
        let loaded = store.load_session().unwrap().unwrap();
        assert_eq!(loaded.token, session.token);
        assert_eq!(loaded.user, session.user);
    }

    #[test]
    fn test_save_session_replaces_previous() {
        let store = test_store();
        store.save_session(&test_session()).unwrap();

        let mut second = test_session();
        second.token = "session_def".to_string();
        store.save_session(&second).unwrap();

        let loaded = store.load_session().unwrap().unwrap();
        assert_eq!(loaded.token, "session_def");
    }

    #[test]
    fn test_clear_session() {
        let store = test_store();
        store.save_session(&test_session()).unwrap();
        store.clear_session().unwrap();
        assert!(store.load_session().unwrap().is_none());
    }

    #[test]
    fn test_feed_cache_roundtrip_preserves_order() {
        let store = test_store();
        assert!(store.load_cached_feed().unwrap().is_empty());

        let posts = vec![test_post("p3"), test_post("p2"), test_post("p1")];
        store.cache_feed(&posts).unwrap();
        let loaded = store.load_cached_feed().unwrap();
        let ids: Vec<&str> = loaded.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p2", "p1"]);
    }

    #[test]
    fn test_cache_feed_replaces_wholesale() {
        let store = test_store();
        store
            .cache_feed(&[test_post("p1"), test_post("p2")])
            .unwrap();
        store.cache_feed(&[test_post("p9")]).unwrap();
        let loaded = store.load_cached_feed().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "p9");
    }

    #[test]
    fn test_clear_feed_cache() {
        let store = test_store();
        store.cache_feed(&[test_post("p1")]).unwrap();
        store.clear_feed_cache().unwrap();
        assert!(store.load_cached_feed().unwrap().is_empty());
    }
}
