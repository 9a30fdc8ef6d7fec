use crate::api::models::Conversation;
use chrono::Utc;
use directories::ProjectDirs;
use log::debug;
use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no data directory available")]
    NoDataDir,
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cache entry is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn default_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "example", "MarketplaceChat")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

/// Last known conversation list, so a restart has something to show before the first poll.
pub struct ConversationCache {
    conn: Connection,
}

impl ConversationCache {
    pub fn open_default() -> Result<Self, StorageError> {
        let path = default_path().ok_or(StorageError::NoDataDir)?;
        Self::open(&path)
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                last_message_time INTEGER,
                updated_at INTEGER NOT NULL,
                raw_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn upsert(&mut self, conversations: &[Conversation]) -> Result<(), StorageError> {
        let now = Utc::now().timestamp_millis();
        let tx = self.conn.transaction()?;
        for c in conversations {
            let raw = serde_json::to_string(c)?;
            tx.execute(
                r#"
                INSERT INTO conversations (id, last_message_time, updated_at, raw_json)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    last_message_time=excluded.last_message_time,
                    updated_at=excluded.updated_at,
                    raw_json=excluded.raw_json
                "#,
                params![c.id, c.last_message_time.map(|t| t.timestamp_millis()), now, raw],
            )?;
        }
        tx.commit()?;
        debug!("cached {} conversations", conversations.len());
        Ok(())
    }

    pub fn list(&self, limit: Option<usize>) -> Result<Vec<Conversation>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT raw_json FROM conversations
             ORDER BY COALESCE(last_message_time, 0) DESC, updated_at DESC, id ASC
             LIMIT ?1",
        )?;
        let lim = limit.unwrap_or(500) as i64;
        let rows = stmt.query_map(params![lim], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(serde_json::from_str(&raw?)?);
        }
        Ok(out)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM conversations", [])?;
        Ok(())
    }
}
