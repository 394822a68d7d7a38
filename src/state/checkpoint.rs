use crate::state::cursor::ReplicationCursor;
use crate::utils::{Result, TapError};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const BOOKMARKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("bookmarks");

/// Persisted progress of one entity between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub entity: String,
    pub cursor: Option<ReplicationCursor>,
    pub status: SyncStatus,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Running => write!(f, "running"),
            SyncStatus::Completed => write!(f, "completed"),
            SyncStatus::Failed => write!(f, "failed"),
            SyncStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Bookmark store backed by a single redb file.
pub struct CheckpointManager {
    db: Arc<Database>,
}

impl CheckpointManager {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(db_path)
            .map_err(|e| TapError::DatabaseError(e.to_string()))?;

        let write_txn = db
            .begin_write()
            .map_err(|e| TapError::DatabaseError(e.to_string()))?;
        {
            let _ = write_txn
                .open_table(BOOKMARKS_TABLE)
                .map_err(|e| TapError::DatabaseError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| TapError::DatabaseError(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    pub fn save_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        let data = serde_json::to_vec(bookmark)
            .map_err(|e| TapError::SerializationError(e.to_string()))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| TapError::DatabaseError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(BOOKMARKS_TABLE)
                .map_err(|e| TapError::DatabaseError(e.to_string()))?;
            table
                .insert(bookmark.entity.as_str(), data.as_slice())
                .map_err(|e| TapError::DatabaseError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| TapError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    pub fn load_bookmark(&self, entity: &str) -> Result<Option<Bookmark>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| TapError::DatabaseError(e.to_string()))?;

        let table = read_txn
            .open_table(BOOKMARKS_TABLE)
            .map_err(|e| TapError::DatabaseError(e.to_string()))?;

        match table.get(entity) {
            Ok(Some(data)) => {
                let bookmark: Bookmark = serde_json::from_slice(data.value())
                    .map_err(|e| TapError::SerializationError(e.to_string()))?;
                Ok(Some(bookmark))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(TapError::DatabaseError(e.to_string())),
        }
    }

    /// Stored cursor for an entity, if any.
    pub fn load_cursor(&self, entity: &str) -> Result<Option<ReplicationCursor>> {
        Ok(self.load_bookmark(entity)?.and_then(|b| b.cursor))
    }

    /// Overwrites the entity's bookmark with a fresh timestamp.
    pub fn record_progress(
        &self,
        entity: &str,
        cursor: Option<&ReplicationCursor>,
        status: SyncStatus,
    ) -> Result<Bookmark> {
        let bookmark = Bookmark {
            entity: entity.to_string(),
            cursor: cursor.cloned(),
            status,
            updated_at: now_secs(),
        };
        self.save_bookmark(&bookmark)?;
        Ok(bookmark)
    }
}
