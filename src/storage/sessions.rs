//! Session and user-aggregate persistence.
//!
//! Every mutation is a whole-file read-modify-write. Callers that may run
//! concurrently must serialize writes themselves.

use tracing::{info, warn};

use super::{EntityType, JsonlReader, JsonlWriter, StorageConfig, StorageError};
use crate::models::{Session, SessionId, UserStats};

/// JSONL-backed store of sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    config: StorageConfig,
}

impl SessionStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn reader(&self) -> JsonlReader<Session> {
        JsonlReader::for_entity(&self.config, EntityType::Session)
    }

    fn writer(&self) -> JsonlWriter<Session> {
        JsonlWriter::for_entity(&self.config, EntityType::Session)
    }

    /// All sessions, in storage order.
    pub fn list(&self) -> Result<Vec<Session>, StorageError> {
        self.reader().read_all()
    }

    /// Sessions owned by one user.
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, StorageError> {
        self.reader().read_where(|s| s.user_id == user_id)
    }

    /// Load one session.
    pub fn get(&self, id: &SessionId) -> Result<Session, StorageError> {
        let reader = self.reader();
        if !reader.exists() {
            return Err(StorageError::NotFound(format!("session {}", id)));
        }

        for session in reader.iter()? {
            match session {
                Ok(session) if &session.id == id => return Ok(session),
                Ok(_) => {}
                Err(StorageError::Json(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Err(StorageError::NotFound(format!("session {}", id)))
    }

    /// Store a new session.
    pub fn insert(&self, session: &Session) -> Result<(), StorageError> {
        if self.get(&session.id).is_ok() {
            return Err(StorageError::Duplicate(format!("session {}", session.id)));
        }
        self.writer().append(session)?;

        info!("Created session {} for {}", session.id, session.user_id);
        Ok(())
    }

    /// Replace a stored session with the given value.
    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        let mut lines = self.reader().read_lines()?;
        let (index, _) = locate(&lines, &session.id)
            .ok_or_else(|| StorageError::NotFound(format!("session {}", session.id)))?;
        lines[index] = serde_json::to_string(session)?;

        self.writer().write_lines(&lines)?;
        Ok(())
    }

    /// Remove a session, returning what was stored.
    pub fn delete(&self, id: &SessionId) -> Result<Session, StorageError> {
        let mut lines = self.reader().read_lines()?;
        let (index, removed) =
            locate(&lines, id).ok_or_else(|| StorageError::NotFound(format!("session {}", id)))?;
        lines.remove(index);

        self.writer().write_lines(&lines)?;
        info!("Deleted session {}", id);
        Ok(removed)
    }
}

/// Find a session among raw stored lines. Lines that don't parse are never
/// matched, so rewrites carry them through untouched.
fn locate(lines: &[String], id: &SessionId) -> Option<(usize, Session)> {
    lines.iter().enumerate().find_map(|(i, line)| {
        match serde_json::from_str::<Session>(line) {
            Ok(session) if &session.id == id => Some((i, session)),
            Ok(_) => None,
            Err(e) => {
                warn!("Keeping unreadable session line {}: {}", i + 1, e);
                None
            }
        }
    })
}

/// Latest stored aggregate for a user.
pub fn read_user_stats(
    config: &StorageConfig,
    user_id: &str,
) -> Result<Option<UserStats>, StorageError> {
    let reader: JsonlReader<UserStats> = JsonlReader::for_entity(config, EntityType::UserStats);
    Ok(reader
        .read_where(|s| s.user_id == user_id)?
        .into_iter()
        .last())
}

/// Store a user aggregate, replacing any previous one for the same user.
pub fn write_user_stats(config: &StorageConfig, stats: &UserStats) -> Result<(), StorageError> {
    let reader: JsonlReader<UserStats> = JsonlReader::for_entity(config, EntityType::UserStats);
    let mut all = reader.read_where(|s| s.user_id != stats.user_id)?;
    all.push(stats.clone());
    all.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    JsonlWriter::for_entity(config, EntityType::UserStats).write_all(&all)?;
    Ok(())
}
