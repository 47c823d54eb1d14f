//! File-backed conversation store.
//!
//! Layout under the store root (default `~/.mcpchat/conversations/`):
//! ```text
//! {encoded_id}/latest.json
//! {encoded_id}/snapshots/{safe_timestamp}.json
//! ```
//! Each file holds one pretty-printed [`ConversationRecord`]. Ids are
//! percent-encoded into a single path component, so no two ids share a
//! directory and `.`/`..` never escape the root. Records whose
//! `conversation_id` does not match their directory are ignored.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::{
    build_records, sort_summaries, ConversationRecord, ConversationStore, ConversationSummary,
    DEFAULT_TTL_DAYS,
};
use crate::error::PersistenceError;
use crate::types::Message;
use crate::utils;

const LATEST_FILE: &str = "latest.json";
const SNAPSHOTS_DIR: &str = "snapshots";

/// Conversation store writing JSON records to a directory tree.
pub struct FileConversationStore {
    root: PathBuf,
    ttl: Duration,
}

impl FileConversationStore {
    /// Open (and create) a store rooted at `root`.
    ///
    /// `root` defaults to `~/.mcpchat/conversations/` if `None`.
    pub fn new(root: Option<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.unwrap_or_else(utils::get_conversations_path);
        std::fs::create_dir_all(&root).map_err(|e| PersistenceError::io(&root, e))?;
        Ok(FileConversationStore {
            root,
            ttl: Duration::days(DEFAULT_TTL_DAYS),
        })
    }

    /// Override the record lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn conversation_dir(&self, id: &str) -> PathBuf {
        self.root.join(utils::encode_path_component(id))
    }

    fn latest_path(&self, id: &str) -> PathBuf {
        self.conversation_dir(id).join(LATEST_FILE)
    }

    fn snapshots_dir(&self, id: &str) -> PathBuf {
        self.conversation_dir(id).join(SNAPSHOTS_DIR)
    }

    /// Drop expired records of one conversation directory.
    ///
    /// Removes the directory once nothing live is left in it.
    fn purge_dir(&self, dir: &Path, now: DateTime<Utc>) -> Result<usize, PersistenceError> {
        let mut removed = 0;

        let latest = dir.join(LATEST_FILE);
        match read_record(&latest) {
            Ok(Some(record)) if record.is_expired(now) => {
                remove_file(&latest)?;
                removed += 1;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "skipping unreadable latest record during purge"),
        }

        let snapshots = dir.join(SNAPSHOTS_DIR);
        for path in json_files(&snapshots)? {
            match read_record(&path) {
                Ok(Some(record)) if record.is_expired(now) => {
                    remove_file(&path)?;
                    removed += 1;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping unreadable snapshot during purge"),
            }
        }

        if !latest.exists() && json_files(&snapshots)?.is_empty() {
            std::fs::remove_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;
            debug!(dir = %dir.display(), "removed empty conversation directory");
        }

        Ok(removed)
    }

    /// Whether `record` is the one `dir` is named after.
    fn owns(&self, dir: &Path, record: &ConversationRecord) -> bool {
        dir == self.conversation_dir(&record.conversation_id)
    }

    fn conversation_dirs(&self) -> Result<Vec<PathBuf>, PersistenceError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::io(&self.root, e)),
        };
        Ok(entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect())
    }
}

impl ConversationStore for FileConversationStore {
    fn save(&self, id: &str, messages: &[Message]) -> Result<(), PersistenceError> {
        let now = Utc::now();
        let (latest, audit) = build_records(id, messages, now, self.ttl);

        let snapshots = self.snapshots_dir(id);
        std::fs::create_dir_all(&snapshots).map_err(|e| PersistenceError::io(&snapshots, e))?;

        // Full replace: the stale latest goes first so nothing merges into it.
        let latest_path = self.latest_path(id);
        if latest_path.exists() {
            remove_file(&latest_path)?;
        }
        write_record(&latest_path, &latest)?;

        let audit_path = snapshots.join(format!("{}.json", utils::safe_filename(&audit.timestamp)));
        write_record(&audit_path, &audit)?;

        debug!(
            conversation = id,
            messages = messages.len(),
            path = %latest_path.display(),
            "saved conversation"
        );
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Vec<Message>, PersistenceError> {
        let now = Utc::now();
        let Some(record) = read_record(&self.latest_path(id))? else {
            return Ok(Vec::new());
        };
        if record.conversation_id != id {
            warn!(
                conversation = id,
                stored = %record.conversation_id,
                "ignoring record filed under another conversation id"
            );
            return Ok(Vec::new());
        }

        if record.is_expired(now) {
            debug!(conversation = id, "latest record expired, reclaiming");
            self.purge_dir(&self.conversation_dir(id), now)?;
            return Ok(Vec::new());
        }

        let messages = record.decode_messages();
        debug!(conversation = id, messages = messages.len(), "loaded conversation");
        Ok(messages)
    }

    fn list(&self) -> Result<Vec<ConversationSummary>, PersistenceError> {
        let now = Utc::now();
        let mut summaries = Vec::new();

        for dir in self.conversation_dirs()? {
            match read_record(&dir.join(LATEST_FILE)) {
                Ok(Some(record)) if !self.owns(&dir, &record) => {
                    warn!(dir = %dir.display(), "skipping record filed under another conversation id");
                }
                Ok(Some(record)) if record.is_expired(now) => {
                    self.purge_dir(&dir, now)?;
                }
                Ok(Some(record)) => summaries.push(ConversationSummary::from_record(&record)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "skipping unreadable conversation record"),
            }
        }

        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    fn snapshots(&self, id: &str) -> Result<Vec<String>, PersistenceError> {
        let now = Utc::now();
        let mut stamps = Vec::new();
        for path in json_files(&self.snapshots_dir(id))? {
            match read_record(&path) {
                Ok(Some(record)) if record.conversation_id == id && !record.is_expired(now) => {
                    stamps.push(record.timestamp)
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping unreadable snapshot"),
            }
        }
        stamps.sort();
        Ok(stamps)
    }

    fn load_snapshot(&self, id: &str, timestamp: &str) -> Result<Vec<Message>, PersistenceError> {
        let path = self
            .snapshots_dir(id)
            .join(format!("{}.json", utils::safe_filename(timestamp)));
        match read_record(&path)? {
            Some(record)
                if record.conversation_id == id
                    && record.timestamp == timestamp
                    && !record.is_expired(Utc::now()) =>
            {
                Ok(record.decode_messages())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn delete(&self, id: &str) -> Result<bool, PersistenceError> {
        let dir = self.conversation_dir(id);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir).map_err(|e| PersistenceError::io(&dir, e))?;
        debug!(conversation = id, "deleted conversation");
        Ok(true)
    }

    fn purge_expired(&self) -> Result<usize, PersistenceError> {
        let now = Utc::now();
        let mut removed = 0;
        for dir in self.conversation_dirs()? {
            removed += self.purge_dir(&dir, now)?;
        }
        if removed > 0 {
            debug!(removed, "purged expired conversation records");
        }
        Ok(removed)
    }
}

// ─────────────────────────────────────────────
// File helpers
// ─────────────────────────────────────────────

fn read_record(path: &Path) -> Result<Option<ConversationRecord>, PersistenceError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn write_record(path: &Path, record: &ConversationRecord) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json).map_err(|e| PersistenceError::io(path, e))
}

fn remove_file(path: &Path) -> Result<(), PersistenceError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PersistenceError::io(path, e)),
    }
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>, PersistenceError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PersistenceError::io(dir, e)),
    };
    Ok(entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
