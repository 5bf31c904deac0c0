//! Persistence of the conversation log.
//!
//! The full ordered message sequence is written as one JSON document after
//! every mutation. A missing or corrupt file is treated as an empty
//! conversation, never as a fatal error.

use crate::models::Message;
use color_eyre::{eyre::eyre, eyre::WrapErr, Result};
use std::fs;
use std::path::{Path, PathBuf};

const HISTORY_FILE: &str = "history.json";

/// File-backed store for the conversation log.
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Store under the platform data directory, e.g. `~/.local/share/murmur`.
    pub fn new() -> Result<Self> {
        let base = dirs::data_dir().ok_or_else(|| eyre!("no data directory available"))?;
        Ok(Self::at_dir(base.join("murmur")))
    }

    /// Store under an explicit directory. Used by tests.
    pub fn at_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(HISTORY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full log. Failures leave any previous file untouched only
    /// as far as the filesystem allows; the caller decides whether to
    /// surface or swallow the error.
    pub fn save(&self, messages: &[Message]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).wrap_err("Failed to create data directory")?;
            }
        }
        let json = serde_json::to_string_pretty(messages)
            .wrap_err("Failed to serialize conversation")?;
        fs::write(&self.path, json)
            .wrap_err(format!("Failed to write conversation to {:?}", self.path))?;
        Ok(())
    }

    /// Load the stored log. Absent or unreadable history yields an empty
    /// conversation.
    pub fn load(&self) -> Vec<Message> {
        if !self.path.exists() {
            return Vec::new();
        }
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!("failed to read stored history, starting empty: {err}");
                return Vec::new();
            }
        };
        match serde_json::from_str(&json) {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!("stored history is corrupt, starting empty: {err}");
                Vec::new()
            }
        }
    }
}
