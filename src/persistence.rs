//! Cross-process session persistence: a small JSON document recording
//! enough state (`language`, `program`, `breakpoints`) that a freshly
//! started process can rebuild a `DebugSession`'s bookkeeping — not its
//! live backend connection, which the daemon keeps alive separately.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const SESSION_FILE: &str = ".debug_session.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionDocument {
    pub language: Option<String>,
    pub program: Option<String>,
    #[serde(default)]
    pub breakpoints: HashMap<String, Vec<i32>>,
}

impl SessionDocument {
    /// Load a session document from `path`, tolerating a missing or
    /// unparseable file by returning `None` (treated as "start fresh" by
    /// the orchestrator, matching `from_file_or_new`'s `except
    /// (json.JSONDecodeError, OSError)` swallow).
    pub fn load(path: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Write atomically via a temp file + rename so a crash mid-write
    /// never leaves a half-written session file behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = tmp_path_for(path);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn delete(path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
