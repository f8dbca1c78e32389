//! Delta cursor persistence
//!
//! The cursor is the only state that must survive restarts. It is stored as
//! a single text file, overwritten (never appended) after every successful
//! sweep, and written atomically (temp file + rename) so a crash can never
//! leave a corrupt or partial cursor behind.

use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::DeltaCursor;

/// File-backed store for the delta cursor.
///
/// Single writer: only the ingestion loop touches this file.
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted cursor.
    ///
    /// Absent or unreadable files mean "no cursor" (full sync); an
    /// unreadable file is logged but never fatal.
    pub fn load(&self) -> Option<DeltaCursor> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(DeltaCursor::new(trimmed))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Could not read cursor file {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Persist a new cursor, replacing any previous value.
    pub fn store(&self, cursor: &DeltaCursor) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, cursor.as_str())
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Forget the cursor (forces a full sync next cycle).
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        Ok(())
    }
}
