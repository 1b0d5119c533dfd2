//! In-memory archive backend.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::domain::FileRow;
use crate::error::{PreviewError, Result};
use crate::path::canonical_key;
use crate::repo::{ArchiveRepo, ArchiveWriter};

/// Archive held entirely in memory. Also records what it is asked to write, which makes it
/// the save sink of choice when no container on disk is wanted.
#[derive(Default)]
pub struct MemArchive {
    files: Vec<(String, Vec<u8>)>,
    unreadable: HashSet<String>,
    written: Mutex<BTreeMap<PathBuf, Vec<(String, Vec<u8>)>>>,
}

impl MemArchive {
    pub fn new<P: Into<String>>(files: impl IntoIterator<Item = (P, Vec<u8>)>) -> Self {
        Self {
            files: files.into_iter().map(|(p, b)| (p.into(), b)).collect(),
            ..Default::default()
        }
    }

    /// Make `path` list normally but fail on extraction.
    pub fn with_unreadable(mut self, path: &str) -> Self {
        self.unreadable.insert(canonical_key(path));
        self
    }

    /// Entries passed to the last `write` for `dest`, if any.
    pub fn written(&self, dest: &Path) -> Option<Vec<(String, Vec<u8>)>> {
        self.written.lock().ok()?.get(dest).cloned()
    }
}

impl ArchiveRepo for MemArchive {
    fn list_files(&self) -> Result<Vec<FileRow>> {
        Ok(self
            .files
            .iter()
            .map(|(p, b)| FileRow {
                path: p.clone(),
                size: b.len() as u64,
            })
            .collect())
    }

    fn extract(&self, path: &str) -> Result<Vec<u8>> {
        let key = canonical_key(path);
        if self.unreadable.contains(&key) {
            return Err(PreviewError::Format(format!("{path}: payload unreadable")));
        }
        self.files
            .iter()
            .find(|(p, _)| canonical_key(p) == key)
            .map(|(_, b)| b.clone())
            .ok_or_else(|| PreviewError::NotFound(path.to_string()))
    }
}

impl ArchiveWriter for MemArchive {
    fn write(&self, dest: &Path, files: &[(String, Vec<u8>)]) -> Result<()> {
        let mut w = self
            .written
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        w.insert(dest.to_path_buf(), files.to_vec());
        Ok(())
    }
}
