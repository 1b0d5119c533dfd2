use std::path::{Path, PathBuf};

use crate::domain::FileRow;
use crate::error::Result;

#[derive(Clone, Debug)]
pub struct OpenParams {
    pub archive_path: PathBuf,
}

/// Read side of an archive container.
pub trait ArchiveRepo: Send + Sync {
    fn list_files(&self) -> Result<Vec<FileRow>>;

    /// Full payload of `path`; `PreviewError::NotFound` when the container has no such entry.
    fn extract(&self, path: &str) -> Result<Vec<u8>>;
}

/// Write side: produce a fresh container at `dest` from `(path, bytes)` pairs, in order.
pub trait ArchiveWriter: Send + Sync {
    fn write(&self, dest: &Path, files: &[(String, Vec<u8>)]) -> Result<()>;
}
