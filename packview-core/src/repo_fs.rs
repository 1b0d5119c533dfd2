use std::sync::Arc;

use crate::domain::FileRow;
use crate::error::Result;
use crate::read::opened::Opened;
use crate::repo::{ArchiveRepo, OpenParams};

pub struct FsArchiveRepo {
    opened: Arc<Opened>,
}

impl FsArchiveRepo {
    pub fn new(params: OpenParams) -> Result<Self> {
        let opened = Opened::open(&params.archive_path)?;
        Ok(Self {
            opened: Arc::new(opened),
        })
    }
}

impl ArchiveRepo for FsArchiveRepo {
    fn list_files(&self) -> Result<Vec<FileRow>> {
        let rows = self
            .opened
            .list_entries()
            .map(|e| FileRow {
                path: e.path.clone(),
                size: e.u_size,
            })
            .collect();
        Ok(rows)
    }

    fn extract(&self, path: &str) -> Result<Vec<u8>> {
        self.opened.read_entry(path)
    }
}
