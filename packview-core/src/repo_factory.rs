use std::sync::Arc;

use crate::error::Result;
use crate::repo::{ArchiveRepo, OpenParams};
use crate::repo_fs::FsArchiveRepo;

pub enum Backend {
    Pack,
}

pub fn open_repo(backend: Backend, p: OpenParams) -> Result<Arc<dyn ArchiveRepo>> {
    match backend {
        Backend::Pack => Ok(Arc::new(FsArchiveRepo::new(p)?)),
    }
}
