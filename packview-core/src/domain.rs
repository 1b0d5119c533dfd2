use std::sync::Arc;

use crate::path::EntryPath;

/// One row of an archive listing, as reported by the container.
#[derive(Clone, Debug)]
pub struct FileRow {
    pub path: String,
    pub size: u64,
}

/// Entry resident in the loaded container. Never mutated; only shadowed.
#[derive(Clone, Debug)]
pub struct ArchiveEntry {
    pub path: EntryPath,
    pub size: u64,
}

/// Entry added from outside the container. Owns its payload.
#[derive(Clone, Debug)]
pub struct ExternalEntry {
    pub path: EntryPath,
    pub bytes: Arc<[u8]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntrySource {
    Archive,
    External,
}

/// One record of the overlay's effective view.
#[derive(Clone, Debug)]
pub enum EffectiveEntry {
    Archive(ArchiveEntry),
    External(ExternalEntry),
}

impl EffectiveEntry {
    pub fn path(&self) -> &EntryPath {
        match self {
            EffectiveEntry::Archive(e) => &e.path,
            EffectiveEntry::External(e) => &e.path,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            EffectiveEntry::Archive(e) => e.size,
            EffectiveEntry::External(e) => e.bytes.len() as u64,
        }
    }

    pub fn source(&self) -> EntrySource {
        match self {
            EffectiveEntry::Archive(_) => EntrySource::Archive,
            EffectiveEntry::External(_) => EntrySource::External,
        }
    }
}
