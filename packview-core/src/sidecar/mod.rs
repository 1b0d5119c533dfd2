//! Sidecar files next to an archive that persist overlay edits between runs:
//! `<archive>.pvlog` (journal of edits) and `<archive>.pvdelta` (external payloads).

pub mod delta;
pub mod journal;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PreviewError, Result};
use crate::overlay::EntryStore;
use crate::path::EntryPath;
use delta::DeltaStore;
use journal::{Journal, LogRecord};

pub struct Sidecar {
    pub log_path: PathBuf,
    pub delta_path: PathBuf,
    journal: Journal,
    delta: DeltaStore,
}

impl Sidecar {
    pub fn open(archive: &Path) -> Result<Self> {
        let log_path = with_ext(archive, "pvlog");
        let delta_path = with_ext(archive, "pvdelta");
        Ok(Self {
            journal: Journal::open(&log_path)?,
            delta: DeltaStore::open(&delta_path)?,
            log_path,
            delta_path,
        })
    }

    /// Re-apply recorded edits to `store`. Edits that no longer apply (the container changed
    /// underneath) are skipped. Returns the recorded decode parameters, last value per name.
    pub fn replay(&mut self, store: &mut EntryStore) -> Result<Vec<(String, String)>> {
        let records = self.journal.records()?;

        let mut params: Vec<(String, String)> = Vec::new();
        for rec in records {
            let applied = match rec {
                LogRecord::Delete { path } => store.delete(&EntryPath::new(&path)),
                LogRecord::DeleteTree { dir } => store.delete_recursive(&dir).map(|_| ()),
                LogRecord::AddExternal {
                    path,
                    off,
                    len,
                    blake3,
                } => {
                    self.delta.read_frame(off, len).and_then(|bytes| {
                        if blake3::hash(&bytes).as_bytes() != &blake3 {
                            Err(PreviewError::Format(format!("{path}: delta frame digest mismatch")))
                        } else {
                            store.add_external(EntryPath::new(&path), bytes)
                        }
                    })
                }
                LogRecord::SetParam { name, value } => {
                    params.retain(|(n, _)| *n != name);
                    params.push((name, value));
                    Ok(())
                }
            };
            if let Err(e) = applied {
                warn!("sidecar: skipping stale edit: {e}");
            }
        }
        debug!(
            externals = store.externals().len(),
            deleted = store.deleted().count(),
            "sidecar replayed from {}",
            self.log_path.display()
        );
        Ok(params)
    }

    pub fn record_delete(&mut self, path: &EntryPath) -> Result<()> {
        self.journal.append(&LogRecord::Delete {
            path: path.as_str().to_string(),
        })
    }

    pub fn record_delete_tree(&mut self, dir: &str) -> Result<()> {
        self.journal.append(&LogRecord::DeleteTree {
            dir: dir.to_string(),
        })
    }

    pub fn record_add(&mut self, path: &EntryPath, bytes: &[u8]) -> Result<()> {
        let (off, len) = self.delta.append_frame(bytes)?;
        self.journal.append(&LogRecord::AddExternal {
            path: path.as_str().to_string(),
            off,
            len,
            blake3: *blake3::hash(bytes).as_bytes(),
        })
    }

    pub fn record_param(&mut self, name: &str, value: &str) -> Result<()> {
        self.journal.append(&LogRecord::SetParam {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    /// Forget every recorded edit.
    pub fn clear(&mut self) -> Result<()> {
        self.journal.truncate()?;
        self.delta.truncate()
    }

    /// Drop the recorded overlay edits of `archive` without opening the container or applying
    /// anything. Decode parameters are kept.
    pub fn discard_edits(archive: &Path) -> Result<()> {
        let mut sc = Self::open(archive)?;
        let mut params: Vec<(String, String)> = Vec::new();
        for rec in sc.journal.records()? {
            if let LogRecord::SetParam { name, value } = rec {
                params.retain(|(n, _)| *n != name);
                params.push((name, value));
            }
        }
        sc.clear()?;
        for (name, value) in &params {
            sc.record_param(name, value)?;
        }
        debug!(kept = params.len(), "sidecar edits discarded for {}", archive.display());
        Ok(())
    }
}

fn with_ext(base: &Path, ext: &str) -> PathBuf {
    let mut p = PathBuf::from(base);
    match p.extension() {
        Some(old) => {
            let joined = format!("{}.{ext}", old.to_string_lossy());
            p.set_extension(joined);
        }
        None => {
            p.set_extension(ext);
        }
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EffectiveEntry, FileRow};

    #[test]
    fn sidecar_names_keep_archive_extension() {
        assert_eq!(
            with_ext(Path::new("/x/totala1.pak"), "pvlog"),
            PathBuf::from("/x/totala1.pak.pvlog")
        );
        assert_eq!(with_ext(Path::new("game"), "pvdelta"), PathBuf::from("game.pvdelta"));
    }

    #[test]
    fn replay_rebuilds_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.pak");
        let rows = || {
            vec![
                FileRow { path: "keep.txt".into(), size: 1 },
                FileRow { path: "drop.txt".into(), size: 1 },
            ]
        };
        {
            let mut sc = Sidecar::open(&archive).unwrap();
            sc.record_delete(&"drop.txt".into()).unwrap();
            sc.record_add(&"new\\file.tdf".into(), b"[x]").unwrap();
            sc.record_param("palette", "p1.pal").unwrap();
            sc.record_param("palette", "p2.pal").unwrap();
            sc.record_delete(&"missing.txt".into()).unwrap();
        }

        let mut store = EntryStore::new(rows());
        let mut sc = Sidecar::open(&archive).unwrap();
        let params = sc.replay(&mut store).unwrap();
        assert_eq!(params, vec![("palette".to_string(), "p2.pal".to_string())]);

        let view = store.effective_entries();
        assert_eq!(view.len(), 2);
        match store.lookup(&"NEW/FILE.TDF".into()).unwrap() {
            EffectiveEntry::External(e) => assert_eq!(&*e.bytes, b"[x]"),
            other => panic!("unexpected {other:?}"),
        }

        sc.clear().unwrap();
        let mut fresh = EntryStore::new(rows());
        assert!(sc.replay(&mut fresh).unwrap().is_empty());
        assert_eq!(fresh.effective_entries().len(), 2);
    }

    fn journal_tail(archive: &Path, flip: usize) {
        let log = with_ext(archive, "pvlog");
        let mut bytes = std::fs::read(&log).unwrap();
        let n = bytes.len();
        bytes[n - flip] ^= 0xff;
        bytes[n - flip + 1] ^= 0xff;
        std::fs::write(&log, &bytes).unwrap();
    }

    #[test]
    fn corrupt_last_record_replays_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.pak");
        {
            let mut sc = Sidecar::open(&archive).unwrap();
            sc.record_param("palette", "p1.pal").unwrap();
            sc.record_delete(&"drop.txt".into()).unwrap();
        }
        journal_tail(&archive, 3);

        let mut store = EntryStore::new(vec![FileRow { path: "drop.txt".into(), size: 1 }]);
        let params = Sidecar::open(&archive).unwrap().replay(&mut store).unwrap();
        assert_eq!(params, vec![("palette".to_string(), "p1.pal".to_string())]);
        assert_eq!(store.effective_entries().len(), 1);
    }

    #[test]
    fn missing_delta_frame_skips_only_that_edit() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.pak");
        {
            let mut sc = Sidecar::open(&archive).unwrap();
            sc.record_add(&"new.txt".into(), b"payload").unwrap();
            sc.record_delete(&"drop.txt".into()).unwrap();
        }
        std::fs::write(with_ext(&archive, "pvdelta"), b"").unwrap();

        let mut store = EntryStore::new(vec![FileRow { path: "drop.txt".into(), size: 1 }]);
        Sidecar::open(&archive).unwrap().replay(&mut store).unwrap();
        assert!(store.externals().is_empty());
        assert!(store.effective_entries().is_empty());
    }

    #[test]
    fn discarding_edits_keeps_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.pak");
        {
            let mut sc = Sidecar::open(&archive).unwrap();
            sc.record_param("palette", "p1.pal").unwrap();
            sc.record_add(&"new.txt".into(), b"payload").unwrap();
            sc.record_delete(&"drop.txt".into()).unwrap();
        }
        Sidecar::discard_edits(&archive).unwrap();

        let mut store = EntryStore::new(vec![FileRow { path: "drop.txt".into(), size: 1 }]);
        let params = Sidecar::open(&archive).unwrap().replay(&mut store).unwrap();
        assert_eq!(params, vec![("palette".to_string(), "p1.pal".to_string())]);
        assert_eq!(store.effective_entries().len(), 1);
        assert_eq!(std::fs::metadata(with_ext(&archive, "pvdelta")).unwrap().len(), 0);
    }
}
