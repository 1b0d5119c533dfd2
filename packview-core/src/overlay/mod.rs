//! The virtual archive: container entries, tombstones and externally added files composed into
//! one effective view.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{ArchiveEntry, EffectiveEntry, ExternalEntry, FileRow};
use crate::error::{PreviewError, Result};
use crate::path::{EntryPath, canonical_key};
use crate::repo::{ArchiveRepo, ArchiveWriter};

#[derive(Clone, Debug, Default)]
pub struct EntryStore {
    base: Vec<ArchiveEntry>,
    base_keys: HashSet<String>,
    deleted: BTreeSet<String>,
    external: Vec<ExternalEntry>,
}

/// Outcome of writing the effective view to a new container.
#[derive(Clone, Debug, Default)]
pub struct SaveReport {
    pub written: usize,
    pub failures: Vec<(EntryPath, String)>,
}

impl SaveReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// `PartialSaveFailure` when any entry was skipped.
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(PreviewError::PartialSaveFailure {
                written: self.written,
                failed: self.failures.len(),
            })
        }
    }
}

impl EntryStore {
    pub fn new(rows: impl IntoIterator<Item = FileRow>) -> Self {
        let mut store = Self::default();
        store.load(rows);
        store
    }

    pub fn from_repo(repo: &dyn ArchiveRepo) -> Result<Self> {
        Ok(Self::new(repo.list_files()?))
    }

    /// Replace the container entries and drop every overlay edit.
    pub fn load(&mut self, rows: impl IntoIterator<Item = FileRow>) {
        self.base.clear();
        self.base_keys.clear();
        for row in rows {
            let path = EntryPath::new(&row.path);
            if path.is_empty() {
                continue;
            }
            // first spelling of a path wins
            if self.base_keys.insert(path.key().to_string()) {
                self.base.push(ArchiveEntry {
                    path,
                    size: row.size,
                });
            }
        }
        self.reset();
    }

    /// Clear tombstones and external entries.
    pub fn reset(&mut self) {
        self.deleted.clear();
        self.external.clear();
    }

    pub fn base_entries(&self) -> &[ArchiveEntry] {
        &self.base
    }

    pub fn externals(&self) -> &[ExternalEntry] {
        &self.external
    }

    pub fn deleted(&self) -> impl Iterator<Item = &str> {
        self.deleted.iter().map(String::as_str)
    }

    fn external_pos(&self, key: &str) -> Option<usize> {
        self.external.iter().position(|e| e.path.key() == key)
    }

    /// Container entries (minus tombstones and paths shadowed by an external entry) in
    /// container order, followed by external entries in the order they were added.
    pub fn effective_entries(&self) -> Vec<EffectiveEntry> {
        let shadowed: HashSet<&str> = self.external.iter().map(|e| e.path.key()).collect();
        let mut out = Vec::with_capacity(self.base.len() + self.external.len());
        out.extend(
            self.base
                .iter()
                .filter(|e| !self.deleted.contains(e.path.key()) && !shadowed.contains(e.path.key()))
                .cloned()
                .map(EffectiveEntry::Archive),
        );
        out.extend(self.external.iter().cloned().map(EffectiveEntry::External));
        out
    }

    pub fn lookup(&self, path: &EntryPath) -> Option<EffectiveEntry> {
        if let Some(i) = self.external_pos(path.key()) {
            return Some(EffectiveEntry::External(self.external[i].clone()));
        }
        if self.deleted.contains(path.key()) {
            return None;
        }
        self.base
            .iter()
            .find(|e| e.path == *path)
            .cloned()
            .map(EffectiveEntry::Archive)
    }

    pub fn contains(&self, path: &EntryPath) -> bool {
        self.lookup(path).is_some()
    }

    /// Remove `path` from the view. External entries are dropped outright; container entries
    /// get a tombstone. A path that is both is dropped and tombstoned.
    pub fn delete(&mut self, path: &EntryPath) -> Result<()> {
        if !self.contains(path) {
            return Err(PreviewError::NotFound(path.to_string()));
        }
        if let Some(i) = self.external_pos(path.key()) {
            self.external.remove(i);
            debug!("overlay: dropped external {}", path);
        }
        if self.base_keys.contains(path.key()) {
            self.deleted.insert(path.key().to_string());
            debug!("overlay: tombstoned {}", path);
        }
        Ok(())
    }

    /// Delete every effective entry below the directory `dir`. Returns the removed paths.
    pub fn delete_recursive(&mut self, dir: &str) -> Result<Vec<EntryPath>> {
        let dir_key = canonical_key(dir);
        let doomed: Vec<EntryPath> = self
            .effective_entries()
            .into_iter()
            .map(|e| e.path().clone())
            .filter(|p| p.is_under(&dir_key) || p.key() == dir_key)
            .collect();
        if doomed.is_empty() {
            return Err(PreviewError::NotFound(dir.to_string()));
        }
        for p in &doomed {
            self.delete(p)?;
        }
        info!(count = doomed.len(), "overlay: deleted under {dir}");
        Ok(doomed)
    }

    /// Add one external entry. Last writer wins over an existing file of the same path.
    pub fn add_external(&mut self, path: EntryPath, bytes: impl Into<Arc<[u8]>>) -> Result<()> {
        self.add_external_many(vec![(path, bytes.into())])
    }

    /// Add a batch of external entries; either all of them land or none do.
    pub fn add_external_many(&mut self, batch: Vec<(EntryPath, Arc<[u8]>)>) -> Result<()> {
        let mut files: HashSet<String> = HashSet::new();
        let mut dirs: HashMap<String, String> = HashMap::new();
        for e in self.effective_entries() {
            note_entry(e.path(), &mut files, &mut dirs);
        }

        for (path, _) in &batch {
            if path.is_empty() || path.is_unsafe() {
                return Err(PreviewError::PathConflict {
                    path: path.to_string(),
                    reason: "not a valid entry path".into(),
                });
            }
            if let Some(holder) = dirs.get(path.key()) {
                return Err(PreviewError::PathConflict {
                    path: path.to_string(),
                    reason: format!("already a directory (holds {holder})"),
                });
            }
            if let Some(parent) = path.ancestor_keys().into_iter().find(|k| files.contains(*k)) {
                return Err(PreviewError::PathConflict {
                    path: path.to_string(),
                    reason: format!("parent {parent} is a file"),
                });
            }
            note_entry(path, &mut files, &mut dirs);
        }

        for (path, bytes) in batch {
            if let Some(i) = self.external_pos(path.key()) {
                self.external.remove(i);
            }
            debug!(size = bytes.len(), "overlay: added external {}", path);
            self.external.push(ExternalEntry { path, bytes });
        }
        Ok(())
    }

    /// Distinct uppercased extensions of the effective view, sorted case-insensitively.
    pub fn extensions(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .effective_entries()
            .iter()
            .filter_map(|e| e.path().extension())
            .collect();
        set.into_iter().collect()
    }

    /// Payload of an effective entry.
    pub fn read(&self, entry: &EffectiveEntry, repo: &dyn ArchiveRepo) -> Result<Arc<[u8]>> {
        match entry {
            EffectiveEntry::External(e) => Ok(e.bytes.clone()),
            EffectiveEntry::Archive(e) => Ok(repo.extract(e.path.as_str())?.into()),
        }
    }

    /// Write the effective view to `dest` in path order. Entries whose payload cannot be read
    /// are skipped and reported; only a failure of the write itself is an error.
    pub fn save(
        &self,
        repo: &dyn ArchiveRepo,
        writer: &dyn ArchiveWriter,
        dest: &Path,
    ) -> Result<SaveReport> {
        let mut entries = self.effective_entries();
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        let resolved: Vec<(EntryPath, Result<Arc<[u8]>>)> = entries
            .par_iter()
            .map(|e| (e.path().clone(), self.read(e, repo)))
            .collect();

        let mut report = SaveReport::default();
        let mut files = Vec::with_capacity(resolved.len());
        for (path, res) in resolved {
            match res {
                Ok(bytes) => files.push((path.as_str().to_string(), bytes.to_vec())),
                Err(e) => {
                    warn!("save: skipping {path}: {e}");
                    report.failures.push((path, e.to_string()));
                }
            }
        }
        writer.write(dest, &files)?;
        report.written = files.len();
        info!(
            written = report.written,
            failed = report.failed(),
            "saved {}",
            dest.display()
        );
        Ok(report)
    }
}

fn note_entry(path: &EntryPath, files: &mut HashSet<String>, dirs: &mut HashMap<String, String>) {
    files.insert(path.key().to_string());
    for k in path.ancestor_keys() {
        dirs.entry(k.to_string())
            .or_insert_with(|| path.as_str().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntrySource;
    use crate::mem::MemArchive;

    fn rows(paths: &[&str]) -> Vec<FileRow> {
        paths
            .iter()
            .map(|p| FileRow {
                path: p.to_string(),
                size: 1,
            })
            .collect()
    }

    fn keys(store: &EntryStore) -> Vec<String> {
        store
            .effective_entries()
            .iter()
            .map(|e| e.path().key().to_string())
            .collect()
    }

    #[test]
    fn tombstone_hides_archive_entry() {
        let mut s = EntryStore::new(rows(&["a.txt", "b.txt"]));
        s.delete(&"A.TXT".into()).unwrap();
        assert_eq!(keys(&s), vec!["b.txt"]);
        assert_eq!(s.deleted().collect::<Vec<_>>(), vec!["a.txt"]);
    }

    #[test]
    fn external_shadows_archive_entry_of_same_path() {
        let mut s = EntryStore::new(rows(&["data/x.tdf", "y.txt"]));
        s.add_external("DATA\\X.TDF".into(), vec![9u8]).unwrap();
        let view = s.effective_entries();
        assert_eq!(view.len(), 2);
        let x = s.lookup(&"data/x.tdf".into()).unwrap();
        assert_eq!(x.source(), EntrySource::External);
    }

    #[test]
    fn deleting_external_leaves_no_tombstone() {
        let mut s = EntryStore::new(rows(&["a.txt"]));
        s.add_external("new.txt".into(), vec![1u8]).unwrap();
        s.delete(&"new.txt".into()).unwrap();
        assert_eq!(s.deleted().count(), 0);
        assert_eq!(keys(&s), vec!["a.txt"]);
    }

    #[test]
    fn readding_serves_new_bytes() {
        let mut s = EntryStore::new(rows(&[]));
        s.add_external("n.txt".into(), vec![1u8]).unwrap();
        s.delete(&"n.txt".into()).unwrap();
        s.add_external("n.txt".into(), vec![2u8]).unwrap();
        match s.lookup(&"n.txt".into()).unwrap() {
            EffectiveEntry::External(e) => assert_eq!(&*e.bytes, &[2u8]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let mut s = EntryStore::new(rows(&["a.txt"]));
        assert!(matches!(
            s.delete(&"zzz".into()),
            Err(PreviewError::NotFound(_))
        ));
    }

    #[test]
    fn add_over_directory_is_rejected_without_mutation() {
        let mut s = EntryStore::new(rows(&["units/armcom.fbi"]));
        let err = s
            .add_external_many(vec![
                ("ok.txt".into(), Arc::from(vec![1u8])),
                ("UNITS".into(), Arc::from(vec![1u8])),
            ])
            .unwrap_err();
        assert!(matches!(err, PreviewError::PathConflict { .. }));
        assert_eq!(s.externals().len(), 0);
    }

    #[test]
    fn add_below_a_file_is_rejected() {
        let mut s = EntryStore::new(rows(&["readme"]));
        assert!(matches!(
            s.add_external("readme/inner.txt".into(), vec![0u8]),
            Err(PreviewError::PathConflict { .. })
        ));
    }

    #[test]
    fn tombstoned_directory_does_not_conflict() {
        let mut s = EntryStore::new(rows(&["maps/a.tnt"]));
        s.delete(&"maps/a.tnt".into()).unwrap();
        s.add_external("maps".into(), vec![0u8]).unwrap();
        assert_eq!(keys(&s), vec!["maps"]);
    }

    #[test]
    fn recursive_delete_removes_everything_below() {
        let mut s = EntryStore::new(rows(&["a/1", "a/b/2", "ab/3"]));
        s.add_external("a/c/4".into(), vec![0u8]).unwrap();
        let gone = s.delete_recursive("A").unwrap();
        assert_eq!(gone.len(), 3);
        assert_eq!(keys(&s), vec!["ab/3"]);
    }

    #[test]
    fn reset_clears_overlay() {
        let mut s = EntryStore::new(rows(&["a", "b"]));
        s.delete(&"a".into()).unwrap();
        s.add_external("c".into(), vec![0u8]).unwrap();
        s.reset();
        assert_eq!(keys(&s), vec!["a", "b"]);
    }

    #[test]
    fn extension_catalog() {
        let s = EntryStore::new(rows(&["a.tdf", "b.TDF", "c.gaf", "noext"]));
        assert_eq!(s.extensions(), vec![".GAF", ".TDF"]);
    }

    #[test]
    fn save_writes_remaining_plus_external() {
        let repo = MemArchive::new([
            ("one.txt", b"1".to_vec()),
            ("two.txt", b"2".to_vec()),
            ("three.txt", b"3".to_vec()),
        ]);
        let mut s = EntryStore::from_repo(&repo).unwrap();
        s.delete(&"two.txt".into()).unwrap();
        s.add_external("extra\\four.txt".into(), b"4".to_vec()).unwrap();

        let dest = Path::new("out.pak");
        let report = s.save(&repo, &repo, dest).unwrap();
        assert_eq!(report.written, 3);
        assert_eq!(report.failed(), 0);

        let written = repo.written(dest).unwrap();
        let paths: Vec<&str> = written.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["extra\\four.txt", "one.txt", "three.txt"]);
    }

    #[test]
    fn save_skips_unreadable_entries_and_reports_them() {
        let repo = MemArchive::new([("ok.txt", b"1".to_vec()), ("bad.txt", b"2".to_vec())])
            .with_unreadable("bad.txt");
        let s = EntryStore::from_repo(&repo).unwrap();
        let report = s.save(&repo, &repo, Path::new("o")).unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].0.key(), "bad.txt");
        assert!(matches!(
            report.into_result(),
            Err(PreviewError::PartialSaveFailure { written: 1, failed: 1 })
        ));
    }
}
