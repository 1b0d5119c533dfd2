//! Property tests for the overlay's effective view and the tree built from it.

use std::collections::HashSet;

use packview_core::domain::FileRow;
use packview_core::tree::TreeBuilder;
use packview_core::{EntryPath, EntryStore, EntrySource};
use proptest::prelude::*;

fn name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "B", "c", "Dd", "e"]).prop_map(str::to_string)
}

fn rel_path() -> impl Strategy<Value = String> {
    (prop::collection::vec(name(), 0..3), name(), prop::sample::select(vec![".txt", ".GAF", ".tdf", ""]))
        .prop_map(|(dirs, file, ext)| {
            let mut p = dirs.iter().map(|d| format!("d{d}")).collect::<Vec<_>>();
            p.push(format!("f{file}{ext}"));
            p.join(if file.len() % 2 == 0 { "\\" } else { "/" })
        })
}

fn rows(paths: &[String]) -> Vec<FileRow> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .filter(|p| seen.insert(EntryPath::new(p)))
        .map(|p| FileRow {
            path: p.clone(),
            size: p.len() as u64,
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_effective_paths_are_unique_and_externals_win(
        base in prop::collection::vec(rel_path(), 0..20),
        added in prop::collection::vec(rel_path(), 0..10),
        doomed in prop::collection::vec(rel_path(), 0..10),
    ) {
        let mut store = EntryStore::new(rows(&base));
        for p in &doomed {
            let _ = store.delete(&EntryPath::new(p));
        }
        let mut landed = Vec::new();
        for p in &added {
            let path = EntryPath::new(p);
            if store.add_external(path.clone(), p.as_bytes().to_vec()).is_ok() {
                landed.push(path);
            }
        }

        let view = store.effective_entries();
        let mut keys = HashSet::new();
        for e in &view {
            prop_assert!(keys.insert(e.path().key().to_string()), "duplicate {}", e.path());
        }
        for path in &landed {
            let hit = store.lookup(path);
            prop_assert!(hit.is_some());
            prop_assert_eq!(hit.map(|e| e.source()), Some(EntrySource::External));
        }
    }

    #[test]
    fn prop_sorted_tree_ignores_input_order(
        paths in prop::collection::vec(rel_path(), 1..25),
        seed in any::<u64>(),
    ) {
        let store = EntryStore::new(rows(&paths));
        let entries = store.effective_entries();
        let mut shuffled = entries.clone();
        // deterministic Fisher-Yates driven by the seed
        let mut s = seed;
        for i in (1..shuffled.len()).rev() {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let j = (s >> 33) as usize % (i + 1);
            shuffled.swap(i, j);
        }

        let a = TreeBuilder::build(&entries, true, None);
        let b = TreeBuilder::build(&shuffled, true, None);
        prop_assert_eq!(a.file_count(), entries.len());
        prop_assert_eq!(a, b);
    }
}
