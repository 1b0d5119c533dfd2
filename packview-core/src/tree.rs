//! Directory/file tree induced by the effective view.

use std::collections::{HashMap, HashSet};

use crate::domain::{EffectiveEntry, EntrySource};
use crate::path::EntryPath;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeNode {
    Directory(DirNode),
    File(FileNode),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirNode {
    /// Segment name as first seen.
    pub name: String,
    /// Canonical key of the prefix this directory stands for; empty for the root.
    pub key: String,
    pub children: Vec<TreeNode>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileNode {
    pub name: String,
    pub path: EntryPath,
    pub source: EntrySource,
    pub size: u64,
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Directory(d) => &d.name,
            TreeNode::File(f) => &f.name,
        }
    }

    pub fn file_count(&self) -> usize {
        match self {
            TreeNode::File(_) => 1,
            TreeNode::Directory(d) => d.children.iter().map(TreeNode::file_count).sum(),
        }
    }

    /// Depth-first visit of every node with its depth (root = 0), without recursion.
    pub fn walk(&self, mut f: impl FnMut(usize, &TreeNode)) {
        let mut stack = vec![(0usize, self)];
        while let Some((depth, node)) = stack.pop() {
            f(depth, node);
            if let TreeNode::Directory(d) = node {
                for c in d.children.iter().rev() {
                    stack.push((depth + 1, c));
                }
            }
        }
    }
}

pub struct TreeBuilder;

impl TreeBuilder {
    /// Build the tree in one go. `allowlist` holds uppercased extensions with their dot
    /// (`.TDF`); `None` admits every entry. Entries without an extension are always admitted.
    pub fn build(
        entries: &[EffectiveEntry],
        sort_alphabetically: bool,
        allowlist: Option<&HashSet<String>>,
    ) -> TreeNode {
        let mut asm = TreeAssembly::new(entries.to_vec(), sort_alphabetically, allowlist);
        asm.push_batch(usize::MAX);
        asm.finish()
    }
}

enum Slot {
    Dir(usize),
    File(FileNode),
}

struct PendingDir {
    name: String,
    key: String,
    children: Vec<Slot>,
}

/// Incremental tree construction for very large listings. Feeding the entries in batches
/// produces exactly the tree `TreeBuilder::build` would.
pub struct TreeAssembly {
    queue: std::vec::IntoIter<EffectiveEntry>,
    allowlist: Option<HashSet<String>>,
    dirs: Vec<PendingDir>,
    by_key: HashMap<String, usize>,
    root_name: String,
}

impl TreeAssembly {
    pub fn new(
        mut entries: Vec<EffectiveEntry>,
        sort_alphabetically: bool,
        allowlist: Option<&HashSet<String>>,
    ) -> Self {
        if sort_alphabetically {
            entries.sort_by_cached_key(|e| (e.path().sort_key(), e.path().key().to_string()));
        }
        let allowlist = allowlist.map(|set| set.iter().map(|e| normalize_ext(e)).collect());
        Self {
            queue: entries.into_iter(),
            allowlist,
            dirs: vec![PendingDir {
                name: String::new(),
                key: String::new(),
                children: Vec::new(),
            }],
            by_key: HashMap::new(),
            root_name: String::new(),
        }
    }

    /// Display name of the root node (usually the archive file name).
    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    /// Insert up to `max` more entries. Returns true while entries remain.
    pub fn push_batch(&mut self, max: usize) -> bool {
        for _ in 0..max {
            match self.queue.next() {
                Some(e) => self.insert(&e),
                None => return false,
            }
        }
        self.queue.len() > 0
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    fn admits(&self, path: &EntryPath) -> bool {
        match (&self.allowlist, path.extension()) {
            (None, _) | (_, None) => true,
            (Some(set), Some(ext)) => set.contains(&ext),
        }
    }

    fn insert(&mut self, entry: &EffectiveEntry) {
        let path = entry.path();
        if !self.admits(path) {
            return;
        }
        let segs: Vec<&str> = path.segments().collect();
        let Some((file_name, dirs)) = segs.split_last() else {
            return;
        };

        let mut parent = 0usize;
        let mut key = String::new();
        for seg in dirs {
            if !key.is_empty() {
                key.push('/');
            }
            key.push_str(&seg.to_lowercase());
            parent = match self.by_key.get(&key) {
                Some(&idx) => idx,
                None => {
                    let idx = self.dirs.len();
                    self.dirs.push(PendingDir {
                        name: seg.to_string(),
                        key: key.clone(),
                        children: Vec::new(),
                    });
                    self.dirs[parent].children.push(Slot::Dir(idx));
                    self.by_key.insert(key.clone(), idx);
                    idx
                }
            };
        }
        self.dirs[parent].children.push(Slot::File(FileNode {
            name: file_name.to_string(),
            path: path.clone(),
            source: entry.source(),
            size: entry.size(),
        }));
    }

    /// Insert whatever is left and hand out the finished tree.
    pub fn finish(mut self) -> TreeNode {
        while self.push_batch(usize::MAX) {}
        let mut slots: Vec<Option<PendingDir>> = self.dirs.into_iter().map(Some).collect();
        if let Some(Some(root)) = slots.first_mut() {
            root.name = self.root_name;
        }
        TreeNode::Directory(materialize(&mut slots, 0))
    }
}

fn materialize(slots: &mut [Option<PendingDir>], idx: usize) -> DirNode {
    let Some(pending) = slots.get_mut(idx).and_then(Option::take) else {
        return DirNode {
            name: String::new(),
            key: String::new(),
            children: Vec::new(),
        };
    };
    let children = pending
        .children
        .into_iter()
        .map(|slot| match slot {
            Slot::Dir(i) => TreeNode::Directory(materialize(slots, i)),
            Slot::File(f) => TreeNode::File(f),
        })
        .collect();
    DirNode {
        name: pending.name,
        key: pending.key,
        children,
    }
}

fn normalize_ext(raw: &str) -> String {
    let up = raw.trim().to_uppercase();
    if up.starts_with('.') { up } else { format!(".{up}") }
}
