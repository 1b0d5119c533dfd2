use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Relative path of an entry inside an archive.
///
/// Both `/` and `\` separate segments. Identity is case-insensitive: two paths that differ
/// only in letter case or separator style compare equal and hash the same. The original
/// spelling is kept for display.
#[derive(Clone, Debug)]
pub struct EntryPath {
    display: String,
    key: String,
}

pub(crate) fn is_sep(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Canonical comparison key for a path or path prefix.
pub fn canonical_key(raw: &str) -> String {
    raw.split(is_sep)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join("/")
}

impl EntryPath {
    pub fn new(raw: &str) -> Self {
        let display = raw.trim_matches(is_sep).to_string();
        let key = canonical_key(&display);
        Self { display, key }
    }

    /// Path of a file dropped onto `folder` (empty folder = archive root).
    pub fn join(folder: &str, name: &str) -> Self {
        let folder = folder.trim_matches(is_sep);
        let name = name.trim_matches(is_sep);
        if folder.is_empty() {
            Self::new(name)
        } else {
            Self::new(&format!("{folder}\\{name}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    /// Case-insensitive ordering key for listings: segments uppercased and joined with `\`,
    /// so `_` sorts after letters and a separator after digits.
    pub fn sort_key(&self) -> String {
        self.segments()
            .map(str::to_uppercase)
            .collect::<Vec<_>>()
            .join("\\")
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.display.split(is_sep).filter(|s| !s.is_empty())
    }

    pub fn file_name(&self) -> &str {
        self.segments().last().unwrap_or("")
    }

    /// Uppercased extension including the leading dot, e.g. `.TDF`.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        let dot = name.rfind('.')?;
        if dot + 1 == name.len() {
            return None;
        }
        Some(name[dot..].to_uppercase())
    }

    /// True when this path lies strictly below the directory whose canonical key is `dir_key`.
    pub fn is_under(&self, dir_key: &str) -> bool {
        if dir_key.is_empty() {
            return !self.key.is_empty();
        }
        self.key.len() > dir_key.len()
            && self.key.starts_with(dir_key)
            && self.key.as_bytes()[dir_key.len()] == b'/'
    }

    /// Canonical keys of every proper ancestor directory, outermost first.
    pub fn ancestor_keys(&self) -> Vec<&str> {
        self.key
            .match_indices('/')
            .map(|(i, _)| &self.key[..i])
            .collect()
    }

    /// True when the path contains a segment that would climb out of an extraction root.
    pub fn is_unsafe(&self) -> bool {
        self.segments().any(|s| s == ".." || s.contains(':'))
    }
}

impl PartialEq for EntryPath {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for EntryPath {}

impl Hash for EntryPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for EntryPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntryPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl From<&str> for EntryPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_case_and_separator_style() {
        let a = EntryPath::new("Units\\ARMCOM.FBI");
        let b = EntryPath::new("units/armcom.fbi");
        assert_eq!(a, b);
        assert_eq!(a.key(), "units/armcom.fbi");
        assert_eq!(a.as_str(), "Units\\ARMCOM.FBI");
    }

    #[test]
    fn extension_is_uppercased_with_dot() {
        assert_eq!(EntryPath::new("a/b.tdf").extension().as_deref(), Some(".TDF"));
        assert_eq!(EntryPath::new("a/readme").extension(), None);
        assert_eq!(EntryPath::new("a/trailing.").extension(), None);
        assert_eq!(EntryPath::new("dir.v2/file").extension(), None);
    }

    #[test]
    fn join_uses_folder_prefix() {
        assert_eq!(EntryPath::join("", "x.txt").key(), "x.txt");
        assert_eq!(EntryPath::join("Anims\\", "a.gaf").key(), "anims/a.gaf");
    }

    #[test]
    fn ancestors_and_containment() {
        let p = EntryPath::new("a/B/c.txt");
        assert_eq!(p.ancestor_keys(), vec!["a", "a/b"]);
        assert!(p.is_under("a"));
        assert!(p.is_under("a/b"));
        assert!(!p.is_under("a/b/c.txt"));
        assert!(!EntryPath::new("ab/c").is_under("a"));
    }
}
