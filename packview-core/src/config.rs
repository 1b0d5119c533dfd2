use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMode {
    #[default]
    Preview,
    Hex,
}

/// Preview settings handed to the dispatcher, the decode cache and the session at
/// construction time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Memoize decoded images keyed by path and decode parameters.
    pub cache_enabled: bool,
    /// `None` keeps every decoded image until invalidated; `Some(n)` evicts least recently used.
    pub cache_capacity: Option<NonZeroUsize>,
    pub default_view: ViewMode,
    /// Bytes shown by the hex dump before the "more bytes not shown" notice.
    pub hex_dump_limit: usize,
    /// Code page label for text formats; must name a single-byte `encoding_rs` encoding.
    pub text_encoding: String,
    /// Entries per batch when the tree is assembled incrementally.
    pub tree_batch_size: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_capacity: None,
            default_view: ViewMode::Preview,
            hex_dump_limit: 16 * 1024,
            text_encoding: "windows-1252".to_string(),
            tree_batch_size: 2048,
        }
    }
}
