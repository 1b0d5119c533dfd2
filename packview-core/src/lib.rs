#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod error;
pub mod path;

pub mod codec;

pub mod container {
    pub mod manifest;
    pub mod superblock;
}

pub mod pack {
    pub mod writer;
}

pub mod read {
    pub mod opened;
}

pub mod mem;
pub mod repo;
pub mod repo_factory;
pub mod repo_fs;

pub mod overlay;
pub mod sidecar;
pub mod tree;

pub mod formats;
pub mod mesh;
pub mod preview;
pub mod sprite;

pub mod coordinator;
pub mod session;

// Re-exports: stable API surface
pub use config::{PreviewConfig, ViewMode};
pub use domain::{EffectiveEntry, EntrySource};
pub use error::{ErrorKind, PreviewError, Result};
pub use overlay::{EntryStore, SaveReport};
pub use pack::writer::{PackOptions, PackWriter, pack};
pub use path::EntryPath;
pub use preview::{Pane, Renderable, TextKind};
pub use session::{ExtractReport, PreviewSession};
pub use sprite::{Direction, SpriteNavigator};
pub use tree::{TreeBuilder, TreeNode};
