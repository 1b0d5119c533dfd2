//! Turning entry payloads into something a front-end can show.

pub mod cache;
pub mod dispatch;
pub mod hexdump;
pub mod terrain;
pub mod text;

use std::sync::Arc;

use image::RgbaImage;

use crate::error::{ErrorKind, PreviewError, Result};
use crate::formats::sprite::SpriteSheet;
use crate::mesh::{MeshGroup, ModelStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextKind {
    /// Decoded text content of the entry.
    Document,
    HexDump,
    /// Explanation shown instead of content (missing palette, empty payload, ...).
    Placeholder,
}

/// Decoded raster plus its info bar line.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub image: RgbaImage,
    pub info: String,
}

#[derive(Clone, Debug)]
pub enum Renderable {
    Text { kind: TextKind, text: String },
    Image(Arc<DecodedImage>),
    /// `label` names the sheet format in info lines (`GAF`, `TAF`).
    Sprite { sheet: Arc<SpriteSheet>, label: &'static str },
    Audio { bytes: Arc<[u8]>, info: String },
    Mesh { group: Arc<MeshGroup>, stats: ModelStats },
    Error { kind: ErrorKind, message: String },
}

/// Which content area a renderable occupies. Exactly one is visible at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pane {
    Text,
    Image,
    Audio,
    Model,
}

impl Renderable {
    pub fn pane(&self) -> Pane {
        match self {
            Renderable::Text { .. } | Renderable::Error { .. } => Pane::Text,
            Renderable::Image(_) | Renderable::Sprite { .. } => Pane::Image,
            Renderable::Audio { .. } => Pane::Audio,
            Renderable::Mesh { .. } => Pane::Model,
        }
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Renderable::Text {
            kind: TextKind::Placeholder,
            text: text.into(),
        }
    }

    pub fn from_error(err: &PreviewError) -> Self {
        Renderable::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Info bar line, where the renderable carries one. Sprites depend on navigation state
    /// and are described by `SpriteNavigator::info`.
    pub fn info(&self) -> Option<String> {
        match self {
            Renderable::Image(img) => Some(img.info.clone()),
            Renderable::Audio { info, .. } => Some(info.clone()),
            Renderable::Mesh { stats, .. } => Some(stats.info()),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Renderable::Error { .. })
    }
}

/// Decode a standalone image file (PCX sniffed by its manufacturer byte, anything else
/// through `image`).
pub(crate) fn decode_raster(bytes: &[u8]) -> Result<RgbaImage> {
    if bytes.first() == Some(&0x0A) {
        return crate::formats::pcx::decode(bytes);
    }
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}
