use crate::error::{PreviewError, Result};

pub const PALETTE_COLORS: usize = 256;

/// Fixed 256-entry color lookup table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 4]>,
}

impl Palette {
    pub fn from_rgba(colors: Vec<[u8; 4]>) -> Result<Self> {
        if colors.len() != PALETTE_COLORS {
            return Err(PreviewError::decode(format!(
                "palette: expected {PALETTE_COLORS} colors, got {}",
                colors.len()
            )));
        }
        Ok(Self { colors })
    }

    pub fn color(&self, index: u8) -> [u8; 4] {
        self.colors[index as usize]
    }

    /// Raw bytes identifying this palette's colors (used in decode cache fingerprints).
    pub fn as_bytes(&self) -> Vec<u8> {
        self.colors.iter().flatten().copied().collect()
    }
}

pub trait PaletteLoader: Send + Sync {
    fn load(&self, bytes: &[u8]) -> Result<Palette>;
}

/// Plain palette files: 1024 bytes of R,G,B,pad (the `PALETTE.PAL` layout) or 768 bytes of
/// R,G,B. Loaded colors are always opaque.
pub struct RawPaletteLoader;

impl PaletteLoader for RawPaletteLoader {
    fn load(&self, bytes: &[u8]) -> Result<Palette> {
        let stride = match bytes.len() {
            1024 => 4,
            768 => 3,
            n => {
                return Err(PreviewError::decode(format!(
                    "palette: unsupported size {n} (want 1024 or 768 bytes)"
                )));
            }
        };
        let colors = bytes
            .chunks_exact(stride)
            .map(|c| [c[0], c[1], c[2], 255])
            .collect();
        Palette::from_rgba(colors)
    }
}
