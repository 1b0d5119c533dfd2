//! Extension-driven choice of decoder, with failures folded into renderables.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::config::PreviewConfig;
use crate::error::{ErrorKind, PreviewError, Result};
use crate::formats::palette::Palette;
use crate::formats::scene::{SceneDecoder, ThreeDoDecoder};
use crate::formats::sprite::{GafDecoder, SpriteDecoder, TafDecoder};
use crate::formats::terrain::{TerrainDecoder, TerrainMap, TextureAtlas, TntDecoder};
use crate::mesh::{MeshBuilder, ModelStats};
use crate::path::EntryPath;
use crate::preview::cache::{DecodeCache, DecodeCacheKey};
use crate::preview::hexdump::hex_view;
use crate::preview::terrain::render_tiled;
use crate::preview::text::{decode_text, is_text_extension};
use crate::preview::{DecodedImage, Renderable, TextKind, decode_raster};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpriteFormat {
    /// Paletted sheets (`.gaf`).
    Paletted,
    /// Self-colored sheets (`.taf`).
    Direct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatKind {
    Audio,
    Mesh,
    Raster,
    Sprite(SpriteFormat),
    Terrain,
    Text,
    Binary,
}

impl FormatKind {
    /// Classify by extension (with or without the dot, any case).
    pub fn for_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "wav" => FormatKind::Audio,
            "3do" => FormatKind::Mesh,
            "pcx" | "bmp" | "png" | "jpg" | "jpeg" => FormatKind::Raster,
            "gaf" => FormatKind::Sprite(SpriteFormat::Paletted),
            "taf" => FormatKind::Sprite(SpriteFormat::Direct),
            "tnt" => FormatKind::Terrain,
            e if is_text_extension(&format!(".{e}")) => FormatKind::Text,
            _ => FormatKind::Binary,
        }
    }

    pub fn for_path(path: &EntryPath) -> Self {
        path.extension()
            .map(|e| Self::for_extension(&e))
            .unwrap_or(FormatKind::Binary)
    }
}

/// A palette together with the name it was selected under.
#[derive(Clone, Debug)]
pub struct NamedPalette {
    pub name: String,
    pub palette: Arc<Palette>,
}

/// Inputs besides the payload that influence decoded pixels.
#[derive(Clone, Default)]
pub struct DecodeParams {
    pub palette: Option<NamedPalette>,
    /// Terrain texture sources, queried in order.
    pub atlases: Vec<Arc<dyn TextureAtlas>>,
    /// Bumped whenever `atlases` changes.
    pub atlas_generation: u64,
}

impl DecodeParams {
    /// Stable identity of these parameters. Two parameter sets that could produce different
    /// pixels never share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let palette = match &self.palette {
            Some(p) => {
                let digest = blake3::hash(&p.palette.as_bytes());
                format!("{}#{}", p.name, &hex::encode(digest.as_bytes())[..16])
            }
            None => "-".to_string(),
        };
        format!("palette={palette};atlases={}", self.atlas_generation)
    }
}

pub struct DecodeDispatcher {
    config: PreviewConfig,
    paletted: Box<dyn SpriteDecoder>,
    direct: Box<dyn SpriteDecoder>,
    terrain: Box<dyn TerrainDecoder>,
    scene: Box<dyn SceneDecoder>,
    cache: Mutex<DecodeCache<DecodedImage>>,
}

impl DecodeDispatcher {
    pub fn new(config: PreviewConfig) -> Self {
        Self {
            cache: Mutex::new(DecodeCache::new(&config)),
            config,
            paletted: Box::new(GafDecoder),
            direct: Box::new(TafDecoder),
            terrain: Box::new(TntDecoder),
            scene: Box::new(ThreeDoDecoder),
        }
    }

    pub fn with_sprite_decoder(mut self, format: SpriteFormat, dec: Box<dyn SpriteDecoder>) -> Self {
        match format {
            SpriteFormat::Paletted => self.paletted = dec,
            SpriteFormat::Direct => self.direct = dec,
        }
        self
    }

    pub fn with_terrain_decoder(mut self, dec: Box<dyn TerrainDecoder>) -> Self {
        self.terrain = dec;
        self
    }

    pub fn with_scene_decoder(mut self, dec: Box<dyn SceneDecoder>) -> Self {
        self.scene = dec;
        self
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    fn with_cache<T>(&self, f: impl FnOnce(&mut DecodeCache<DecodedImage>) -> T) -> T {
        let mut guard = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Cached image for `key`, else `decode` with the cache unlocked so other workers are
    /// never held up by a slow decode.
    fn cached(
        &self,
        key: DecodeCacheKey,
        decode: impl FnOnce() -> Result<DecodedImage>,
    ) -> Result<Arc<DecodedImage>> {
        if let Some(hit) = self.with_cache(|c| c.lookup(&key)) {
            return Ok(hit);
        }
        let fresh = decode()?;
        Ok(self.with_cache(|c| c.insert(key, fresh)))
    }

    pub fn invalidate(&self, path: &EntryPath) -> usize {
        self.with_cache(|c| c.invalidate_path(path.key()))
    }

    pub fn clear_cache(&self) {
        self.with_cache(|c| c.clear());
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        self.with_cache(|c| c.set_enabled(enabled));
    }

    pub fn cache_stats(&self) -> (u64, u64) {
        self.with_cache(|c| c.stats())
    }

    /// Hex view of the payload regardless of its format.
    pub fn hex(&self, path: &EntryPath, bytes: &[u8]) -> Renderable {
        Renderable::Text {
            kind: TextKind::HexDump,
            text: hex_view(path.as_str(), bytes, self.config.hex_dump_limit),
        }
    }

    /// Decode `bytes` as the format implied by `path`'s extension. Never fails: decode
    /// errors come back as `Renderable::Error`, missing configuration as a placeholder.
    pub fn decode(&self, path: &EntryPath, bytes: &[u8], params: &DecodeParams) -> Renderable {
        let kind = FormatKind::for_path(path);
        if bytes.is_empty() {
            return Renderable::placeholder(format!("Empty file: {path}"));
        }
        match self.try_decode(kind, path, bytes, params) {
            Ok(r) => r,
            Err(e) if e.kind() == ErrorKind::ConfigurationMissing => {
                debug!("preview of {path} needs configuration: {e}");
                Renderable::placeholder(format!("{}: {e}", label_of(path)))
            }
            Err(e) => {
                warn!("preview of {path} failed: {e}");
                Renderable::from_error(&e)
            }
        }
    }

    fn try_decode(
        &self,
        kind: FormatKind,
        path: &EntryPath,
        bytes: &[u8],
        params: &DecodeParams,
    ) -> Result<Renderable> {
        match kind {
            FormatKind::Audio => Ok(Renderable::Audio {
                bytes: Arc::from(bytes),
                info: format!("WAV Audio File ({} bytes)", bytes.len()),
            }),
            FormatKind::Text => Ok(Renderable::Text {
                kind: TextKind::Document,
                text: decode_text(bytes, &self.config.text_encoding)?,
            }),
            FormatKind::Binary => Ok(self.hex(path, bytes)),
            FormatKind::Mesh => {
                let graph = self.scene.decode(bytes)?;
                let group = MeshBuilder::build(&graph)?;
                Ok(Renderable::Mesh {
                    group: Arc::new(group),
                    stats: ModelStats::of(&graph)?,
                })
            }
            FormatKind::Sprite(format) => {
                let (dec, label) = match format {
                    SpriteFormat::Paletted => (&self.paletted, "GAF"),
                    SpriteFormat::Direct => (&self.direct, "TAF"),
                };
                let palette = params.palette.as_ref().map(|p| p.palette.as_ref());
                if dec.needs_palette() && palette.is_none() {
                    return Err(PreviewError::ConfigurationMissing(
                        "no palette selected (set the `palette` parameter)".into(),
                    ));
                }
                let sheet = dec.decode(bytes, palette)?;
                Ok(Renderable::Sprite {
                    sheet: Arc::new(sheet),
                    label,
                })
            }
            FormatKind::Raster => {
                let key = DecodeCacheKey::new(path, "raw");
                let label = label_of(path);
                let img = self.cached(key, || {
                    let image = decode_raster(bytes)?;
                    let info = format!("{label} Image: {}x{}", image.width(), image.height());
                    Ok(DecodedImage { image, info })
                })?;
                Ok(Renderable::Image(img))
            }
            FormatKind::Terrain => {
                let Some(named) = &params.palette else {
                    return Err(PreviewError::ConfigurationMissing(
                        "no palette selected (PALETTE.PAL is needed to draw maps)".into(),
                    ));
                };
                let key = DecodeCacheKey::new(path, params.fingerprint());
                let img = self.cached(key, || {
                    let image = match self.terrain.decode(bytes, &named.palette)? {
                        TerrainMap::Raster(img) => img,
                        TerrainMap::Tiled(grid) => render_tiled(&grid, &params.atlases)?,
                    };
                    let info = format!("TNT Map: {}x{}", image.width(), image.height());
                    Ok(DecodedImage { image, info })
                })?;
                Ok(Renderable::Image(img))
            }
        }
    }
}

fn label_of(path: &EntryPath) -> String {
    path.extension()
        .map(|e| e.trim_start_matches('.').to_string())
        .unwrap_or_else(|| "File".to_string())
}
