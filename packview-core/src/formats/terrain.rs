//! Terrain maps and the texture atlases tiled maps draw from.

use std::collections::HashMap;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::error::{PreviewError, Result};
use crate::formats::Le;
use crate::formats::palette::Palette;
use crate::path::EntryPath;
use crate::repo::ArchiveRepo;

/// Side of one terrain tile in pixels.
pub const TILE: u32 = 32;
/// Side of a texture atlas in pixels.
pub const ATLAS: u32 = 256;

const TNT_VERSION: u32 = 0x2000;
/// Maps that reference atlas blocks instead of carrying their own tile graphics.
const TNT_TILED_VERSION: u32 = 0x4000;
const MAX_SIDE: u64 = 16384;
/// Tiled maps: side limit in 32-pixel units.
pub const MAX_UNITS: u32 = 512;
/// Size of one tile record: texture id, block column, block row, padding.
const TILE_RECORD: usize = 8;

/// Which 32x32 block of which atlas a map unit shows. `u`/`v` are block column/row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRef {
    pub texture_id: u32,
    pub u: u8,
    pub v: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerrainGrid {
    pub width_units: u32,
    pub height_units: u32,
    /// Row-major, `width_units * height_units` long. `None` marks an unmapped unit.
    pub tiles: Vec<Option<TileRef>>,
}

#[derive(Clone, Debug)]
pub enum TerrainMap {
    Raster(RgbaImage),
    Tiled(TerrainGrid),
}

pub trait TerrainDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], palette: &Palette) -> Result<TerrainMap>;
}

/// Source of atlas images by numeric texture id.
pub trait TextureAtlas: Send + Sync {
    /// Encoded image bytes; `PreviewError::NotFound` when this atlas lacks `id`.
    fn extract_by_id(&self, id: u32) -> Result<Vec<u8>>;
}

/// TNT maps in both layouts.
///
/// * `0x2000`: a grid of 32x32 tiles, each tile a block of palette indices stored in the
///   file. Decodes to [`TerrainMap::Raster`].
/// * `0x4000`: width and height in 32-pixel units, a u16 tile index per unit and a table of
///   tile records naming an atlas texture id and block. Indices past the table leave the
///   unit unmapped. Decodes to [`TerrainMap::Tiled`].
pub struct TntDecoder;

impl TerrainDecoder for TntDecoder {
    fn decode(&self, bytes: &[u8], palette: &Palette) -> Result<TerrainMap> {
        let le = Le::new(bytes, "tnt");
        match le.u32(0)? {
            TNT_VERSION => decode_raster_tnt(le, palette),
            TNT_TILED_VERSION => decode_tiled_tnt(le),
            other => Err(PreviewError::decode(format!("tnt: unsupported version {other:#x}"))),
        }
    }
}

fn decode_tiled_tnt(le: Le<'_>) -> Result<TerrainMap> {
    let (wu, hu) = (le.u32(4)?, le.u32(8)?);
    if wu == 0 || hu == 0 || wu > MAX_UNITS || hu > MAX_UNITS {
        return Err(PreviewError::decode(format!("tnt: implausible grid {wu}x{hu}")));
    }
    let map_data = le.ptr(12)?;
    let records = le.u32(16)? as usize;
    let table = le.ptr(20)?;

    let units = (wu * hu) as usize;
    let index = le.bytes(map_data, units * 2)?;
    let table = le.bytes(table, records.saturating_mul(TILE_RECORD))?;
    let refs: Vec<TileRef> = table
        .chunks_exact(TILE_RECORD)
        .map(|r| TileRef {
            texture_id: u32::from_le_bytes([r[0], r[1], r[2], r[3]]),
            u: r[4],
            v: r[5],
        })
        .collect();

    let tiles: Vec<Option<TileRef>> = index
        .chunks_exact(2)
        .map(|b| refs.get(u16::from_le_bytes([b[0], b[1]]) as usize).copied())
        .collect();
    let mapped = tiles.iter().filter(|t| t.is_some()).count();
    debug!(width_units = wu, height_units = hu, records, mapped, "tiled tnt decoded");
    Ok(TerrainMap::Tiled(TerrainGrid {
        width_units: wu,
        height_units: hu,
        tiles,
    }))
}

fn decode_raster_tnt(le: Le<'_>, palette: &Palette) -> Result<TerrainMap> {
    // width/height count half-tiles
    let (w_half, h_half) = (le.u32(4)? as u64, le.u32(8)? as u64);
    let map_data = le.ptr(12)?;
    let tile_gfx = le.ptr(20)?;
    let tiles = le.u32(24)? as usize;

    let (cols, rows) = (w_half / 2, h_half / 2);
    let (pw, ph) = (cols * TILE as u64, rows * TILE as u64);
    if pw == 0 || ph == 0 || pw > MAX_SIDE || ph > MAX_SIDE {
        return Err(PreviewError::decode(format!("tnt: implausible map size {pw}x{ph}")));
    }
    let (cols, rows) = (cols as usize, rows as usize);
    let gfx = le.bytes(tile_gfx, tiles.saturating_mul((TILE * TILE) as usize))?;

    let mut img = RgbaImage::new(pw as u32, ph as u32);
    for ty in 0..rows {
        for tx in 0..cols {
            let idx = le.u16(map_data + 2 * (ty * cols + tx))? as usize;
            if idx >= tiles {
                continue;
            }
            let block = &gfx[idx * 1024..(idx + 1) * 1024];
            for (i, &c) in block.iter().enumerate() {
                let x = (tx as u32) * TILE + (i as u32 % TILE);
                let y = (ty as u32) * TILE + (i as u32 / TILE);
                img.put_pixel(x, y, Rgba(palette.color(c)));
            }
        }
    }
    debug!(width = pw, height = ph, tiles, "tnt decoded");
    Ok(TerrainMap::Raster(img))
}

/// Texture atlas backed by an archive whose entries are named by numeric id
/// (`textures/1234.jpg` serves id 1234).
pub struct ArchiveAtlas {
    repo: Arc<dyn ArchiveRepo>,
    by_id: HashMap<u32, String>,
}

impl ArchiveAtlas {
    pub fn new(repo: Arc<dyn ArchiveRepo>) -> Result<Self> {
        let mut by_id = HashMap::new();
        for row in repo.list_files()? {
            let path = EntryPath::new(&row.path);
            let name = path.file_name();
            let stem = name.split('.').next().unwrap_or(name);
            if let Ok(id) = stem.parse::<u32>() {
                by_id.entry(id).or_insert(row.path);
            }
        }
        debug!(textures = by_id.len(), "atlas indexed");
        Ok(Self { repo, by_id })
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl TextureAtlas for ArchiveAtlas {
    fn extract_by_id(&self, id: u32) -> Result<Vec<u8>> {
        match self.by_id.get(&id) {
            Some(p) => self.repo.extract(p),
            None => Err(PreviewError::NotFound(format!("texture {id}"))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mem::MemArchive;

    /// 2x1 tile map; tile 0 filled with index 5, map refers to tiles [0, 7(out of range)].
    pub(crate) fn tiny_tnt() -> Vec<u8> {
        let mut b = vec![0u8; 64];
        b[0..4].copy_from_slice(&TNT_VERSION.to_le_bytes());
        b[4..8].copy_from_slice(&4u32.to_le_bytes());
        b[8..12].copy_from_slice(&2u32.to_le_bytes());
        b[12..16].copy_from_slice(&64u32.to_le_bytes());
        b[20..24].copy_from_slice(&68u32.to_le_bytes());
        b[24..28].copy_from_slice(&1u32.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&7u16.to_le_bytes());
        b.extend_from_slice(&[5u8; 1024]);
        b
    }

    #[test]
    fn tnt_renders_tiles_and_skips_unknown() {
        let pal = Palette::from_rgba((0..256).map(|i| [i as u8, 1, 2, 255]).collect()).unwrap();
        let TerrainMap::Raster(img) = TntDecoder.decode(&tiny_tnt(), &pal).unwrap() else {
            panic!("expected raster");
        };
        assert_eq!(img.dimensions(), (64, 32));
        assert_eq!(img.get_pixel(31, 31).0, [5, 1, 2, 255]);
        assert_eq!(img.get_pixel(40, 0).0, [0, 0, 0, 0]);
    }

    /// 2x1 unit tiled map: unit 0 shows block (2, 3) of texture 17, unit 1 points past the
    /// two-record table.
    pub(crate) fn tiny_tiled_tnt(texture_id: u32) -> Vec<u8> {
        let mut b = vec![0u8; 24];
        b[0..4].copy_from_slice(&TNT_TILED_VERSION.to_le_bytes());
        b[4..8].copy_from_slice(&2u32.to_le_bytes());
        b[8..12].copy_from_slice(&1u32.to_le_bytes());
        b[12..16].copy_from_slice(&24u32.to_le_bytes());
        b[16..20].copy_from_slice(&2u32.to_le_bytes());
        b[20..24].copy_from_slice(&28u32.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&5u16.to_le_bytes());
        for (id, u, v) in [(texture_id, 2u8, 3u8), (99, 0, 0)] {
            b.extend_from_slice(&id.to_le_bytes());
            b.extend_from_slice(&[u, v, 0, 0]);
        }
        b
    }

    fn flat_palette() -> Palette {
        Palette::from_rgba(vec![[0, 0, 0, 255]; 256]).unwrap()
    }

    #[test]
    fn tnt_rejects_other_versions() {
        let mut b = tiny_tnt();
        b[0] = 0;
        assert!(TntDecoder.decode(&b, &flat_palette()).is_err());
    }

    #[test]
    fn tiled_tnt_yields_unit_grid() {
        let TerrainMap::Tiled(grid) = TntDecoder.decode(&tiny_tiled_tnt(17), &flat_palette()).unwrap()
        else {
            panic!("expected grid");
        };
        assert_eq!((grid.width_units, grid.height_units), (2, 1));
        assert_eq!(grid.tiles, vec![Some(TileRef { texture_id: 17, u: 2, v: 3 }), None]);
    }

    #[test]
    fn tiled_tnt_checks_bounds() {
        let mut b = tiny_tiled_tnt(17);
        // record table claims more entries than the payload holds
        b[16..20].copy_from_slice(&1000u32.to_le_bytes());
        assert!(TntDecoder.decode(&b, &flat_palette()).is_err());

        let mut b = tiny_tiled_tnt(17);
        b[4..8].copy_from_slice(&(MAX_UNITS + 1).to_le_bytes());
        assert!(TntDecoder.decode(&b, &flat_palette()).is_err());
    }

    #[test]
    fn archive_atlas_indexes_numeric_stems() {
        let repo = Arc::new(MemArchive::new([
            ("textures\\17.jpg", vec![1u8]),
            ("textures/readme.txt", vec![2u8]),
            ("other/0042.pcx", vec![3u8]),
        ]));
        let atlas = ArchiveAtlas::new(repo).unwrap();
        assert_eq!(atlas.len(), 2);
        assert_eq!(atlas.extract_by_id(17).unwrap(), vec![1u8]);
        assert_eq!(atlas.extract_by_id(42).unwrap(), vec![3u8]);
        assert_eq!(
            atlas.extract_by_id(5).unwrap_err().kind(),
            crate::error::ErrorKind::NotFound
        );
    }
}
