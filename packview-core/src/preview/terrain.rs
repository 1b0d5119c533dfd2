//! Rendering of tiled terrain grids from texture atlases.

use std::collections::HashMap;
use std::sync::Arc;

use image::{GenericImageView, RgbaImage};
use tracing::{debug, warn};

use crate::error::{ErrorKind, PreviewError, Result};
use crate::formats::terrain::{ATLAS, MAX_UNITS, TILE, TerrainGrid, TextureAtlas};
use crate::preview::decode_raster;

/// Compose the grid onto a `width_units*32` by `height_units*32` canvas. Each mapped unit
/// copies one 32x32 block out of its 256x256 atlas; the atlas is looked up in `atlases`
/// order, first hit wins. Units whose texture is nowhere to be found stay blank.
pub fn render_tiled(grid: &TerrainGrid, atlases: &[Arc<dyn TextureAtlas>]) -> Result<RgbaImage> {
    let (wu, hu) = (grid.width_units, grid.height_units);
    if wu == 0 || hu == 0 || wu > MAX_UNITS || hu > MAX_UNITS {
        return Err(PreviewError::decode(format!("terrain: implausible grid {wu}x{hu}")));
    }
    if grid.tiles.len() != (wu * hu) as usize {
        return Err(PreviewError::decode(format!(
            "terrain: grid {wu}x{hu} but {} tile records",
            grid.tiles.len()
        )));
    }

    let mut canvas = RgbaImage::new(wu * TILE, hu * TILE);
    let mut textures: HashMap<u32, Option<RgbaImage>> = HashMap::new();
    let mut skipped = 0usize;

    for (i, tile) in grid.tiles.iter().enumerate() {
        let Some(t) = tile else { continue };
        let tex = textures
            .entry(t.texture_id)
            .or_insert_with(|| load_texture(t.texture_id, atlases));
        let Some(tex) = tex else {
            skipped += 1;
            continue;
        };
        let (sx, sy) = (t.u as u32 * TILE, t.v as u32 * TILE);
        if sx + TILE > tex.width().min(ATLAS) || sy + TILE > tex.height().min(ATLAS) {
            skipped += 1;
            continue;
        }
        let (dx, dy) = ((i as u32 % wu) * TILE, (i as u32 / wu) * TILE);
        let block = tex.view(sx, sy, TILE, TILE);
        for (x, y, px) in block.pixels() {
            canvas.put_pixel(dx + x, dy + y, px);
        }
    }
    debug!(textures = textures.len(), skipped, "terrain grid rendered");
    Ok(canvas)
}

fn load_texture(id: u32, atlases: &[Arc<dyn TextureAtlas>]) -> Option<RgbaImage> {
    for atlas in atlases {
        match atlas.extract_by_id(id) {
            Ok(bytes) => match decode_raster(&bytes) {
                Ok(img) => return Some(img),
                Err(e) => {
                    warn!("terrain: texture {id} unreadable: {e}");
                    return None;
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                warn!("terrain: texture {id} lookup failed: {e}");
                continue;
            }
        }
    }
    None
}
