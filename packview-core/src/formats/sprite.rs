//! Multi-frame sprite sheets: GAF (paletted) and TAF (self-colored 16-bit).

use image::{Rgba, RgbaImage};

use crate::error::{PreviewError, Result};
use crate::formats::Le;
use crate::formats::palette::Palette;

const SHEET_VERSION: u32 = 0x0001_0100;
const ENTRY_HEADER: usize = 40;
const MAX_SIDE: u32 = 8192;
/// Pixels any sheet may decode to, whatever its size.
const PIXEL_FLOOR: u64 = 1 << 24;
/// Pixels decoded per payload byte before a sheet is refused.
const PIXELS_PER_BYTE: u64 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Argb4444,
    Argb1555,
}

#[derive(Clone, Debug)]
pub struct SpriteFrame {
    pub image: RgbaImage,
    pub x_offset: i16,
    pub y_offset: i16,
    pub compressed: bool,
    /// Set for self-colored sheets only.
    pub pixel_format: Option<PixelFormat>,
}

#[derive(Clone, Debug)]
pub struct SpriteGroup {
    pub name: String,
    pub frames: Vec<SpriteFrame>,
}

#[derive(Clone, Debug, Default)]
pub struct SpriteSheet {
    pub groups: Vec<SpriteGroup>,
}

impl SpriteSheet {
    pub fn frame_counts(&self) -> Vec<usize> {
        self.groups.iter().map(|g| g.frames.len()).collect()
    }
}

pub trait SpriteDecoder: Send + Sync {
    /// Whether `decode` needs a palette to produce pixels.
    fn needs_palette(&self) -> bool;
    fn decode(&self, bytes: &[u8], palette: Option<&Palette>) -> Result<SpriteSheet>;
}

/// Paletted sheets; every frame's pixels are palette indices.
pub struct GafDecoder;

/// Self-colored sheets; frames carry 16-bit ARGB pixels and a format tag.
pub struct TafDecoder;

impl SpriteDecoder for GafDecoder {
    fn needs_palette(&self) -> bool {
        true
    }

    fn decode(&self, bytes: &[u8], palette: Option<&Palette>) -> Result<SpriteSheet> {
        let palette = palette.ok_or_else(|| {
            PreviewError::ConfigurationMissing("GAF sprites need a palette".into())
        })?;
        read_sheet(bytes, "gaf", |le, fr| paint_indexed(le, fr, palette))
    }
}

impl SpriteDecoder for TafDecoder {
    fn needs_palette(&self) -> bool {
        false
    }

    fn decode(&self, bytes: &[u8], _palette: Option<&Palette>) -> Result<SpriteSheet> {
        read_sheet(bytes, "taf", paint_direct)
    }
}

#[derive(Clone, Copy)]
struct FrameHeader {
    width: u32,
    height: u32,
    x: i16,
    y: i16,
    transparent: u8,
    compressed: u8,
    subframes: u16,
    data: usize,
}

fn frame_header(le: &Le<'_>, at: usize) -> Result<FrameHeader> {
    let h = FrameHeader {
        width: le.u16(at)? as u32,
        height: le.u16(at + 2)? as u32,
        x: le.i16(at + 4)?,
        y: le.i16(at + 6)?,
        transparent: le.u8(at + 8)?,
        compressed: le.u8(at + 9)?,
        subframes: le.u16(at + 10)?,
        data: le.ptr(at + 16)?,
    };
    if h.width > MAX_SIDE || h.height > MAX_SIDE {
        return Err(PreviewError::decode(format!(
            "sprite frame {}x{} too large",
            h.width, h.height
        )));
    }
    Ok(h)
}

/// Running allowance of decoded pixels. Frames and subframes may alias one header, so the
/// output is bounded by payload size instead of by header fields.
struct PixelBudget {
    left: u64,
}

impl PixelBudget {
    fn for_payload(len: usize) -> Self {
        Self {
            left: (len as u64).saturating_mul(PIXELS_PER_BYTE).max(PIXEL_FLOOR),
        }
    }

    fn charge(&mut self, fh: &FrameHeader, what: &str) -> Result<()> {
        let px = fh.width as u64 * fh.height as u64;
        self.left = self.left.checked_sub(px).ok_or_else(|| {
            PreviewError::decode(format!("{what}: decoded pixels exceed payload budget"))
        })?;
        Ok(())
    }
}

type Painter<'p> = dyn Fn(&Le<'_>, &FrameHeader) -> Result<(RgbaImage, Option<PixelFormat>)> + 'p;

fn read_sheet(
    bytes: &[u8],
    what: &'static str,
    paint: impl Fn(&Le<'_>, &FrameHeader) -> Result<(RgbaImage, Option<PixelFormat>)>,
) -> Result<SpriteSheet> {
    let le = Le::new(bytes, what);
    let version = le.u32(0)?;
    if version != SHEET_VERSION {
        return Err(PreviewError::decode(format!(
            "{what}: unknown version {version:#010x}"
        )));
    }
    let entries = le.u32(4)? as usize;
    // every entry needs at least its pointer and header
    if entries.saturating_mul(4 + ENTRY_HEADER) > le.len() {
        return Err(PreviewError::decode(format!("{what}: implausible entry count {entries}")));
    }

    let paint: &Painter<'_> = &paint;
    let mut budget = PixelBudget::for_payload(bytes.len());
    let mut groups = Vec::with_capacity(entries);
    for i in 0..entries {
        let at = le.ptr(12 + 4 * i)?;
        let frames = le.u16(at)? as usize;
        let name = le.cstr(at + 8, 32)?;
        let mut out = Vec::with_capacity(frames);
        for k in 0..frames {
            let fat = le.ptr(at + ENTRY_HEADER + 8 * k)?;
            let fh = frame_header(&le, fat)?;
            budget.charge(&fh, what)?;
            let (image, pixel_format) = if fh.subframes == 0 {
                paint(&le, &fh)?
            } else {
                composite(&le, &fh, paint, &mut budget, what)?
            };
            out.push(SpriteFrame {
                image,
                x_offset: fh.x,
                y_offset: fh.y,
                compressed: pixel_format.is_none() && fh.compressed != 0,
                pixel_format,
            });
        }
        groups.push(SpriteGroup { name, frames: out });
    }
    Ok(SpriteSheet { groups })
}

/// Layered frame: each subframe is drawn relative to the parent's origin.
fn composite(
    le: &Le<'_>,
    parent: &FrameHeader,
    paint: &Painter<'_>,
    budget: &mut PixelBudget,
    what: &str,
) -> Result<(RgbaImage, Option<PixelFormat>)> {
    let mut canvas = RgbaImage::new(parent.width, parent.height);
    let mut format = None;
    for s in 0..parent.subframes as usize {
        let sat = le.ptr(parent.data + 4 * s)?;
        let sub = frame_header(le, sat)?;
        if sub.subframes != 0 {
            return Err(PreviewError::decode("sprite: nested subframes"));
        }
        budget.charge(&sub, what)?;
        let (layer, f) = paint(le, &sub)?;
        format = format.or(f);
        let dx = parent.x as i64 - sub.x as i64;
        let dy = parent.y as i64 - sub.y as i64;
        for (x, y, px) in layer.enumerate_pixels() {
            if px[3] == 0 {
                continue;
            }
            let (tx, ty) = (x as i64 + dx, y as i64 + dy);
            if tx >= 0 && ty >= 0 && tx < parent.width as i64 && ty < parent.height as i64 {
                canvas.put_pixel(tx as u32, ty as u32, *px);
            }
        }
    }
    Ok((canvas, format))
}

fn paint_indexed(
    le: &Le<'_>,
    fh: &FrameHeader,
    palette: &Palette,
) -> Result<(RgbaImage, Option<PixelFormat>)> {
    let (w, h) = (fh.width as usize, fh.height as usize);
    let mut img = RgbaImage::new(fh.width, fh.height);
    let mut put = |x: usize, y: usize, idx: u8| {
        if idx != fh.transparent {
            img.put_pixel(x as u32, y as u32, Rgba(palette.color(idx)));
        }
    };

    if fh.compressed == 0 {
        let px = le.bytes(fh.data, w * h)?;
        for (i, &idx) in px.iter().enumerate() {
            put(i % w.max(1), i / w.max(1), idx);
        }
        return Ok((img, None));
    }

    let mut pos = fh.data;
    for y in 0..h {
        let row_len = le.u16(pos)? as usize;
        let row = le.bytes(pos + 2, row_len)?;
        pos += 2 + row_len;

        let (mut x, mut i) = (0usize, 0usize);
        while i < row.len() && x < w {
            let mask = row[i];
            i += 1;
            if mask & 1 != 0 {
                x += (mask >> 1) as usize;
            } else if mask & 2 != 0 {
                let count = (mask >> 2) as usize + 1;
                let v = *row
                    .get(i)
                    .ok_or_else(|| PreviewError::decode("sprite: run past end of row"))?;
                i += 1;
                for _ in 0..count {
                    if x >= w {
                        break;
                    }
                    put(x, y, v);
                    x += 1;
                }
            } else {
                let count = (mask >> 2) as usize + 1;
                let lit = row
                    .get(i..i + count)
                    .ok_or_else(|| PreviewError::decode("sprite: literal past end of row"))?;
                i += count;
                for &v in lit {
                    if x >= w {
                        break;
                    }
                    put(x, y, v);
                    x += 1;
                }
            }
        }
    }
    Ok((img, None))
}

fn paint_direct(le: &Le<'_>, fh: &FrameHeader) -> Result<(RgbaImage, Option<PixelFormat>)> {
    let format = match fh.compressed {
        4 => PixelFormat::Argb4444,
        5 => PixelFormat::Argb1555,
        other => {
            return Err(PreviewError::decode(format!("taf: unknown pixel format {other}")));
        }
    };
    let (w, h) = (fh.width as usize, fh.height as usize);
    let raw = le.bytes(fh.data, w * h * 2)?;
    let mut img = RgbaImage::new(fh.width, fh.height);
    for (i, c) in raw.chunks_exact(2).enumerate() {
        let v = u16::from_le_bytes([c[0], c[1]]);
        img.put_pixel((i % w) as u32, (i / w) as u32, Rgba(expand(v, format)));
    }
    Ok((img, Some(format)))
}

fn expand(v: u16, format: PixelFormat) -> [u8; 4] {
    match format {
        PixelFormat::Argb4444 => {
            let n = |s: u16| (((v >> s) & 0xF) as u8) * 17;
            [n(8), n(4), n(0), n(12)]
        }
        PixelFormat::Argb1555 => {
            let n = |s: u16| ((((v >> s) & 0x1F) as u32 * 255 + 15) / 31) as u8;
            let a = if v & 0x8000 != 0 { 255 } else { 0 };
            [n(10), n(5), n(0), a]
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a sheet: one entry per `(name, frames)`, each frame `(w, h, compressed, data)`.
    pub(crate) fn sheet_bytes(groups: &[(&str, Vec<(u16, u16, u8, Vec<u8>)>)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&SHEET_VERSION.to_le_bytes());
        out.extend_from_slice(&(groups.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        let ptr_base = out.len();
        out.resize(ptr_base + 4 * groups.len(), 0);

        for (gi, (name, frames)) in groups.iter().enumerate() {
            let at = out.len() as u32;
            out[ptr_base + 4 * gi..ptr_base + 4 * gi + 4].copy_from_slice(&at.to_le_bytes());
            out.extend_from_slice(&(frames.len() as u16).to_le_bytes());
            out.extend_from_slice(&1u16.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            let mut nm = [0u8; 32];
            nm[..name.len()].copy_from_slice(name.as_bytes());
            out.extend_from_slice(&nm);
            let table = out.len();
            out.resize(table + 8 * frames.len(), 0);

            for (k, (w, h, comp, data)) in frames.iter().enumerate() {
                let fat = out.len() as u32;
                out[table + 8 * k..table + 8 * k + 4].copy_from_slice(&fat.to_le_bytes());
                let data_at = fat + 24;
                out.extend_from_slice(&w.to_le_bytes());
                out.extend_from_slice(&h.to_le_bytes());
                out.extend_from_slice(&3i16.to_le_bytes());
                out.extend_from_slice(&(-2i16).to_le_bytes());
                out.push(9); // transparent index
                out.push(*comp);
                out.extend_from_slice(&0u16.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
                out.extend_from_slice(&data_at.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
                out.extend_from_slice(data);
            }
        }
        out
    }

    fn palette() -> Palette {
        Palette::from_rgba((0..256).map(|i| [i as u8, 0, 0, 255]).collect()).unwrap()
    }

    #[test]
    fn gaf_uncompressed_and_transparency() {
        let bytes = sheet_bytes(&[("arm", vec![(2, 2, 0, vec![1, 9, 3, 4])])]);
        let sheet = GafDecoder.decode(&bytes, Some(&palette())).unwrap();
        assert_eq!(sheet.groups[0].name, "arm");
        let f = &sheet.groups[0].frames[0];
        assert_eq!((f.x_offset, f.y_offset, f.compressed), (3, -2, false));
        assert_eq!(f.image.get_pixel(0, 0).0, [1, 0, 0, 255]);
        assert_eq!(f.image.get_pixel(1, 0).0[3], 0);
        assert_eq!(f.image.get_pixel(1, 1).0, [4, 0, 0, 255]);
    }

    #[test]
    fn gaf_row_compression() {
        // row: skip 1, run of 2 x value 7, literal [5]
        let row = vec![0b0000_0011, 0b0000_0110, 7, 0b0000_0000, 5];
        let mut data = (row.len() as u16).to_le_bytes().to_vec();
        data.extend_from_slice(&row);
        let bytes = sheet_bytes(&[("c", vec![(4, 1, 1, data)])]);
        let sheet = GafDecoder.decode(&bytes, Some(&palette())).unwrap();
        let img = &sheet.groups[0].frames[0].image;
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(1, 0).0, [7, 0, 0, 255]);
        assert_eq!(img.get_pixel(2, 0).0, [7, 0, 0, 255]);
        assert_eq!(img.get_pixel(3, 0).0, [5, 0, 0, 255]);
        assert!(sheet.groups[0].frames[0].compressed);
    }

    #[test]
    fn gaf_without_palette_is_configuration_missing() {
        let bytes = sheet_bytes(&[("a", vec![])]);
        let err = GafDecoder.decode(&bytes, None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigurationMissing);
    }

    #[test]
    fn taf_expands_16_bit_pixels() {
        let px: u16 = 0xF0F0; // a=F r=0 g=F b=0
        let bytes = sheet_bytes(&[("t", vec![(1, 1, 4, px.to_le_bytes().to_vec())])]);
        let sheet = TafDecoder.decode(&bytes, None).unwrap();
        let f = &sheet.groups[0].frames[0];
        assert_eq!(f.pixel_format, Some(PixelFormat::Argb4444));
        assert_eq!(f.image.get_pixel(0, 0).0, [0, 255, 0, 255]);
    }

    #[test]
    fn sheets_cannot_decode_past_their_pixel_budget() {
        // empty compressed rows: 4096x2048 pixels from 4 KB each
        let blank = || (4096u16, 2048u16, 1u8, vec![0u8; 2 * 2048]);
        let two = sheet_bytes(&[("big", vec![blank(), blank()])]);
        assert!(GafDecoder.decode(&two, Some(&palette())).is_ok());

        let three = sheet_bytes(&[("big", vec![blank(), blank(), blank()])]);
        let err = GafDecoder.decode(&three, Some(&palette())).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DecodeFailure);
    }

    #[test]
    fn truncated_sheet_is_decode_failure() {
        let mut bytes = sheet_bytes(&[("a", vec![(8, 8, 0, vec![0; 64])])]);
        bytes.truncate(bytes.len() - 10);
        assert!(GafDecoder.decode(&bytes, Some(&palette())).is_err());
        assert!(GafDecoder.decode(&[1, 2, 3], Some(&palette())).is_err());
    }
}
