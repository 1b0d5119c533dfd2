//! ZSoft PCX, 8 bits per plane: 1 plane with a trailing 256-color palette, or 3 planes RGB.

use image::{Rgba, RgbaImage};

use crate::error::{PreviewError, Result};
use crate::formats::Le;

const HEADER_LEN: usize = 128;
const PALETTE_TRAILER: usize = 769;

pub fn decode(bytes: &[u8]) -> Result<RgbaImage> {
    let le = Le::new(bytes, "pcx");
    if le.u8(0)? != 0x0A {
        return Err(PreviewError::decode("pcx: bad manufacturer byte"));
    }
    let rle = le.u8(2)? == 1;
    let bpp = le.u8(3)?;
    let (xmin, ymin) = (le.u16(4)? as u32, le.u16(6)? as u32);
    let (xmax, ymax) = (le.u16(8)? as u32, le.u16(10)? as u32);
    let planes = le.u8(65)? as usize;
    let stride = le.u16(66)? as usize;
    if bpp != 8 || !(planes == 1 || planes == 3) {
        return Err(PreviewError::decode(format!(
            "pcx: unsupported layout ({bpp} bpp, {planes} planes)"
        )));
    }
    if xmax < xmin || ymax < ymin {
        return Err(PreviewError::decode("pcx: inverted window"));
    }
    let (w, h) = (xmax - xmin + 1, ymax - ymin + 1);
    if stride < w as usize {
        return Err(PreviewError::decode("pcx: scanline shorter than image"));
    }

    let body_end = if planes == 1 && bytes.len() >= HEADER_LEN + PALETTE_TRAILER {
        bytes.len() - PALETTE_TRAILER
    } else {
        bytes.len()
    };
    let body = le.bytes(HEADER_LEN, body_end.saturating_sub(HEADER_LEN))?;
    let need = stride * planes * h as usize;
    let raw = if rle { unpack(body, need)? } else { le.bytes(HEADER_LEN, need)?.to_vec() };

    let mut img = RgbaImage::new(w, h);
    if planes == 1 {
        let pal = bytes
            .len()
            .checked_sub(PALETTE_TRAILER)
            .and_then(|at| le.bytes(at, PALETTE_TRAILER).ok())
            .filter(|p| p[0] == 0x0C)
            .ok_or_else(|| PreviewError::decode("pcx: missing 256-color palette"))?;
        for y in 0..h as usize {
            for x in 0..w as usize {
                let i = raw[y * stride + x] as usize;
                let c = &pal[1 + 3 * i..4 + 3 * i];
                img.put_pixel(x as u32, y as u32, Rgba([c[0], c[1], c[2], 255]));
            }
        }
    } else {
        for y in 0..h as usize {
            let line = &raw[y * stride * 3..(y + 1) * stride * 3];
            for x in 0..w as usize {
                img.put_pixel(
                    x as u32,
                    y as u32,
                    Rgba([line[x], line[stride + x], line[2 * stride + x], 255]),
                );
            }
        }
    }
    Ok(img)
}

fn unpack(body: &[u8], need: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(need);
    let mut it = body.iter();
    while out.len() < need {
        let Some(&b) = it.next() else {
            return Err(PreviewError::decode("pcx: image data truncated"));
        };
        if b & 0xC0 == 0xC0 {
            let count = (b & 0x3F) as usize;
            let Some(&v) = it.next() else {
                return Err(PreviewError::decode("pcx: run truncated"));
            };
            out.extend(std::iter::repeat_n(v, count));
        } else {
            out.push(b);
        }
    }
    out.truncate(need);
    Ok(out)
}
