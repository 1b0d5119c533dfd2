//! Payload format collaborators. Each format sits behind a small trait so the preview
//! pipeline can be driven with other parsers; the built-in implementations cover the
//! Total Annihilation family of formats.

pub mod palette;
pub mod pcx;
pub mod scene;
pub mod sprite;
pub mod terrain;

use crate::error::{PreviewError, Result};

/// Bounds-checked little-endian reads over a payload.
#[derive(Clone, Copy)]
pub(crate) struct Le<'a> {
    buf: &'a [u8],
    what: &'static str,
}

impl<'a> Le<'a> {
    pub(crate) fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, what }
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn bytes(&self, off: usize, len: usize) -> Result<&'a [u8]> {
        off.checked_add(len)
            .and_then(|end| self.buf.get(off..end))
            .ok_or_else(|| {
                PreviewError::decode(format!(
                    "{}: truncated at offset {off} (+{len}, have {})",
                    self.what,
                    self.buf.len()
                ))
            })
    }

    pub(crate) fn u8(&self, off: usize) -> Result<u8> {
        Ok(self.bytes(off, 1)?[0])
    }

    pub(crate) fn u16(&self, off: usize) -> Result<u16> {
        let b = self.bytes(off, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn i16(&self, off: usize) -> Result<i16> {
        Ok(self.u16(off)? as i16)
    }

    pub(crate) fn u32(&self, off: usize) -> Result<u32> {
        let b = self.bytes(off, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn i32(&self, off: usize) -> Result<i32> {
        Ok(self.u32(off)? as i32)
    }

    /// Offset field: a u32 that must point inside the payload.
    pub(crate) fn ptr(&self, off: usize) -> Result<usize> {
        let p = self.u32(off)? as usize;
        if p > self.buf.len() {
            return Err(PreviewError::decode(format!(
                "{}: pointer {p:#x} at {off:#x} beyond end",
                self.what
            )));
        }
        Ok(p)
    }

    /// NUL-terminated string starting at `off`, at most `max` bytes.
    pub(crate) fn cstr(&self, off: usize, max: usize) -> Result<String> {
        let avail = self.buf.len().saturating_sub(off).min(max);
        let raw = self.bytes(off, avail)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_bounds_checked() {
        let le = Le::new(&[1, 0, 0, 0, b'a', b'b', 0, b'c'], "t");
        assert_eq!(le.u32(0).unwrap(), 1);
        assert_eq!(le.cstr(4, 32).unwrap(), "ab");
        assert!(le.u32(6).is_err());
        assert!(le.bytes(usize::MAX, 2).is_err());
        assert_eq!(le.ptr(0).unwrap(), 1);
    }
}
