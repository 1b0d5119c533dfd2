//! Per-entry payload codecs of the container.

use std::io::Read;

use crate::error::{PreviewError, Result};

/// zstd level used when packing.
pub const ZSTD_LEVEL: i32 = 3;

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CodecId {
    Store = 0,
    Zstd = 1,
}

impl TryFrom<u8> for CodecId {
    type Error = PreviewError;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(CodecId::Store),
            1 => Ok(CodecId::Zstd),
            other => Err(PreviewError::Format(format!("unknown codec {other}"))),
        }
    }
}

impl CodecId {
    pub fn encode(self, plain: &[u8]) -> Result<Vec<u8>> {
        match self {
            CodecId::Store => Ok(plain.to_vec()),
            CodecId::Zstd => Ok(zstd::bulk::compress(plain, ZSTD_LEVEL)?),
        }
    }

    /// Decode a payload whose plain size is declared by the manifest.
    ///
    /// The declared size only caps the output; memory grows with what the stream actually
    /// yields. At most one byte past `plain_len` is produced so callers can detect overruns.
    pub fn decode(self, payload: &[u8], plain_len: u64) -> Result<Vec<u8>> {
        match self {
            CodecId::Store => Ok(payload.to_vec()),
            CodecId::Zstd => {
                let mut out = Vec::new();
                zstd::stream::read::Decoder::with_buffer(payload)?
                    .take(plain_len.saturating_add(1))
                    .read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_payload_restores_exactly() {
        let plain = b"[UNITINFO]\r\n{\r\n\tName=ARMCOM;\r\n}\r\n".repeat(20);
        let packed = CodecId::Zstd.encode(&plain).unwrap();
        assert!(packed.len() < plain.len());
        assert_eq!(CodecId::Zstd.decode(&packed, plain.len() as u64).unwrap(), plain);
    }

    #[test]
    fn declared_size_only_caps_output() {
        let packed = CodecId::Zstd.encode(b"hello").unwrap();
        assert_eq!(CodecId::Zstd.decode(&packed, 1 << 62).unwrap(), b"hello");
        // one byte of overrun is surfaced, the rest is never produced
        assert_eq!(CodecId::Zstd.decode(&packed, 2).unwrap(), b"hel");
    }

    #[test]
    fn unknown_codec_byte_is_format_error() {
        assert!(matches!(CodecId::try_from(7), Err(PreviewError::Format(_))));
    }
}
