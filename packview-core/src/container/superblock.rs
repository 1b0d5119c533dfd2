use crate::error::{PreviewError, Result};

pub const MAGIC: &[u8; 6] = b"PVPACK";
pub const VERSION: u16 = 1;
/// magic, version, manifest length, data offset
pub const HEADER_LEN: u64 = 6 + 2 + 8 + 8;

/// Fixed-size container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub version: u16,
    /// Byte length of the CBOR manifest that follows the header.
    pub manifest_len: u64,
    /// Absolute offset of the data section.
    pub data_off: u64,
}

impl Superblock {
    pub fn for_manifest(manifest_len: u64) -> Self {
        Self {
            version: VERSION,
            manifest_len,
            data_off: HEADER_LEN + manifest_len,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN as usize] {
        let mut out = [0u8; HEADER_LEN as usize];
        out[..6].copy_from_slice(MAGIC);
        out[6..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..16].copy_from_slice(&self.manifest_len.to_le_bytes());
        out[16..24].copy_from_slice(&self.data_off.to_le_bytes());
        out
    }

    pub fn parse(buf: &[u8; HEADER_LEN as usize]) -> Result<Self> {
        if &buf[..6] != MAGIC {
            return Err(PreviewError::Format("not a packview container".into()));
        }
        let u64_at = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&buf[at..at + 8]);
            u64::from_le_bytes(b)
        };
        let version = u16::from_le_bytes([buf[6], buf[7]]);
        if version != VERSION {
            return Err(PreviewError::Format(format!(
                "unsupported container version {version}"
            )));
        }
        Ok(Self {
            version,
            manifest_len: u64_at(8),
            data_off: u64_at(16),
        })
    }
}
