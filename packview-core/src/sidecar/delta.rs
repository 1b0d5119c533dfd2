use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{PreviewError, Result};
use crate::sidecar::journal::put_uvarint;

/// Append-only store of external payload frames, addressed by (offset, length).
pub struct DeltaStore {
    f: File,
}

impl DeltaStore {
    pub fn open(path: &Path) -> Result<Self> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { f })
    }

    /// Append one frame; returns the payload offset and length.
    pub fn append_frame(&mut self, frame: &[u8]) -> Result<(u64, u64)> {
        let off_before = self.f.seek(SeekFrom::End(0))?;
        let mut lenv = Vec::with_capacity(10);
        put_uvarint(&mut lenv, frame.len() as u64);
        self.f.write_all(&lenv)?;
        self.f.write_all(frame)?;
        self.f.flush()?;
        Ok((off_before + lenv.len() as u64, frame.len() as u64))
    }

    pub fn read_frame(&mut self, off: u64, len: u64) -> Result<Vec<u8>> {
        let file_len = self.f.metadata()?.len();
        if off.checked_add(len).is_none_or(|end| end > file_len) {
            return Err(PreviewError::Format(format!(
                "delta frame {off}+{len} past end of store ({file_len} bytes)"
            )));
        }
        self.f.seek(SeekFrom::Start(off))?;
        let mut buf = vec![0u8; len as usize];
        self.f.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn truncate(&mut self) -> Result<()> {
        self.f.set_len(0)?;
        Ok(())
    }
}
