use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{PreviewError, Result};

const MAGIC: &[u8; 8] = b"PVLOG\0\0\0";
const VERSION: u8 = 1;
const HEADER_LEN: u64 = MAGIC.len() as u64 + 1;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum LogRecord {
    Delete {
        path: String,
    },
    DeleteTree {
        dir: String,
    },
    AddExternal {
        path: String,
        off: u64,
        len: u64,
        blake3: [u8; 32],
    },
    SetParam {
        name: String,
        value: String,
    },
}

/// Append-only, length-delimited CBOR log of overlay edits.
pub struct Journal {
    f: File,
}

/// Next record at the cursor. `None` at end of file or at a torn tail whose length prefix
/// promises more bytes than the file holds.
fn read_next_record(f: &mut File, file_len: u64) -> Result<Option<LogRecord>> {
    let len = match get_uvarint(f)? {
        Some(n) => n,
        None => return Ok(None),
    };
    let pos = f.stream_position()?;
    if len > file_len.saturating_sub(pos) {
        return Ok(None);
    }

    let mut buf = vec![0u8; len as usize];
    f.read_exact(&mut buf)?;
    let rec: LogRecord = serde_cbor::from_slice(&buf)
        .map_err(|e| PreviewError::Format(format!("journal record: {e}")))?;
    Ok(Some(rec))
}

pub(crate) fn put_uvarint(out: &mut Vec<u8>, mut x: u64) {
    while x >= 0x80 {
        out.push((x as u8) | 0x80);
        x >>= 7;
    }
    out.push(x as u8);
}

fn get_uvarint<R: Read>(r: &mut R) -> Result<Option<u64>> {
    let mut x: u64 = 0;
    let mut s: u32 = 0;
    for _ in 0..10 {
        let mut b = [0u8; 1];
        match r.read(&mut b) {
            Ok(0) => return Ok(None),
            Ok(_) => {
                let byte = b[0];
                if byte < 0x80 {
                    x |= (byte as u64) << s;
                    return Ok(Some(x));
                }
                x |= ((byte & 0x7f) as u64) << s;
                s += 7;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(PreviewError::Format("journal varint too long".into()))
}

impl Journal {
    pub fn open(path: &Path) -> Result<Self> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut j = Self { f };
        if j.f.metadata()?.len() == 0 {
            write_header(&mut j.f)?;
        } else if let Err(e) = j.check_header() {
            warn!("{}: {e}; starting an empty journal", path.display());
            j.truncate()?;
        }

        // Seek to end for appends
        j.f.seek(SeekFrom::End(0))?;
        Ok(j)
    }

    fn check_header(&mut self) -> Result<()> {
        let mut head = [0u8; HEADER_LEN as usize];
        self.f.seek(SeekFrom::Start(0))?;
        self.f.read_exact(&mut head).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => PreviewError::Format("short journal header".into()),
            _ => e.into(),
        })?;
        if &head[..MAGIC.len()] != MAGIC {
            return Err(PreviewError::Format("not an overlay journal".into()));
        }
        if head[MAGIC.len()] != VERSION {
            return Err(PreviewError::Format(format!(
                "unsupported journal version {}",
                head[MAGIC.len()]
            )));
        }
        Ok(())
    }

    /// Append a single record (length-delimited). Partial tails are ignored on read.
    pub fn append(&mut self, rec: &LogRecord) -> Result<()> {
        let plain = serde_cbor::to_vec(rec)
            .map_err(|e| PreviewError::Format(format!("journal encode: {e}")))?;
        let mut lenv = Vec::with_capacity(10);
        put_uvarint(&mut lenv, plain.len() as u64);
        self.f.seek(SeekFrom::End(0))?;
        self.f.write_all(&lenv)?;
        self.f.write_all(&plain)?;
        self.f.flush()?;
        Ok(())
    }

    /// Every intact record, in append order.
    ///
    /// Reading stops at the first torn or undecodable record. The file is cut back to the
    /// end of the last intact record, so later appends stay readable.
    pub fn records(&mut self) -> Result<Vec<LogRecord>> {
        self.f.flush()?;
        let file_len = self.f.metadata()?.len();
        self.f.seek(SeekFrom::Start(HEADER_LEN))?;

        let mut out = Vec::new();
        let mut good_end = HEADER_LEN;
        loop {
            match read_next_record(&mut self.f, file_len) {
                Ok(Some(rec)) => {
                    out.push(rec);
                    good_end = self.f.stream_position()?;
                }
                Ok(None) => break,
                Err(PreviewError::Format(e)) => {
                    warn!(offset = good_end, "journal: {e}; dropping the rest of the log");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        if good_end < file_len {
            debug!(from = file_len, to = good_end, "journal cut back to last intact record");
            self.f.set_len(good_end)?;
        }
        self.f.seek(SeekFrom::End(0))?;
        Ok(out)
    }

    /// Drop every record, keeping the header.
    pub fn truncate(&mut self) -> Result<()> {
        self.f.set_len(0)?;
        self.f.seek(SeekFrom::Start(0))?;
        write_header(&mut self.f)?;
        Ok(())
    }
}

fn write_header(f: &mut File) -> Result<()> {
    f.write_all(MAGIC)?;
    f.write_all(&[VERSION])?;
    f.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_records(p: &Path) {
        let mut j = Journal::open(p).unwrap();
        j.append(&LogRecord::Delete { path: "a.txt".into() }).unwrap();
        j.append(&LogRecord::SetParam {
            name: "palette".into(),
            value: "PALETTE.PAL".into(),
        })
        .unwrap();
    }

    #[test]
    fn records_survive_reopen_and_torn_tail_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.pvlog");
        two_records(&p);
        // half-written record: length prefix promising more bytes than exist
        {
            let mut f = OpenOptions::new().append(true).open(&p).unwrap();
            f.write_all(&[0x20, 0xa1]).unwrap();
        }
        let mut j = Journal::open(&p).unwrap();
        let recs = j.records().unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0], LogRecord::Delete { path: "a.txt".into() });

        // the torn bytes are gone, so a new append lands right after the intact records
        j.append(&LogRecord::Delete { path: "b.txt".into() }).unwrap();
        assert_eq!(j.records().unwrap().len(), 3);

        j.truncate().unwrap();
        assert!(j.records().unwrap().is_empty());
    }

    #[test]
    fn garbled_record_keeps_the_intact_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.pvlog");
        two_records(&p);
        let mut bytes = std::fs::read(&p).unwrap();
        let n = bytes.len();
        bytes[n - 3] = 0xff;
        bytes[n - 2] = 0xfe;
        std::fs::write(&p, &bytes).unwrap();

        let mut j = Journal::open(&p).unwrap();
        assert_eq!(j.records().unwrap(), vec![LogRecord::Delete { path: "a.txt".into() }]);
    }

    #[test]
    fn huge_length_prefix_reads_as_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.pvlog");
        two_records(&p);
        {
            let mut f = OpenOptions::new().append(true).open(&p).unwrap();
            let mut lenv = Vec::new();
            put_uvarint(&mut lenv, u64::MAX >> 1);
            f.write_all(&lenv).unwrap();
            f.write_all(b"xy").unwrap();
        }
        let mut j = Journal::open(&p).unwrap();
        assert_eq!(j.records().unwrap().len(), 2);
    }

    #[test]
    fn foreign_header_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.pvlog");
        std::fs::write(&p, b"definitely not a journal").unwrap();

        let mut j = Journal::open(&p).unwrap();
        assert!(j.records().unwrap().is_empty());
        j.append(&LogRecord::Delete { path: "a.txt".into() }).unwrap();
        assert_eq!(Journal::open(&p).unwrap().records().unwrap().len(), 1);
    }
}
