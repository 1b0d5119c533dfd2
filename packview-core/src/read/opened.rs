use crate::codec::CodecId;
use crate::container::manifest::{FileEntry, Manifest};
use crate::container::superblock::{HEADER_LEN, Superblock};
use crate::error::{PreviewError, Result};
use crate::path::canonical_key;
use std::collections::HashMap;
use std::sync::Mutex;
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

/// An open packview container: header and manifest in memory, payloads read on demand.
pub struct Opened {
    f: Mutex<File>,
    pub sb: Superblock,
    pub manifest: Manifest,
    by_key: HashMap<String, usize>,
}

impl Opened {
    pub fn open(path: &Path) -> Result<Self> {
        let mut f = File::open(path)?;
        let file_len = f.metadata()?.len();

        // superblock
        let mut head = [0u8; HEADER_LEN as usize];
        f.read_exact(&mut head)?;
        let sb = Superblock::parse(&head)?;
        if HEADER_LEN.checked_add(sb.manifest_len) != Some(sb.data_off) || sb.data_off > file_len {
            return Err(PreviewError::Format(format!(
                "{}: manifest bounds do not match file length",
                path.display()
            )));
        }

        // manifest
        f.seek(SeekFrom::Start(HEADER_LEN))?;
        let mut mbytes = vec![0u8; sb.manifest_len as usize];
        f.read_exact(&mut mbytes)?;
        let manifest: Manifest = ciborium::de::from_reader(&mbytes[..])
            .map_err(|e| PreviewError::Format(format!("manifest decode: {e}")))?;

        // bounds
        let data_len = file_len - sb.data_off;
        let mut by_key = HashMap::with_capacity(manifest.files.len());
        for (i, fe) in manifest.files.iter().enumerate() {
            if fe.data_off.saturating_add(fe.c_size) > data_len {
                return Err(PreviewError::Format(format!(
                    "entry[{i}] {} out of bounds",
                    fe.path
                )));
            }
            // first occurrence wins for duplicate spellings
            by_key.entry(canonical_key(&fe.path)).or_insert(i);
        }

        Ok(Self {
            f: Mutex::new(f),
            sb,
            manifest,
            by_key,
        })
    }

    pub fn list_entries(&self) -> impl Iterator<Item = &FileEntry> + '_ {
        self.manifest.files.iter()
    }

    pub fn find(&self, path: &str) -> Option<&FileEntry> {
        self.by_key
            .get(&canonical_key(path))
            .map(|&i| &self.manifest.files[i])
    }

    /// Read, decompress and verify one entry.
    pub fn read_entry(&self, path: &str) -> Result<Vec<u8>> {
        let fe = self
            .find(path)
            .ok_or_else(|| PreviewError::NotFound(path.to_string()))?;

        let mut raw = vec![0u8; fe.c_size as usize];
        {
            let mut f = self
                .f
                .lock()
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            f.seek(SeekFrom::Start(self.sb.data_off + fe.data_off))?;
            f.read_exact(&mut raw)?;
        }

        let plain = CodecId::try_from(fe.codec)?
            .decode(&raw, fe.u_size)
            .map_err(|e| match e {
                PreviewError::Io(io) => PreviewError::Format(format!("{}: {io}", fe.path)),
                other => other,
            })?;

        if plain.len() as u64 != fe.u_size {
            return Err(PreviewError::Format(format!(
                "{}: extracted size mismatch ({} != {})",
                fe.path,
                plain.len(),
                fe.u_size
            )));
        }
        if blake3::hash(&plain).as_bytes() != &fe.blake3 {
            return Err(PreviewError::Format(format!("{}: digest mismatch", fe.path)));
        }
        Ok(plain)
    }
}
