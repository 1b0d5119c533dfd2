use crate::codec::CodecId;
use crate::container::manifest::{FileEntry, Manifest, Meta};
use crate::container::superblock::Superblock;
use crate::error::{PreviewError, Result};
use crate::repo::ArchiveWriter;
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Clone, Default)]
pub struct PackOptions {
    /// When true, zero timestamps in manifest for deterministic output.
    pub deterministic: bool,
    /// Only accept compression if it saves at least this fraction.
    /// e.g. 0.05 means "compress only if >=5% smaller than STORE".
    pub min_gain: f32, // default 0.05 if left as 0.0
}

fn effective_min_gain(opts: Option<&PackOptions>) -> f32 {
    let val = opts.map(|o| o.min_gain).unwrap_or(0.05);
    if val <= 0.0 { 0.05 } else { val }
}

fn should_compress(u: usize, c: usize, min_gain: f32) -> bool {
    // true if (u - c) >= u * min_gain  ⇔  c <= u * (1 - min_gain)
    u > 0 && (u as f64 - c as f64) >= (u as f64 * min_gain as f64)
}

struct Encoded {
    entry: FileEntry,
    payload: Vec<u8>,
}

fn encode_one(path: &str, data: &[u8], min_gain: f32) -> Result<Encoded> {
    let hash = blake3::hash(data);
    let trial = CodecId::Zstd.encode(data)?;

    let (codec, payload) = if should_compress(data.len(), trial.len(), min_gain) {
        (CodecId::Zstd, trial)
    } else {
        (CodecId::Store, data.to_vec())
    };
    Ok(Encoded {
        entry: FileEntry {
            path: path.to_string(),
            u_size: data.len() as u64,
            c_size: payload.len() as u64,
            codec: codec as u8,
            data_off: 0, // patched once the layout is known
            blake3: *hash.as_bytes(),
        },
        payload,
    })
}

/// Write a container holding `files` in the given order.
///
/// The container is assembled in a temp file next to `out` and renamed over it, so a failed
/// write never leaves a truncated archive behind.
pub fn write_container(
    out: &Path,
    files: &[(String, Vec<u8>)],
    opts: Option<&PackOptions>,
) -> Result<()> {
    let min_gain = effective_min_gain(opts);
    let encoded = files
        .par_iter() // each payload compresses independently
        .map(|(path, data)| encode_one(path, data, min_gain))
        .collect::<Result<Vec<_>>>()?;

    let deterministic = opts.map(|o| o.deterministic).unwrap_or(false);
    let created = if deterministic {
        0
    } else {
        OffsetDateTime::now_utc().unix_timestamp()
    };

    let mut cursor = 0u64;
    let mut entries = Vec::with_capacity(encoded.len());
    for enc in &encoded {
        let mut e = enc.entry.clone();
        e.data_off = cursor;
        cursor += e.c_size;
        entries.push(e);
    }

    let manifest = Manifest {
        files: entries,
        meta: Meta {
            created,
            tool: format!("packview-core/{}", env!("CARGO_PKG_VERSION")),
        },
    };
    let mut manifest_buf = Vec::new();
    ciborium::ser::into_writer(&manifest, &mut manifest_buf)
        .map_err(|e| PreviewError::Format(format!("manifest encode: {e}")))?;
    let manifest_len = manifest_buf.len() as u64;

    let dir = match out.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    {
        let w = tmp.as_file_mut();
        w.write_all(&Superblock::for_manifest(manifest_len).to_bytes())?;
        w.write_all(&manifest_buf)?;
        for enc in &encoded {
            w.write_all(&enc.payload)?;
        }
        w.flush()?;
    }
    tmp.persist(out).map_err(|e| PreviewError::Io(e.error))?;
    debug!(files = files.len(), bytes = cursor, "container written to {}", out.display());
    Ok(())
}

/// Pack directories (or single files) from disk into a new container.
/// Entry paths are relative to the input root they were found under.
pub fn pack(inputs: &[&Path], out: &Path, opts: Option<&PackOptions>) -> Result<()> {
    let mut found: Vec<(String, PathBuf)> = Vec::new();
    for root in inputs {
        for e in WalkDir::new(root).follow_links(false) {
            let e = e.map_err(|e| std::io::Error::other(e.to_string()))?;
            if !e.file_type().is_file() {
                continue; // symlinks skipped
            }
            let p = e.path();
            let rel = match p.strip_prefix(root) {
                Ok(r) if !r.as_os_str().is_empty() => r,
                _ => Path::new(p.file_name().unwrap_or_default()),
            };
            found.push((rel.to_string_lossy().replace('/', "\\"), p.to_path_buf()));
        }
    }
    found.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));

    let files = found
        .par_iter()
        .map(|(rel, src)| Ok((rel.clone(), fs::read(src)?)))
        .collect::<Result<Vec<_>>>()?;
    info!(files = files.len(), "packing {}", out.display());
    write_container(out, &files, opts)
}

/// `ArchiveWriter` producing packview containers.
#[derive(Clone, Default)]
pub struct PackWriter {
    pub opts: PackOptions,
}

impl ArchiveWriter for PackWriter {
    fn write(&self, dest: &Path, files: &[(String, Vec<u8>)]) -> Result<()> {
        write_container(dest, files, Some(&self.opts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_kept_only_when_it_pays() {
        assert!(should_compress(1000, 900, 0.05));
        assert!(!should_compress(1000, 990, 0.05));
        assert!(!should_compress(0, 0, 0.05));
    }

    #[test]
    fn repetitive_payload_is_zstd_and_noise_is_stored() {
        let text = vec![b'a'; 4096];
        let enc = encode_one("a.txt", &text, 0.05).unwrap();
        assert_eq!(enc.entry.codec, CodecId::Zstd as u8);
        assert!(enc.entry.c_size < enc.entry.u_size);

        let noise: Vec<u8> = (0..64u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        let enc = encode_one("n.bin", &noise, 0.05).unwrap();
        assert_eq!(enc.entry.codec, CodecId::Store as u8);
        assert_eq!(enc.payload, noise);
    }
}
