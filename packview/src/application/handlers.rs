use std::collections::HashSet;
use std::path::{Path, PathBuf};

use packview_core::error::{ErrorKind, PreviewError, Result};
use packview_core::session::{PARAM_PALETTE, PARAM_TERRAIN_ARCHIVES};
use packview_core::tree::TreeNode;
use packview_core::{
    Direction, EntryPath, EntrySource, PackOptions, PreviewConfig, PreviewSession, Renderable,
    ViewMode, pack,
};

pub struct ShowOptions {
    pub hex: bool,
    pub palette: Option<String>,
    pub frame: usize,
    pub terrain: Option<String>,
    pub export: Option<PathBuf>,
    pub no_cache: bool,
    pub encoding: String,
}

fn open(archive: &Path) -> Result<PreviewSession> {
    PreviewSession::load(archive, PreviewConfig::default())
}

pub fn handle_pack(out: PathBuf, inputs: Vec<PathBuf>, deterministic: bool, min_gain: f32) -> Result<()> {
    let refs: Vec<_> = inputs.iter().map(|p| p.as_path()).collect();
    let opts = PackOptions {
        deterministic,
        min_gain,
    };
    pack(&refs, &out, Some(&opts))
}

pub fn handle_ls(archive: PathBuf, sort: bool, exts: Vec<String>) -> Result<()> {
    let session = open(&archive)?;
    let filter: Option<HashSet<String>> = if exts.is_empty() {
        None
    } else {
        Some(exts.into_iter().collect())
    };
    let tree = session.list_tree(sort, filter.as_ref());
    tree.walk(|depth, node| {
        let indent = "  ".repeat(depth);
        match node {
            TreeNode::Directory(d) => println!("{indent}{}/", d.name),
            TreeNode::File(f) => {
                let mark = match f.source {
                    EntrySource::Archive => "",
                    EntrySource::External => "  [added]",
                };
                println!("{indent}{}  {} bytes{mark}", f.name, f.size);
            }
        }
    });
    Ok(())
}

pub fn handle_exts(archive: PathBuf) -> Result<()> {
    for ext in open(&archive)?.extensions() {
        println!("{ext}");
    }
    Ok(())
}

pub fn handle_show(archive: PathBuf, path: String, opts: ShowOptions) -> Result<()> {
    let config = PreviewConfig {
        cache_enabled: !opts.no_cache,
        text_encoding: opts.encoding,
        default_view: if opts.hex { ViewMode::Hex } else { ViewMode::Preview },
        ..Default::default()
    };
    let mut session = PreviewSession::load(&archive, config)?;
    if opts.hex {
        session.set_view_mode(ViewMode::Hex);
    }
    // flags apply to this run only; `set` records parameters next to the archive
    if let Some(p) = &opts.palette {
        session.override_param(PARAM_PALETTE, p)?;
    }
    if let Some(t) = &opts.terrain {
        session.override_param(PARAM_TERRAIN_ARCHIVES, t)?;
    }

    let entry = EntryPath::new(&path);
    let renderable = session.select(&entry);
    for _ in 0..opts.frame {
        session.navigate_sprite(Direction::Next);
    }

    match &renderable {
        Renderable::Text { text, .. } => print!("{text}"),
        Renderable::Error { kind, message } => return Err(error_of(*kind, message)),
        Renderable::Mesh { group, .. } => {
            println!("{}", session.info().unwrap_or_default());
            println!("Meshes: {}, Triangles: {}", group.meshes.len(), group.triangle_count());
        }
        _ => println!("{}", session.info().unwrap_or_default()),
    }
    if let Some(out) = &opts.export {
        session.export_png(out)?;
    }
    Ok(())
}

fn error_of(kind: ErrorKind, message: &str) -> PreviewError {
    match kind {
        ErrorKind::NotFound => PreviewError::NotFound(message.to_string()),
        ErrorKind::ConfigurationMissing => PreviewError::ConfigurationMissing(message.to_string()),
        _ => PreviewError::DecodeFailure(message.to_string()),
    }
}

pub fn handle_get(archive: PathBuf, path: String, out: PathBuf) -> Result<()> {
    open(&archive)?.extract(&EntryPath::new(&path), &out)
}

pub fn handle_extract(archive: PathBuf, dest: PathBuf) -> Result<()> {
    let report = open(&archive)?.extract_all(&dest);
    println!("Extracted {} files, {} errors", report.extracted, report.failures.len());
    for (path, err) in &report.failures {
        eprintln!("  {path}: {err}");
    }
    Ok(())
}

pub fn handle_rm(archive: PathBuf, path: String, recursive: bool) -> Result<()> {
    let mut session = open(&archive)?;
    if recursive {
        let n = session.delete_recursive(&path)?;
        println!("deleted {n} entries");
    } else {
        session.delete(&EntryPath::new(&path))?;
    }
    Ok(())
}

pub fn handle_add(archive: PathBuf, src: PathBuf, into: String, recursive: bool) -> Result<()> {
    let mut session = open(&archive)?;
    if recursive {
        let n = session.add_external_dir(&into, &src)?;
        println!("added {n} files");
        return Ok(());
    }
    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PreviewError::InvalidParam(format!("{} is not a file", src.display())))?;
    let bytes = std::fs::read(&src)?;
    session.add_external(EntryPath::join(&into, &name), bytes)
}

pub fn handle_set(archive: PathBuf, name: String, value: String) -> Result<()> {
    open(&archive)?.set_decode_param(&name, &value)
}

pub fn handle_save(archive: PathBuf, out: PathBuf, strict: bool) -> Result<()> {
    let report = open(&archive)?.save(&out)?;
    println!("Saved {} files to {}", report.written, out.display());
    for (path, err) in &report.failures {
        eprintln!("  skipped {path}: {err}");
    }
    if strict {
        report.into_result()?;
    }
    Ok(())
}

pub fn handle_reset(archive: PathBuf) -> Result<()> {
    PreviewSession::discard_edits(&archive)
}
