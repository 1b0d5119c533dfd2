//! One open archive with its overlay, preview state and persisted edits.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{PreviewConfig, ViewMode};
use crate::domain::EffectiveEntry;
use crate::error::{PreviewError, Result};
use crate::formats::palette::{PaletteLoader, RawPaletteLoader};
use crate::formats::terrain::{ArchiveAtlas, TextureAtlas};
use crate::overlay::{EntryStore, SaveReport};
use crate::pack::writer::PackWriter;
use crate::path::EntryPath;
use crate::preview::dispatch::{DecodeDispatcher, DecodeParams, NamedPalette};
use crate::preview::Renderable;
use crate::repo::{ArchiveRepo, ArchiveWriter, OpenParams};
use crate::repo_factory::{Backend, open_repo};
use crate::sidecar::Sidecar;
use crate::sprite::{Direction, SpriteNavigator};
use crate::tree::{TreeAssembly, TreeNode};

pub const PARAM_PALETTE: &str = "palette";
pub const PARAM_TERRAIN_ARCHIVES: &str = "terrain_archives";
pub const PARAM_VIEW: &str = "view";
pub const PARAM_CACHE: &str = "cache";

/// What is currently shown.
#[derive(Clone, Debug)]
pub struct Selection {
    pub path: EntryPath,
    pub renderable: Renderable,
    pub navigator: Option<SpriteNavigator>,
}

/// Everything needed to decode a selection away from the session.
#[derive(Clone)]
pub struct DecodeRequest {
    pub path: EntryPath,
    pub bytes: Arc<[u8]>,
    pub params: DecodeParams,
    pub mode: ViewMode,
}

#[derive(Clone, Debug, Default)]
pub struct ExtractReport {
    pub extracted: usize,
    pub failures: Vec<(EntryPath, String)>,
}

pub struct PreviewSession {
    archive_path: Option<PathBuf>,
    repo: Arc<dyn ArchiveRepo>,
    writer: Arc<dyn ArchiveWriter>,
    store: EntryStore,
    dispatcher: Arc<DecodeDispatcher>,
    params: DecodeParams,
    raw_params: Vec<(String, String)>,
    palette_loader: Box<dyn PaletteLoader>,
    sidecar: Option<Sidecar>,
    view_mode: ViewMode,
    selection: Option<Selection>,
}

impl PreviewSession {
    /// Open a container on disk and replay the edits recorded next to it.
    pub fn load(archive: impl AsRef<Path>, config: PreviewConfig) -> Result<Self> {
        let archive = archive.as_ref();
        let repo = open_repo(
            Backend::Pack,
            OpenParams {
                archive_path: archive.to_path_buf(),
            },
        )?;
        let mut session = Self::from_repo(repo, Arc::new(PackWriter::default()), config)?;
        session.archive_path = Some(archive.to_path_buf());

        let mut sidecar = Sidecar::open(archive)?;
        let params = sidecar.replay(&mut session.store)?;
        for (name, value) in params {
            if let Err(e) = session.apply_param(&name, &value) {
                warn!("ignoring recorded parameter {name}={value}: {e}");
            }
        }
        session.sidecar = Some(sidecar);
        info!(
            entries = session.store.effective_entries().len(),
            "loaded {}",
            archive.display()
        );
        Ok(session)
    }

    /// Session over any archive backend. Edits are kept in memory only.
    pub fn from_repo(
        repo: Arc<dyn ArchiveRepo>,
        writer: Arc<dyn ArchiveWriter>,
        config: PreviewConfig,
    ) -> Result<Self> {
        let store = EntryStore::from_repo(repo.as_ref())?;
        Ok(Self {
            archive_path: None,
            repo,
            writer,
            store,
            view_mode: config.default_view,
            dispatcher: Arc::new(DecodeDispatcher::new(config)),
            params: DecodeParams::default(),
            raw_params: Vec::new(),
            palette_loader: Box::new(RawPaletteLoader),
            sidecar: None,
            selection: None,
        })
    }

    pub fn with_palette_loader(mut self, loader: Box<dyn PaletteLoader>) -> Self {
        self.palette_loader = loader;
        self
    }

    pub fn archive_path(&self) -> Option<&Path> {
        self.archive_path.as_deref()
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<DecodeDispatcher> {
        &self.dispatcher
    }

    pub fn entries(&self) -> Vec<EffectiveEntry> {
        self.store.effective_entries()
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.raw_params
    }

    /// Re-read the container, dropping every overlay edit and cached decode.
    pub fn reload(&mut self) -> Result<()> {
        if let Some(path) = &self.archive_path {
            self.repo = open_repo(
                Backend::Pack,
                OpenParams {
                    archive_path: path.clone(),
                },
            )?;
        }
        self.store.load(self.repo.list_files()?);
        self.dispatcher.clear_cache();
        self.selection = None;
        if let Some(sc) = &mut self.sidecar {
            sc.clear()?;
        }
        Ok(())
    }

    /// Forget overlay edits (tombstones and external entries) but keep the listing.
    pub fn reset(&mut self) -> Result<()> {
        for e in self.store.externals() {
            self.dispatcher.invalidate(&e.path);
        }
        self.store.reset();
        self.selection = None;
        if let Some(sc) = &mut self.sidecar {
            sc.clear()?;
            // decode parameters survive a reset
            for (name, value) in &self.raw_params {
                sc.record_param(name, value)?;
            }
        }
        Ok(())
    }

    /// Drop the overlay edits recorded next to `archive` without loading it, so a damaged
    /// sidecar or container never blocks a reset. Decode parameters are kept.
    pub fn discard_edits(archive: impl AsRef<Path>) -> Result<()> {
        Sidecar::discard_edits(archive.as_ref())
    }

    fn root_name(&self) -> String {
        self.archive_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn list_tree(&self, sort_alphabetically: bool, filters: Option<&HashSet<String>>) -> TreeNode {
        let mut asm = self.tree_assembly(sort_alphabetically, filters);
        let batch = self.dispatcher.config().tree_batch_size.max(1);
        while asm.push_batch(batch) {
            debug!(remaining = asm.remaining(), "tree assembly");
        }
        asm.finish()
    }

    /// Incremental variant of `list_tree` for front-ends that build large trees in slices.
    pub fn tree_assembly(
        &self,
        sort_alphabetically: bool,
        filters: Option<&HashSet<String>>,
    ) -> TreeAssembly {
        TreeAssembly::new(self.entries(), sort_alphabetically, filters).with_root_name(self.root_name())
    }

    pub fn extensions(&self) -> Vec<String> {
        self.store.extensions()
    }

    pub fn read(&self, path: &EntryPath) -> Result<Arc<[u8]>> {
        let entry = self
            .store
            .lookup(path)
            .ok_or_else(|| PreviewError::NotFound(path.to_string()))?;
        self.store.read(&entry, self.repo.as_ref())
    }

    /// Collect what decoding `path` needs, so it can run elsewhere.
    pub fn request(&self, path: &EntryPath) -> Result<DecodeRequest> {
        Ok(DecodeRequest {
            path: path.clone(),
            bytes: self.read(path)?,
            params: self.params.clone(),
            mode: self.view_mode,
        })
    }

    /// Show `path`. Always yields something to display; failures come back as
    /// `Renderable::Error`.
    pub fn select(&mut self, path: &EntryPath) -> Renderable {
        let renderable = match self.request(path) {
            Ok(req) => render(&self.dispatcher, &req),
            Err(e) => {
                debug!("select {path}: {e}");
                Renderable::from_error(&e)
            }
        };
        self.apply(path.clone(), renderable.clone());
        renderable
    }

    /// Install a renderable produced for `path` (by `select` or a decode queue).
    pub fn apply(&mut self, path: EntryPath, renderable: Renderable) {
        let navigator = match &renderable {
            Renderable::Sprite { sheet, .. } => Some(SpriteNavigator::for_sheet(sheet)),
            _ => None,
        };
        self.selection = Some(Selection {
            path,
            renderable,
            navigator,
        });
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    fn refresh(&mut self) {
        if let Some(path) = self.selection.as_ref().map(|s| s.path.clone()) {
            self.select(&path);
        }
    }

    /// Step through the selected sprite sheet. Returns the new `(group, frame)`, or `None`
    /// when nothing navigable is selected.
    pub fn navigate_sprite(&mut self, dir: Direction) -> Option<(usize, usize)> {
        let nav = self.selection.as_mut()?.navigator.as_mut()?;
        nav.step(dir);
        nav.position()
    }

    /// Info bar line for the current selection.
    pub fn info(&self) -> Option<String> {
        let sel = self.selection.as_ref()?;
        match (&sel.renderable, &sel.navigator) {
            (Renderable::Sprite { sheet, label }, Some(nav)) => Some(nav.info(sheet, label)),
            (r, _) => r.info(),
        }
    }

    /// Pixels currently on screen: the decoded image, or the current sprite frame.
    pub fn current_image(&self) -> Option<&RgbaImage> {
        let sel = self.selection.as_ref()?;
        match (&sel.renderable, &sel.navigator) {
            (Renderable::Image(img), _) => Some(&img.image),
            (Renderable::Sprite { sheet, .. }, Some(nav)) => nav.current_frame(sheet).map(|f| &f.image),
            _ => None,
        }
    }

    pub fn export_png(&self, dest: &Path) -> Result<()> {
        let img = self.current_image().ok_or_else(|| {
            PreviewError::InvalidParam("current selection has no image to export".into())
        })?;
        img.save_with_format(dest, ImageFormat::Png)?;
        Ok(())
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        if self.view_mode != mode {
            self.view_mode = mode;
            self.refresh();
        }
    }

    pub fn delete(&mut self, path: &EntryPath) -> Result<()> {
        self.store.delete(path)?;
        self.forget(path);
        if let Some(sc) = &mut self.sidecar {
            sc.record_delete(path)?;
        }
        Ok(())
    }

    /// Delete everything below the directory `dir`. Returns how many entries went.
    pub fn delete_recursive(&mut self, dir: &str) -> Result<usize> {
        let gone = self.store.delete_recursive(dir)?;
        for p in &gone {
            self.forget(p);
        }
        if let Some(sc) = &mut self.sidecar {
            sc.record_delete_tree(dir)?;
        }
        Ok(gone.len())
    }

    pub fn add_external(&mut self, path: EntryPath, bytes: Vec<u8>) -> Result<()> {
        let bytes: Arc<[u8]> = bytes.into();
        self.store.add_external(path.clone(), bytes.clone())?;
        self.forget(&path);
        if let Some(sc) = &mut self.sidecar {
            sc.record_add(&path, &bytes)?;
        }
        Ok(())
    }

    /// Add every file under `dir` on disk, placed below `folder` inside the archive.
    /// Either all files are added or none.
    pub fn add_external_dir(&mut self, folder: &str, dir: &Path) -> Result<usize> {
        let mut files = Vec::new();
        for e in WalkDir::new(dir).follow_links(false) {
            let e = e.map_err(std::io::Error::other)?;
            if e.file_type().is_file() {
                let rel = e
                    .path()
                    .strip_prefix(dir)
                    .map_err(std::io::Error::other)?
                    .to_string_lossy()
                    .into_owned();
                files.push((EntryPath::join(folder, &rel), e.path().to_path_buf()));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let batch: Vec<(EntryPath, Arc<[u8]>)> = files
            .par_iter()
            .map(|(p, src)| -> Result<(EntryPath, Arc<[u8]>)> { Ok((p.clone(), fs::read(src)?.into())) })
            .collect::<Result<_>>()?;
        let n = batch.len();
        self.store.add_external_many(batch.clone())?;
        for (p, bytes) in &batch {
            self.forget(p);
            if let Some(sc) = &mut self.sidecar {
                sc.record_add(p, bytes)?;
            }
        }
        info!(count = n, "added {} under '{folder}'", dir.display());
        Ok(n)
    }

    fn forget(&mut self, path: &EntryPath) {
        self.dispatcher.invalidate(path);
        if self.selection.as_ref().is_some_and(|s| s.path == *path) {
            self.selection = None;
        }
    }

    /// Set a decode or view parameter:
    /// - `palette`: an archive entry or a file on disk; empty clears it
    /// - `terrain_archives`: `;`-separated container paths searched for terrain textures
    /// - `view`: `preview` or `hex`
    /// - `cache`: `on` or `off`
    pub fn set_decode_param(&mut self, name: &str, value: &str) -> Result<()> {
        self.apply_param(name, value)?;
        if let Some(sc) = &mut self.sidecar {
            sc.record_param(name, value)?;
        }
        self.refresh();
        Ok(())
    }

    /// Like `set_decode_param`, but nothing is recorded next to the archive.
    pub fn override_param(&mut self, name: &str, value: &str) -> Result<()> {
        self.apply_param(name, value)?;
        self.refresh();
        Ok(())
    }

    fn apply_param(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            PARAM_PALETTE => {
                self.params.palette = if value.is_empty() {
                    None
                } else {
                    let bytes = self.resolve_resource(value)?;
                    Some(NamedPalette {
                        name: value.to_string(),
                        palette: Arc::new(self.palette_loader.load(&bytes)?),
                    })
                };
            }
            PARAM_TERRAIN_ARCHIVES => {
                let mut atlases: Vec<Arc<dyn TextureAtlas>> = Vec::new();
                for p in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                    let repo = open_repo(
                        Backend::Pack,
                        OpenParams {
                            archive_path: PathBuf::from(p),
                        },
                    )?;
                    atlases.push(Arc::new(ArchiveAtlas::new(repo)?));
                }
                self.params.atlases = atlases;
                self.params.atlas_generation += 1;
            }
            PARAM_VIEW => {
                self.view_mode = match value.to_ascii_lowercase().as_str() {
                    "preview" => ViewMode::Preview,
                    "hex" => ViewMode::Hex,
                    other => return Err(PreviewError::InvalidParam(format!("view mode '{other}'"))),
                };
            }
            PARAM_CACHE => {
                let on = match value.to_ascii_lowercase().as_str() {
                    "on" | "true" | "1" => true,
                    "off" | "false" | "0" => false,
                    other => return Err(PreviewError::InvalidParam(format!("cache '{other}'"))),
                };
                self.dispatcher.set_cache_enabled(on);
            }
            other => return Err(PreviewError::InvalidParam(format!("unknown parameter '{other}'"))),
        }
        self.raw_params.retain(|(n, _)| n != name);
        self.raw_params.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Bytes of an archive entry named `value`, else of the file `value` on disk.
    fn resolve_resource(&self, value: &str) -> Result<Arc<[u8]>> {
        let as_entry = EntryPath::new(value);
        if !as_entry.is_empty() && self.store.contains(&as_entry) {
            return self.read(&as_entry);
        }
        match fs::read(value) {
            Ok(b) => Ok(b.into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                PreviewError::ConfigurationMissing(format!("{value} not found in archive or on disk")),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the effective view to a new container at `dest`. Entries that cannot be read
    /// are skipped and counted in the report.
    pub fn save(&self, dest: &Path) -> Result<SaveReport> {
        self.store.save(self.repo.as_ref(), self.writer.as_ref(), dest)
    }

    pub fn extract(&self, path: &EntryPath, dest: &Path) -> Result<()> {
        let bytes = self.read(path)?;
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, &bytes)?;
        Ok(())
    }

    /// Extract every effective entry below `dest_dir`, keeping relative paths. Entries that
    /// fail (unreadable, or a path that would leave `dest_dir`) are counted, not fatal.
    pub fn extract_all(&self, dest_dir: &Path) -> ExtractReport {
        let entries = self.entries();
        let results: Vec<(EntryPath, Result<()>)> = entries
            .par_iter()
            .map(|e| {
                let path = e.path().clone();
                let res = if path.is_unsafe() {
                    Err(PreviewError::PathConflict {
                        path: path.to_string(),
                        reason: "escapes the extraction folder".into(),
                    })
                } else {
                    let target = path.segments().fold(dest_dir.to_path_buf(), |acc, s| acc.join(s));
                    self.extract(&path, &target)
                };
                (path, res)
            })
            .collect();

        let mut report = ExtractReport::default();
        for (path, res) in results {
            match res {
                Ok(()) => report.extracted += 1,
                Err(e) => {
                    warn!("extract: {path}: {e}");
                    report.failures.push((path, e.to_string()));
                }
            }
        }
        info!(
            extracted = report.extracted,
            failed = report.failures.len(),
            "extracted to {}",
            dest_dir.display()
        );
        report
    }
}

/// Produce the renderable a request asks for.
pub fn render(dispatcher: &DecodeDispatcher, req: &DecodeRequest) -> Renderable {
    match req.mode {
        ViewMode::Hex => dispatcher.hex(&req.path, &req.bytes),
        ViewMode::Preview => dispatcher.decode(&req.path, &req.bytes, &req.params),
    }
}
