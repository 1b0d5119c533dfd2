use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "packview: browse, preview and edit game asset containers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pack directories or files into a new container
    Pack {
        out: PathBuf,
        inputs: Vec<PathBuf>,
        #[arg(long)]
        deterministic: bool,
        #[arg(long, default_value_t = 0.05)]
        min_gain: f32,
    },
    /// Print the entry tree (pending edits included)
    Ls {
        archive: PathBuf,
        /// Sort entries by path instead of container order
        #[arg(long)]
        sort: bool,
        /// Only show these extensions (repeatable, e.g. --ext tdf --ext .gaf)
        #[arg(long = "ext")]
        exts: Vec<String>,
    },
    /// List the distinct extensions in the archive
    Exts { archive: PathBuf },
    /// Preview one entry
    Show {
        archive: PathBuf,
        path: String,
        /// Hex dump regardless of format
        #[arg(long)]
        hex: bool,
        /// Palette entry inside the archive, or a palette file on disk
        #[arg(long)]
        palette: Option<String>,
        /// Step this many frames into a sprite sheet
        #[arg(long, default_value_t = 0)]
        frame: usize,
        /// `;`-separated containers holding terrain textures
        #[arg(long)]
        terrain: Option<String>,
        /// Write the shown image (or sprite frame) as PNG
        #[arg(long)]
        export: Option<PathBuf>,
        #[arg(long)]
        no_cache: bool,
        /// Code page for text entries
        #[arg(long, default_value = "windows-1252")]
        encoding: String,
    },
    /// Copy one entry to a file on disk
    Get {
        archive: PathBuf,
        path: String,
        out: PathBuf,
    },
    /// Extract every entry below a directory
    Extract { archive: PathBuf, dest: PathBuf },
    /// Delete an entry (or a directory with --recursive)
    Rm {
        archive: PathBuf,
        path: String,
        #[arg(long, short)]
        recursive: bool,
    },
    /// Add a file, or a directory tree with --recursive
    Add {
        archive: PathBuf,
        src: PathBuf,
        /// Archive folder to place the file(s) under
        #[arg(long, default_value = "")]
        into: String,
        #[arg(long, short)]
        recursive: bool,
    },
    /// Record a decode parameter (palette, terrain_archives, view, cache)
    Set {
        archive: PathBuf,
        name: String,
        value: String,
    },
    /// Write the archive with its pending edits to a new container
    Save {
        archive: PathBuf,
        out: PathBuf,
        /// Fail when any entry could not be written
        #[arg(long)]
        strict: bool,
    },
    /// Discard pending edits
    Reset { archive: PathBuf },
}
