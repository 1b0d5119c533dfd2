pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use packview_core::error::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Pack {
            out,
            inputs,
            deterministic,
            min_gain,
        } => handlers::handle_pack(out, inputs, deterministic, min_gain),
        Commands::Ls {
            archive,
            sort,
            exts,
        } => handlers::handle_ls(archive, sort, exts),
        Commands::Exts { archive } => handlers::handle_exts(archive),
        Commands::Show {
            archive,
            path,
            hex,
            palette,
            frame,
            terrain,
            export,
            no_cache,
            encoding,
        } => handlers::handle_show(
            archive,
            path,
            handlers::ShowOptions {
                hex,
                palette,
                frame,
                terrain,
                export,
                no_cache,
                encoding,
            },
        ),
        Commands::Get { archive, path, out } => handlers::handle_get(archive, path, out),
        Commands::Extract { archive, dest } => handlers::handle_extract(archive, dest),
        Commands::Rm {
            archive,
            path,
            recursive,
        } => handlers::handle_rm(archive, path, recursive),
        Commands::Add {
            archive,
            src,
            into,
            recursive,
        } => handlers::handle_add(archive, src, into, recursive),
        Commands::Set {
            archive,
            name,
            value,
        } => handlers::handle_set(archive, name, value),
        Commands::Save {
            archive,
            out,
            strict,
        } => handlers::handle_save(archive, out, strict),
        Commands::Reset { archive } => handlers::handle_reset(archive),
    }
}
