//! `efipedump`: dumps the executables embedded in a UEFI firmware image.
//!
//! The image is parsed into a tree of firmware volumes and files, executable files are collected and
//! deduplicated by GUID, and the PE32 image of each is written to the output directory as
//! `<Name>_<Type>_<GUID>_<Version>_<index>.efi`.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
mod logger;
mod manifest;

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use efipe_core::{collect, CollectionPolicy, ExecutableBuilder};
use efipe_extractors::{CompositeSectionExtractor, UefiDecompressor};
use efipe_ffs::{guid_string, tree, tree::DEFAULT_MAX_DEPTH};
use log::info;

use crate::manifest::{Manifest, ManifestEntry};

const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Extract applications, drivers, MM modules and PEIMs from a UEFI firmware image.
#[derive(Parser, Debug)]
#[command(name = "efipedump", version, about, long_about = None)]
struct Cli {
    /// Firmware image to read.
    #[arg(short, long)]
    input: PathBuf,

    /// Directory receiving the extracted executables. Created if missing.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Also extract PEI modules.
    #[arg(long, default_value_t = false)]
    include_peim: bool,

    /// Skip MM (SMM) modules.
    #[arg(long, default_value_t = false)]
    exclude_mm: bool,

    /// Maximum nesting of compression sections and of volumes inside volumes.
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Print one line per executable instead of writing files.
    #[arg(long, default_value_t = false)]
    list: bool,

    /// Also write manifest.json to the output directory.
    #[arg(long, default_value_t = false)]
    manifest: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);
    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let image =
        fs::read(&cli.input).with_context(|| format!("failed to read firmware image {}", cli.input.display()))?;

    let extractor = CompositeSectionExtractor::default();
    let tree = tree::Parser::new(&extractor)
        .with_max_depth(cli.max_depth)
        .parse(&image)
        .with_context(|| format!("failed to parse firmware image {}", cli.input.display()))?;

    let policy = CollectionPolicy::default().with_peim(cli.include_peim).with_mm(!cli.exclude_mm);
    let collection = collect(&tree, policy);

    if !cli.list || cli.manifest {
        fs::create_dir_all(&cli.output)
            .with_context(|| format!("failed to create output directory {}", cli.output.display()))?;
    }

    let decompressor = UefiDecompressor::new();
    let builder = ExecutableBuilder::new(&decompressor).with_max_depth(cli.max_depth);
    let mut entries = Vec::new();
    for (guid, index, file) in collection.iter() {
        let exe = builder.build(file).with_context(|| format!("failed to extract executable {}", guid_string(&guid)))?;
        let entry = ManifestEntry::new(&exe, exe.output_file_name(index));

        if cli.list {
            println!("{}", entry.listing());
        } else {
            let path = cli.output.join(&entry.file_name);
            fs::write(&path, exe.code()).with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote {} ({:#x} bytes)", path.display(), exe.code().len());
        }
        entries.push(entry);
    }

    if cli.manifest {
        let manifest =
            Manifest { unique: collection.unique(), candidates: collection.candidates(), executables: entries };
        let path = cli.output.join(MANIFEST_FILE_NAME);
        fs::write(&path, manifest.to_json()?).with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote {}", path.display());
    }

    println!("{} unique executables / {} total candidates", collection.unique(), collection.candidates());
    Ok(())
}
