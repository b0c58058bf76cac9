//! flatxml CLI
//!
//! `freeze` parses an XML file and persists the flattened image;
//! `inspect` loads either form and reports the document shape along
//! with how long loading took; the point of freezing is that the
//! frozen load skips the parse entirely.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use memmap2::MmapOptions;
use tracing::info;

use flatxml::{flatten, Document, FlatDocument};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "flatxml",
    version,
    about = "Flatten parsed XML documents into relocatable blobs"
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse an XML file and persist the flattened image
    Freeze {
        /// XML input file
        input: PathBuf,

        /// Where to write the blob
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Load a document and report its shape and load time
    Inspect {
        /// Parse this XML file
        #[arg(long, conflicts_with = "frozen")]
        xml: Option<PathBuf>,

        /// Load this flattened blob
        #[arg(long, required_unless_present = "xml")]
        frozen: Option<PathBuf>,

        /// Map the blob copy-on-write instead of reading it
        #[arg(long, requires = "frozen")]
        mmap: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    match cli.command {
        Command::Freeze { input, output } => freeze(&input, &output),
        Command::Inspect { xml, frozen, mmap } => {
            if let Some(path) = xml {
                inspect_xml(&path)
            } else if let Some(path) = frozen {
                inspect_frozen(&path, mmap)
            } else {
                bail!("nothing to inspect: pass --xml or --frozen");
            }
        }
    }
}

fn freeze(input: &Path, output: &Path) -> anyhow::Result<()> {
    let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;

    let started = Instant::now();
    let mut doc = Document::parse(&bytes);
    doc.set_url(&input.display().to_string());
    let parsed_in = started.elapsed();

    let started = Instant::now();
    let blob = flatten(&doc)?;
    let flattened_in = started.elapsed();

    fs::write(output, blob.as_slice())
        .with_context(|| format!("writing {}", output.display()))?;

    info!(
        nodes = doc.node_count(),
        bytes = blob.len(),
        ?parsed_in,
        ?flattened_in,
        output = %output.display(),
        "froze document"
    );
    Ok(())
}

fn inspect_xml(path: &Path) -> anyhow::Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let started = Instant::now();
    let doc = Document::parse(&bytes);
    let loaded_in = started.elapsed();

    let root = doc.root_element().and_then(|id| doc.node_name(id));
    info!(
        root = root.unwrap_or("<none>"),
        nodes = doc.node_count(),
        ?loaded_in,
        "parsed document"
    );
    Ok(())
}

fn inspect_frozen(path: &Path, use_mmap: bool) -> anyhow::Result<()> {
    let started = Instant::now();
    let flat = if use_mmap {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        // Private mapping: rehydration rewrites every reference slot,
        // and those writes must never reach the file.
        let map = unsafe { MmapOptions::new().map_copy(&file) }
            .with_context(|| format!("mapping {}", path.display()))?;
        FlatDocument::from_mmap(map)?
    } else {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        FlatDocument::from_bytes(&bytes)?
    };
    let loaded_in = started.elapsed();

    let root = flat.root_element().and_then(|n| n.name()).unwrap_or("<none>");
    info!(
        root,
        nodes = flat.node_count(),
        bytes = flat.byte_len(),
        mmap = use_mmap,
        ?loaded_in,
        "loaded frozen document"
    );
    Ok(())
}
