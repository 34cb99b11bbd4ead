//! o3db Binary
//!
//! Inspects, verifies and recompresses scene archives.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use o3db::archive::{self, AtomKind};
use o3db::resource::{DirectoryResourceProvider, ImageBitmapDecoder};
use o3db::{Archiver, Compression, Config, IndexWidth, Pack};
use tracing_subscriber::{fmt, EnvFilter};

/// o3db archive tool
#[derive(Parser, Debug)]
#[command(name = "o3db")]
#[command(about = "Inspect and rewrite binary scene archives")]
#[command(version)]
struct Args {
    /// Largest accepted atom payload in MB
    #[arg(long, default_value = "256")]
    max_atom_mb: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the header, atom counts, strings and object classes
    Inspect {
        /// Archive to read
        archive: PathBuf,

        /// Also list every interned string
        #[arg(short, long)]
        strings: bool,
    },

    /// Rebuild the full graph to check that the archive loads
    Verify {
        /// Archive to read
        archive: PathBuf,

        /// Directory texture URIs are resolved against
        #[arg(short, long, default_value = ".")]
        resources: PathBuf,

        /// Load index buffers as 16-bit
        #[arg(long)]
        narrow_indices: bool,
    },

    /// Copy the atoms under a different compression mode
    Recompress {
        /// Archive to read
        input: PathBuf,

        /// Archive to write
        output: PathBuf,

        /// none, gzip or lzma
        #[arg(short, long, default_value = "lzma")]
        compression: Compression,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,o3db=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    let config = Config::builder()
        .max_atom_size(args.max_atom_mb.saturating_mul(1024 * 1024))
        .build();

    if let Err(e) = run(args.command, config) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: Config) -> o3db::Result<()> {
    match command {
        Commands::Inspect {
            archive: path,
            strings,
        } => {
            let file = BufReader::new(File::open(&path)?);
            let summary = archive::inspect(file, &config)?;

            println!("{}", path.display());
            println!("  compression: {}", summary.compression);
            println!("  root:        #{}", summary.root);
            println!(
                "  atoms:       {} ({} bytes uncompressed)",
                summary.total_atoms(),
                summary.atom_bytes
            );
            for kind in [
                AtomKind::String,
                AtomKind::Object,
                AtomKind::Attachment,
                AtomKind::EndOfArchive,
            ] {
                println!("    {:<15} {}", kind.name(), summary.atom_count(kind));
            }
            println!("  classes:");
            for (class, count) in &summary.classes {
                println!("    {:<22} {}", class, count);
            }
            if strings {
                println!("  strings:");
                for (index, value) in summary.strings.iter().enumerate() {
                    println!("    {:>5} {:?}", index, value);
                }
            }
        }

        Commands::Verify {
            archive,
            resources,
            narrow_indices,
        } => {
            let width = if narrow_indices {
                IndexWidth::U16
            } else {
                IndexWidth::U32
            };
            let config = Config {
                index_width: width,
                ..config
            };
            let archiver = Archiver::with_resources(
                config,
                Arc::new(DirectoryResourceProvider::new(resources)),
                Arc::new(ImageBitmapDecoder),
            );

            let mut pack = Pack::new();
            let root = archiver.load_from_path(&mut pack, &archive)?;
            println!(
                "{}: ok, root #{}, {} objects",
                archive.display(),
                root,
                pack.len()
            );
        }

        Commands::Recompress {
            input,
            output,
            compression,
        } => {
            let reader = BufReader::new(File::open(&input)?);
            let writer = BufWriter::new(File::create(&output)?);
            let atoms = archive::recompress(reader, writer, compression, &config)?;
            tracing::info!(
                "Wrote {} atoms to {} ({})",
                atoms,
                output.display(),
                compression
            );
        }
    }
    Ok(())
}
