//! Horadric command-line tool
//!
//! Inspects MPQ archives directly (`list`, `info`, `extract`) or resolves a
//! virtual path through a configured load order (`cat`).

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use horadric_assets::{AssetResolver, ResolverConfig};
use horadric_mpq::Archive;

#[derive(Debug, Parser)]
#[command(name = "horadric", about = "Inspect and extract MPQ archives", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the files named in an archive's (listfile)
    List {
        /// Archive to read
        archive: PathBuf,
    },

    /// Print header and table details
    Info {
        /// Archive to read
        archive: PathBuf,
    },

    /// Extract one file from an archive
    Extract {
        /// Archive to read
        archive: PathBuf,
        /// Path inside the archive
        path: String,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve a virtual path through the configured load order
    Cat {
        /// JSON resolver configuration
        #[arg(long, env = "HORADRIC_CONFIG")]
        config: PathBuf,
        /// Override the archive directory from the configuration
        #[arg(long, env = "HORADRIC_BASE_PATH")]
        base_path: Option<PathBuf>,
        /// Virtual asset path
        path: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::List { archive } => list(&archive),
        Command::Info { archive } => info(&archive),
        Command::Extract {
            archive,
            path,
            output,
        } => extract(&archive, &path, output.as_deref()),
        Command::Cat {
            config,
            base_path,
            path,
        } => cat(&config, base_path, &path),
    }
}

fn open(path: &Path) -> Result<Archive> {
    Archive::open(path).with_context(|| format!("failed to open archive {}", path.display()))
}

fn list(path: &Path) -> Result<()> {
    let archive = open(path)?;
    let files = archive
        .list_files()
        .context("archive has no readable (listfile)")?;

    let mut stdout = std::io::stdout().lock();
    for file in files {
        writeln!(stdout, "{file}")?;
    }
    Ok(())
}

fn info(path: &Path) -> Result<()> {
    let archive = open(path)?;
    let header = archive.header();

    println!("Archive:        {}", path.display());
    println!("Format version: {}", header.format_version);
    println!("Archive size:   {} bytes", header.archive_size);
    println!("Sector size:    {} bytes", archive.sector_size());
    println!(
        "Hash table:     {} entries at 0x{:08X}",
        header.hash_table_entries, header.hash_table_offset
    );
    println!(
        "Block table:    {} entries at 0x{:08X}",
        header.block_table_entries, header.block_table_offset
    );
    println!("Indexed names:  {}", archive.hash_table().file_count());

    match archive.list_files() {
        Ok(files) => println!("Listfile:       {} entries", files.len()),
        Err(e) if e.is_not_found() => println!("Listfile:       none"),
        Err(e) => println!("Listfile:       unreadable ({e})"),
    }
    Ok(())
}

fn extract(archive_path: &Path, path: &str, output: Option<&Path>) -> Result<()> {
    let archive = open(archive_path)?;
    let data = archive
        .read_file(path)
        .with_context(|| format!("failed to read {path}"))?;

    match output {
        Some(output) => {
            std::fs::write(output, &data)
                .with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!("Extracted {path} ({} bytes) to {}", data.len(), output.display());
        }
        None => std::io::stdout().lock().write_all(&data)?,
    }
    Ok(())
}

fn cat(config_path: &Path, base_path: Option<PathBuf>, path: &str) -> Result<()> {
    let mut config = ResolverConfig::from_json_file(config_path)
        .with_context(|| format!("failed to load configuration {}", config_path.display()))?;
    if let Some(base_path) = base_path {
        config = config.with_base_path(base_path);
    }

    let base = config.base_path.clone();
    let resolver = AssetResolver::new(config)?;
    resolver.open_load_order().with_context(|| {
        format!(
            "check that the archives are present in {}",
            base.display()
        )
    })?;

    let data = resolver.load_file(path)?;
    std::io::stdout().lock().write_all(&data)?;
    Ok(())
}
