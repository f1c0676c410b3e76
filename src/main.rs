//! Main entry point for the tarix CLI application.
//!
//! This binary indexes tar archives and extracts single members through the
//! index, from local files or HTTP URLs.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tarix::cli::{self, Command};
use tarix::{ArchiveSource, Cli, ReadAhead, ReadAt, TarExtractor, build_index, store};

/// Application entry point.
///
/// Parses command-line arguments (accepting the single-dash long flags of
/// earlier releases) and dispatches to the subcommand handler.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse_from(cli::normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    setup_logging(cli.verbose);

    match &cli.command {
        Command::Index {
            tar,
            output,
            read_ahead,
        } => {
            let output = output
                .clone()
                .unwrap_or_else(|| cli::default_index_path(tar));
            index_archive(&cli, tar, &output, *read_ahead).await
        }
        Command::Extract {
            tar,
            index,
            file,
            output,
        } => {
            let output = output
                .clone()
                .unwrap_or_else(|| cli::default_output_path(file));
            extract_file(&cli, tar, index, file, &output).await
        }
        Command::List { index } => list_index(index).await,
        Command::PrintFromPath { tar, index, file } => print_from_path(&cli, tar, index, file).await,
    }
}

/// Route `tracing` output to stderr.
///
/// `RUST_LOG` directives are honoured on top of the level chosen by `-v`.
fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

/// Open an archive location with the CLI's retry policy
async fn open_archive(cli: &Cli, tar: &str) -> Result<Arc<dyn ReadAt>> {
    let source = ArchiveSource::parse(tar);
    let reader = source
        .open(cli.retries)
        .await
        .with_context(|| format!("failed to open tar file {tar}"))?;
    Ok(reader)
}

/// Open the archive and load its index for one or more lookups
async fn open_extractor(cli: &Cli, tar: &str, index: &Path) -> Result<TarExtractor<dyn ReadAt>> {
    let loaded = store::load(index)
        .await
        .with_context(|| format!("failed to load index {}", index.display()))?;
    let reader = open_archive(cli, tar).await?;
    Ok(TarExtractor::new(reader, loaded))
}

/// Build the index for `tar` and save it to `output`.
async fn index_archive(cli: &Cli, tar: &str, output: &Path, read_ahead: usize) -> Result<()> {
    let reader = open_archive(cli, tar).await?;
    let reader = Arc::new(ReadAhead::with_window(reader, read_ahead));

    let quiet = cli.is_quiet();
    let index = build_index(reader.clone(), |progress| {
        if !quiet {
            eprint!("\rIndexing: {}% complete", progress.percent());
            let _ = std::io::stderr().flush();
        }
    })
    .await
    .map_err(|e| {
        let context = if e.is_corrupt_archive() {
            format!("{tar} is not a readable tar archive")
        } else {
            format!("failed to index {tar}")
        };
        anyhow::Error::new(e).context(context)
    })?;

    // Only write once the whole archive has been indexed successfully
    store::save(&index, output)
        .await
        .with_context(|| format!("failed to save index to {}", output.display()))?;

    info!(files = index.len(), output = %output.display(), "index written");
    if !quiet {
        eprintln!();
        println!("Created index with {} files", index.len());
        println!("Index saved to {}", output.display());
        print_transferred(reader.as_ref());
    }

    Ok(())
}

/// Extract one member to a file, or to stdout when `output` is `-`.
async fn extract_file(cli: &Cli, tar: &str, index: &Path, file: &str, output: &str) -> Result<()> {
    let extractor = open_extractor(cli, tar, index).await?;
    let data = extractor
        .extract(file)
        .await
        .with_context(|| format!("failed to extract {file}"))?;

    if output == "-" {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&data).await?;
        stdout.flush().await?;
        return Ok(());
    }

    // The output file is only created once the data is fully in memory
    tokio::fs::write(output, &data)
        .await
        .with_context(|| format!("failed to create output file {output}"))?;

    if !cli.is_quiet() {
        println!(
            "Extracted {} to {} (size: {} bytes)",
            file,
            output,
            data.len()
        );
    }

    Ok(())
}

/// Print the member count, total size and every key of an index.
async fn list_index(index: &Path) -> Result<()> {
    let loaded = store::load(index)
        .await
        .with_context(|| format!("failed to load index {}", index.display()))?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "TAR archive contains {} files", loaded.len())?;
    writeln!(
        stdout,
        "Total content size: {} bytes ({})",
        loaded.total_size(),
        format_size(loaded.total_size())
    )?;
    writeln!(stdout)?;
    writeln!(stdout, "Files:")?;
    for (key, file) in loaded.iter() {
        writeln!(stdout, "- {} ({} bytes)", key, file.size)?;
    }

    Ok(())
}

/// Print a member to stdout followed by a newline.
async fn print_from_path(cli: &Cli, tar: &str, index: &Path, file: &str) -> Result<()> {
    let extractor = open_extractor(cli, tar, index).await?;
    let data = extractor
        .extract(file)
        .await
        .with_context(|| format!("failed to extract {file}"))?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&data).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    Ok(())
}

/// Display network transfer statistics for HTTP sources
fn print_transferred(reader: &dyn ReadAt) {
    if let Some(transferred) = reader.transferred_bytes() {
        eprintln!("Total bytes transferred: {}", format_size(transferred));
    }
}

/// Byte count with a binary unit, e.g. `1.50 KB`
fn format_size(size: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if size < 1024 {
        return format!("{size} bytes");
    }
    let mut value = size as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
