//! # tarix
//!
//! Random-access extraction of individual members from large tar archives.
//!
//! A tar archive has no table of contents, so finding one member normally
//! means reading every header before it. For archives with hundreds of
//! thousands of small members on slow storage that is far too expensive per
//! lookup. `tarix` scans the archive once, records where every regular file
//! lives, and afterwards fetches any member with a single positioned read.
//!
//! ## Features
//!
//! - One-pass indexing of POSIX ustar, GNU and PAX archives
//! - Compact `key,start,size` text index keyed by a truncated MD5 of the
//!   canonical member path
//! - Extraction from local files or from HTTP/HTTPS URLs using Range requests
//! - Long-lived [`TarExtractor`] sessions for repeated lookups
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use tarix::{ArchiveSource, TarExtractor, build_index_from_path, store};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Index the archive once
//!     let index = build_index_from_path(Path::new("data.tar"), |_| {}).await?;
//!     store::save(&index, Path::new("data.tar.index.json")).await?;
//!
//!     // Then fetch members directly
//!     let source = ArchiveSource::parse("data.tar");
//!     let extractor = TarExtractor::open(&source, Path::new("data.tar.index.json")).await?;
//!     let bytes = extractor.extract("docs/readme.txt").await?;
//!     println!("{} bytes", bytes.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod extractor;
pub mod index;
pub mod io;
pub mod tar;

pub use cli::Cli;
pub use error::{Error, Result};
pub use extractor::{ArchiveSource, TarExtractor, extract_member, read_member, resolve_offset};
pub use index::builder::{Progress, build_index, build_index_from_path};
pub use index::{ArchiveIndex, FileIndex, canonicalize, member_key, store};
pub use io::{HttpRangeReader, LocalFileReader, ReadAhead, ReadAt};
