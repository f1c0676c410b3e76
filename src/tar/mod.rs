//! Tape-archive (tar) header parsing.
//!
//! ## Architecture
//!
//! - [`structures`]: the 512-byte header block, entry types and PAX records
//! - [`parser`]: the sequential walker that visits every header in order
//!
//! ## Format Overview
//!
//! A tar file is a sequence of members. Each member is a 512-byte header
//! block followed by its data, padded with zeros to a multiple of 512 bytes.
//! The archive ends with zero blocks (or simply at end of file).
//!
//! ## Supported Features
//!
//! - POSIX ustar headers, including the `prefix` field
//! - GNU long names (`L` records) and GNU base-256 sizes
//! - PAX extended headers (`path` and `size` records)
//!
//! ## Limitations
//!
//! - No compressed archives
//! - Sparse files are reported but their data layout is not interpreted

mod parser;
mod structures;

pub use parser::{TarEntry, TarWalker};
pub use structures::*;
