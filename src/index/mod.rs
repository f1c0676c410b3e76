//! Offset index over the members of a tar archive.
//!
//! A tar archive has to be scanned from the start to find any member. The
//! index records, for every regular file, where its header lives and how
//! long its data is, so a member can later be fetched with a single
//! positioned read.
//!
//! Members are keyed by a truncated MD5 of their canonical path (see
//! [`member_key`]). The original paths are not stored, which keeps the index
//! small for archives with hundreds of thousands of members; the price is
//! that a lookup miss can only report the key.
//!
//! - [`builder`]: one forward scan of the archive producing an [`ArchiveIndex`]
//! - [`store`]: the `key,start,size` text format on disk

pub mod builder;
pub mod store;

use std::collections::HashMap;
use std::fmt::Write;

use md5::{Digest, Md5};

use crate::error::{Error, Result};
use crate::tar::HEADER_SIZE;

/// Number of hex characters kept from the digest (64 of its 128 bits)
pub const KEY_LEN: usize = 16;

/// Lexically normalize a member path.
///
/// Repeated separators and `.` segments are removed, `..` cancels the
/// preceding segment (and is dropped at the root of an absolute path), and
/// a trailing separator is stripped. An empty result becomes `.`. The file
/// system is never consulted.
pub fn canonicalize(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            _ => parts.push(part),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Derive the lookup key of a member path.
///
/// The indexer and the extractor must both go through this function: any
/// difference in how they derive keys makes every lookup miss.
pub fn member_key(path: &str) -> String {
    let digest = Md5::digest(canonicalize(path).as_bytes());
    let mut key = String::with_capacity(KEY_LEN);
    for byte in digest.iter().take(KEY_LEN / 2) {
        let _ = write!(key, "{byte:02x}");
    }
    key
}

/// Location of one member inside the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIndex {
    /// Offset of the member's header block from the start of the archive
    pub start: u64,
    /// Logical (unpadded) data length
    pub size: u64,
}

impl FileIndex {
    /// Offset of the first data byte, `None` if a corrupt row points past `u64::MAX`
    pub fn data_offset(&self) -> Option<u64> {
        self.start.checked_add(HEADER_SIZE)
    }
}

/// Mapping from member key to location
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveIndex {
    files: HashMap<String, FileIndex>,
}

impl ArchiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member found while scanning.
    ///
    /// `path` is only used to describe a collision; nothing is overwritten.
    pub fn insert_unique(&mut self, path: &str, key: String, entry: FileIndex) -> Result<()> {
        use std::collections::hash_map::Entry;

        match self.files.entry(key) {
            Entry::Occupied(occupied) => Err(Error::DuplicateKey {
                path: path.to_string(),
                key: occupied.key().clone(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Insert a row read back from disk; a repeated key replaces the earlier row
    pub fn insert(&mut self, key: String, entry: FileIndex) -> Option<FileIndex> {
        self.files.insert(key, entry)
    }

    pub fn get(&self, key: &str) -> Option<&FileIndex> {
        self.files.get(key)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all member sizes
    pub fn total_size(&self) -> u64 {
        self.files.values().map(|f| f.size).sum()
    }

    /// Iterate over `(key, location)` pairs in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileIndex)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }
}
