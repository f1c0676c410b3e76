use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::io::{LocalFileReader, ReadAhead, ReadAt};
use crate::tar::TarWalker;

use super::{canonicalize, member_key, ArchiveIndex, FileIndex};

/// Scan position reported while indexing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Archive bytes consumed so far
    pub consumed: u64,
    /// Total archive size
    pub total: u64,
}

impl Progress {
    /// Whole percentage of the archive consumed, capped at 100
    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            return 100;
        }
        (self.consumed.min(self.total) * 100) / self.total
    }
}

/// Scan an archive once and index every regular file.
///
/// `progress` is called each time the whole percentage consumed changes; it
/// has no influence on the result.
///
/// # Errors
///
/// Fails on the first corrupt or truncated header, on any read error, and
/// with [`Error::DuplicateKey`] when two regular files map to the same key.
/// No partial index is returned.
pub async fn build_index<R: ReadAt>(
    reader: Arc<R>,
    mut progress: impl FnMut(Progress),
) -> Result<ArchiveIndex> {
    let mut walker = TarWalker::new(reader);
    let total = walker.archive_size();
    let mut index = ArchiveIndex::new();
    let mut last_percent = None;

    while let Some(entry) = walker.next_entry().await? {
        let report = Progress {
            consumed: walker.position(),
            total,
        };
        if last_percent != Some(report.percent()) {
            last_percent = Some(report.percent());
            progress(report);
        }

        if !entry.is_regular() {
            debug!(pos = entry.header_pos, kind = ?entry.entry_type, name = %entry.name, "skipping non-regular entry");
            continue;
        }

        let path = canonicalize(&entry.name);
        let key = member_key(&path);
        index.insert_unique(
            &path,
            key,
            FileIndex {
                start: entry.header_pos,
                size: entry.size,
            },
        )?;
    }

    info!(files = index.len(), bytes = total, "archive indexed");
    Ok(index)
}

/// Index a local tar file
pub async fn build_index_from_path(
    path: &Path,
    progress: impl FnMut(Progress),
) -> Result<ArchiveIndex> {
    let reader = LocalFileReader::new(path)
        .map_err(|e| Error::io(format!("failed to open tar file {}", path.display()), e))?;
    build_index(Arc::new(ReadAhead::new(Arc::new(reader))), progress).await
}
