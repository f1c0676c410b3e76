use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::index::{ArchiveIndex, FileIndex, member_key, store};
use crate::io::{HttpRangeReader, LocalFileReader, ReadAt, ShortRead};

/// Find where a member lives.
///
/// The path is reduced to its key exactly as the indexer did; a miss is
/// reported by key since the index does not keep paths.
pub fn resolve_offset(index: &ArchiveIndex, member_path: &str) -> Result<FileIndex> {
    let key = member_key(member_path);
    index.get(&key).copied().ok_or(Error::NotFound { key })
}

/// Read exactly `file.size` bytes of member data.
///
/// # Errors
///
/// [`Error::ShortRead`] when the archive ends before `size` bytes are
/// available, which means the index does not belong to this archive.
/// Rows pointing past the end are rejected before anything is allocated.
pub async fn read_member<R: ReadAt + ?Sized>(reader: &R, file: FileIndex) -> Result<Vec<u8>> {
    let short = |got: u64| Error::ShortRead {
        expected: file.size,
        got,
    };

    let offset = file.data_offset().ok_or_else(|| short(0))?;
    let available = reader.size().saturating_sub(offset);
    if file.size > available {
        return Err(short(available));
    }
    let len = usize::try_from(file.size).map_err(|_| short(0))?;
    let mut buf = vec![0u8; len];

    match reader.read_exact_at(offset, &mut buf).await {
        Ok(()) => Ok(buf),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            let got = e
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<ShortRead>())
                .map_or(0, |short| short.got);
            Err(short(got))
        }
        Err(e) => Err(Error::io("failed to read file data", e)),
    }
}

/// Where the archive lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    Local(std::path::PathBuf),
    Http(String),
}

impl ArchiveSource {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            ArchiveSource::Http(location.to_string())
        } else {
            ArchiveSource::Local(location.into())
        }
    }

    /// Open the archive for positioned reads
    pub async fn open(&self, max_retry: u32) -> Result<Arc<dyn ReadAt>> {
        match self {
            ArchiveSource::Local(path) => {
                let reader = LocalFileReader::new(path).map_err(|e| {
                    Error::io(format!("failed to open tar file {}", path.display()), e)
                })?;
                Ok(Arc::new(reader))
            }
            ArchiveSource::Http(url) => {
                let reader = HttpRangeReader::new(url.clone())
                    .await?
                    .with_max_retry(max_retry);
                Ok(Arc::new(reader))
            }
        }
    }
}

/// Extract one member, opening the archive and loading the index fresh
pub async fn extract_member(
    archive: &ArchiveSource,
    index_path: &Path,
    member_path: &str,
) -> Result<Vec<u8>> {
    let extractor = TarExtractor::open(archive, index_path).await?;
    extractor.extract(member_path).await
}

/// Long-lived extraction session.
///
/// Owns an open archive and its loaded index so repeated lookups pay the
/// open and parse cost once. Reads are positional, so a session can be
/// shared behind an `Arc` by concurrent callers. Dropping the session
/// closes the archive.
pub struct TarExtractor<R: ReadAt + ?Sized> {
    reader: Arc<R>,
    index: ArchiveIndex,
}

impl TarExtractor<dyn ReadAt> {
    /// Load the index at `index_path` and open `archive`
    pub async fn open(archive: &ArchiveSource, index_path: &Path) -> Result<Self> {
        let index = store::load(index_path).await?;
        let reader = archive.open(crate::io::DEFAULT_MAX_RETRY).await?;
        Ok(Self { reader, index })
    }
}

impl<R: ReadAt + ?Sized> TarExtractor<R> {
    pub fn new(reader: Arc<R>, index: ArchiveIndex) -> Self {
        Self { reader, index }
    }

    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    /// Extract a member's bytes by path
    pub async fn extract(&self, member_path: &str) -> Result<Vec<u8>> {
        let file = resolve_offset(&self.index, member_path)?;
        debug!(
            member = member_path,
            start = file.start,
            size = file.size,
            "extracting member"
        );
        read_member(self.reader.as_ref(), file).await
    }
}
