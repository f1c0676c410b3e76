//! Sequential tar header walker.
//!
//! Unlike ZIP, a tar archive has no central directory: the only way to learn
//! where each member lives is to visit every header in order. The walker
//! keeps a running byte cursor and advances it past each header and its
//! padded data, whatever the entry type, so it never desynchronizes from the
//! block structure.
//!
//! Metadata entries (PAX extended headers, GNU long names) are consumed here
//! and folded into the entry they describe. The `header_pos` reported for an
//! entry is always the position of its own header block, so its data begins
//! exactly [`HEADER_SIZE`] bytes later.

use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::structures::*;

/// One member as seen by the walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    /// Offset of the member's own header block from the start of the archive
    pub header_pos: u64,
    /// Logical (unpadded) data length
    pub size: u64,
    /// Stored path, after applying any long-name or PAX override
    pub name: String,
    pub entry_type: EntryType,
}

impl TarEntry {
    pub fn data_offset(&self) -> u64 {
        self.header_pos + HEADER_SIZE
    }

    pub fn is_regular(&self) -> bool {
        self.entry_type == EntryType::Regular
    }
}

/// Overrides collected from metadata entries, applied to the next real entry
#[derive(Default)]
struct Pending {
    name: Option<String>,
    size: Option<u64>,
}

/// Walks the headers of a tar archive from start to end
pub struct TarWalker<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
    cursor: u64,
    finished: bool,
}

impl<R: ReadAt> TarWalker<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self {
            reader,
            size,
            cursor: 0,
            finished: false,
        }
    }

    /// Total byte length of the archive
    pub fn archive_size(&self) -> u64 {
        self.size
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Read the next real entry, or `None` at the end of the archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] for a corrupt header block,
    /// [`Error::Truncated`] when a header or its data runs past the end of
    /// the archive, and [`Error::Io`] if the source cannot be read.
    pub async fn next_entry(&mut self) -> Result<Option<TarEntry>> {
        let mut pending = Pending::default();

        loop {
            if self.finished {
                return Ok(None);
            }

            let header_pos = self.cursor;
            let Some(header) = self.read_header(header_pos).await? else {
                self.finished = true;
                return Ok(None);
            };

            let size = match header.entry_type {
                t if t.is_metadata() => header.size,
                _ => pending.size.unwrap_or(header.size),
            };

            // read_header only returns for a complete block, so this cannot overflow
            let data_start = header_pos + HEADER_SIZE;
            // The final member's padding may be cut short by some writers;
            // only the logical data has to be present.
            if size > self.size - data_start {
                return Err(Error::Truncated { offset: header_pos });
            }
            self.cursor = data_start.saturating_add(padded_size(size));

            match header.entry_type {
                EntryType::GnuLongName => {
                    let data = self.read_data(header_pos, size).await?;
                    pending.name = Some(trim_nul(&data));
                }
                EntryType::PaxExtended => {
                    let data = self.read_data(header_pos, size).await?;
                    let records = PaxRecords::parse(&data).map_err(|reason| {
                        Error::InvalidHeader {
                            offset: header_pos,
                            reason,
                        }
                    })?;
                    pending.name = records.path.or(pending.name);
                    pending.size = records.size.or(pending.size);
                }
                // Global records never name a member; link targets are not indexed
                EntryType::PaxGlobal | EntryType::GnuLongLink => {}
                entry_type => {
                    let entry = TarEntry {
                        header_pos,
                        size,
                        name: pending.name.take().unwrap_or(header.name),
                        entry_type,
                    };
                    trace!(pos = header_pos, size, name = %entry.name, "tar entry");
                    return Ok(Some(entry));
                }
            }
        }
    }

    /// Read and parse the header block at `pos`; `None` marks the end
    async fn read_header(&self, pos: u64) -> Result<Option<TarHeader>> {
        if pos >= self.size {
            return Ok(None);
        }
        if self.size - pos < BLOCK_SIZE {
            return Err(Error::Truncated { offset: pos });
        }

        let mut block = [0u8; BLOCK_SIZE as usize];
        self.reader
            .read_exact_at(pos, &mut block)
            .await
            .map_err(|e| Error::io("error reading tar header", e))?;

        if TarHeader::is_end_marker(&block) {
            return Ok(None);
        }

        TarHeader::from_block(&block)
            .map(Some)
            .map_err(|reason| Error::InvalidHeader {
                offset: pos,
                reason,
            })
    }

    async fn read_data(&self, header_pos: u64, size: u64) -> Result<Vec<u8>> {
        // Metadata records are small; refuse anything that looks like garbage.
        const MAX_METADATA: u64 = 1024 * 1024;
        if size > MAX_METADATA {
            return Err(Error::InvalidHeader {
                offset: header_pos,
                reason: format!("metadata entry of {size} bytes"),
            });
        }
        let mut data = vec![0u8; size as usize];
        self.reader
            .read_exact_at(header_pos + HEADER_SIZE, &mut data)
            .await
            .map_err(|e| Error::io("error reading tar metadata", e))?;
        Ok(data)
    }
}

fn trim_nul(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(f: impl FnOnce(&mut tar::Builder<Vec<u8>>)) -> Arc<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        f(&mut builder);
        Arc::new(builder.into_inner().unwrap())
    }

    fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, path, data).unwrap();
    }

    async fn collect(reader: Arc<Vec<u8>>) -> Vec<TarEntry> {
        let mut walker = TarWalker::new(reader);
        let mut entries = Vec::new();
        while let Some(entry) = walker.next_entry().await.unwrap() {
            entries.push(entry);
        }
        entries
    }

    #[tokio::test]
    async fn test_walks_padded_members() {
        let archive = build(|b| {
            append(b, "a.txt", b"Hello, World!");
            append(b, "b.txt", b"second");
        });

        let entries = collect(archive).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].header_pos, 0);
        assert_eq!(entries[0].size, 13);
        assert_eq!(entries[1].header_pos, 1024);
        assert_eq!(entries[1].name, "b.txt");
    }

    #[tokio::test]
    async fn test_directory_entries_are_reported() {
        let archive = build(|b| {
            let mut header = tar::Header::new_ustar();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
            b.append_data(&mut header, "dir/", std::io::empty()).unwrap();
        });

        let entries = collect(archive).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, EntryType::Directory);
        assert!(!entries[0].is_regular());
    }

    #[tokio::test]
    async fn test_gnu_long_name_is_folded() {
        let long = format!("{}/file.txt", "nested".repeat(30));
        let archive = build(|b| append(b, &long, b"payload"));

        let entries = collect(archive.clone()).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, long);

        // Data must sit right after the real header, not the long-name record
        let offset = entries[0].data_offset() as usize;
        assert_eq!(&archive[offset..offset + 7], b"payload");
    }

    #[tokio::test]
    async fn test_empty_archive() {
        assert!(collect(Arc::new(Vec::new())).await.is_empty());
        assert!(collect(Arc::new(vec![0u8; 1024])).await.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_data() {
        let archive = build(|b| append(b, "big.bin", &[1u8; 2000]));
        let cut = Arc::new(archive[..1000].to_vec());

        let mut walker = TarWalker::new(cut);
        let err = walker.next_entry().await.unwrap_err();
        assert!(matches!(err, Error::Truncated { offset: 0 }));
    }

    #[tokio::test]
    async fn test_partial_header_block() {
        let mut walker = TarWalker::new(Arc::new(vec![b'x'; 100]));
        let err = walker.next_entry().await.unwrap_err();
        assert!(matches!(err, Error::Truncated { offset: 0 }));
    }

    #[tokio::test]
    async fn test_cut_final_padding_is_accepted() {
        let archive = build(|b| append(b, "last.txt", b"Hello, World!"));
        let cut = Arc::new(archive[..512 + 13].to_vec());

        let entries = collect(cut).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 13);
    }

    #[tokio::test]
    async fn test_base256_size_past_end_is_truncated() {
        let mut header = tar::Header::new_gnu();
        header.set_path("huge.bin").unwrap();
        header.set_size(u64::MAX);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        let mut data = header.as_bytes().to_vec();
        data.extend_from_slice(&[0u8; 1024]);

        let mut walker = TarWalker::new(Arc::new(data));
        let err = walker.next_entry().await.unwrap_err();
        assert!(matches!(err, Error::Truncated { offset: 0 }));
    }

    #[tokio::test]
    async fn test_pax_size_past_end_is_truncated() {
        let archive = build(|b| {
            b.append_pax_extensions([("size", b"18446744073709551615".as_slice())])
                .unwrap();
            append(b, "huge.bin", b"");
        });

        let mut walker = TarWalker::new(archive);
        let err = walker.next_entry().await.unwrap_err();
        assert!(matches!(err, Error::Truncated { offset: 1024 }));
    }

    #[tokio::test]
    async fn test_pax_path_is_folded() {
        let archive = build(|b| {
            b.append_pax_extensions([("path", b"pax/renamed.txt".as_slice())])
                .unwrap();
            append(b, "short.txt", b"pax payload");
            append(b, "after.txt", b"next");
        });

        let entries = collect(archive.clone()).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "pax/renamed.txt");
        assert_eq!(entries[0].header_pos, 1024);
        let offset = entries[0].data_offset() as usize;
        assert_eq!(&archive[offset..offset + 11], b"pax payload");
        assert_eq!(entries[1].name, "after.txt");
    }

    #[tokio::test]
    async fn test_garbage_header() {
        let mut walker = TarWalker::new(Arc::new(vec![b'x'; 1024]));
        let err = walker.next_entry().await.unwrap_err();
        assert!(err.is_corrupt_archive());
    }
}
