//! On-disk index format.
//!
//! One header line followed by one line per member:
//!
//! ```text
//! key,start,size
//! 3f2a9c0d1b7e6a54,0,13
//! ```
//!
//! `key` is the 16 hex character member key, `start` the offset of the
//! member's header block and `size` its data length, both in decimal. Row
//! order carries no meaning.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

use crate::error::{Error, Result};

use super::{ArchiveIndex, FileIndex};

/// Header line written at the top of every index
pub const HEADER: &str = "key,start,size";

/// Write `index` to `path`.
///
/// The rows go to a temporary file next to `path` which is renamed into
/// place once complete, so a failure never leaves a partial index behind.
pub async fn save(index: &ArchiveIndex, path: &Path) -> Result<()> {
    let tmp_path = temp_path(path);

    let result = async {
        let file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| Error::io(format!("failed to create index file {}", tmp_path.display()), e))?;
        let mut writer = BufWriter::new(file);
        write_index(index, &mut writer)
            .await
            .map_err(|e| Error::io(format!("failed to write index file {}", tmp_path.display()), e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| Error::io(format!("failed to write index file {}", tmp_path.display()), e))?;
        fs::rename(&tmp_path, path)
            .await
            .map_err(|e| Error::io(format!("failed to create index file {}", path.display()), e))
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    } else {
        debug!(path = %path.display(), files = index.len(), "index saved");
    }
    result
}

/// Serialize `index` in the text format, flushing `writer` at the end
pub async fn write_index<W: AsyncWrite + Unpin>(
    index: &ArchiveIndex,
    writer: &mut W,
) -> std::io::Result<()> {
    writer.write_all(HEADER.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    for (key, file) in index.iter() {
        let row = format!("{},{},{}\n", key, file.start, file.size);
        writer.write_all(row.as_bytes()).await?;
    }
    writer.flush().await
}

/// Read an index from `path`
pub async fn load(path: &Path) -> Result<ArchiveIndex> {
    let file = fs::File::open(path)
        .await
        .map_err(|e| Error::io(format!("failed to open index file {}", path.display()), e))?;
    let index = read_index(BufReader::new(file), path).await?;
    debug!(path = %path.display(), files = index.len(), "index loaded");
    Ok(index)
}

/// Parse the text format.
///
/// The first line is the header and is not inspected. Keys are taken
/// verbatim. Blank lines are skipped. Any malformed row fails the whole
/// read; `path` is only used in error messages.
pub async fn read_index<R: AsyncBufRead + Unpin>(reader: R, path: &Path) -> Result<ArchiveIndex> {
    let invalid = |line: usize, reason: String| Error::InvalidIndex {
        path: PathBuf::from(path),
        line,
        reason,
    };
    let read_error =
        |e: std::io::Error| Error::io(format!("failed to read index file {}", path.display()), e);

    let mut lines = reader.lines();
    if lines.next_line().await.map_err(read_error)?.is_none() {
        return Err(invalid(1, "missing header row".to_string()));
    }

    let mut index = ArchiveIndex::new();
    let mut line_no = 1;
    while let Some(line) = lines.next_line().await.map_err(read_error)? {
        line_no += 1;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        let [key, start, size] = fields.as_slice() else {
            return Err(invalid(
                line_no,
                format!("expected 3 columns, found {}", fields.len()),
            ));
        };

        let start = start
            .parse::<u64>()
            .map_err(|e| invalid(line_no, format!("invalid start value {start:?}: {e}")))?;
        let size = size
            .parse::<u64>()
            .map_err(|e| invalid(line_no, format!("invalid size value {size:?}: {e}")))?;

        index.insert(key.to_string(), FileIndex { start, size });
    }

    Ok(index)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::member_key;
    use tempfile::TempDir;

    async fn parse(text: &str) -> Result<ArchiveIndex> {
        read_index(text.as_bytes(), Path::new("test.index")).await
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tar.index.json");

        let mut index = ArchiveIndex::new();
        index.insert(member_key("file1.txt"), FileIndex { start: 0, size: 13 });
        index.insert(
            member_key("file2.txt"),
            FileIndex {
                start: 1024,
                size: 15,
            },
        );
        save(&index, &path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "key,start,size");
        assert!(lines.contains(&format!("{},0,13", member_key("file1.txt")).as_str()));
        assert!(!dir.path().join("a.tar.index.json.tmp").exists());

        assert_eq!(load(&path).await.unwrap(), index);
    }

    #[tokio::test]
    async fn test_header_only() {
        let index = parse("key,start,size\n").await.unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_header_is_not_validated() {
        let index = parse("whatever\nabc,1,2\n").await.unwrap();
        assert_eq!(index.get("abc"), Some(&FileIndex { start: 1, size: 2 }));
    }

    #[tokio::test]
    async fn test_key_taken_verbatim() {
        let index = parse("key,start,size\nnot-a-hash,512,7\n").await.unwrap();
        assert_eq!(
            index.get("not-a-hash"),
            Some(&FileIndex {
                start: 512,
                size: 7
            })
        );
    }

    #[tokio::test]
    async fn test_crlf_and_blank_lines() {
        let index = parse("key,start,size\r\n\r\nabc,0,1\r\n\n").await.unwrap();
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let err = parse("").await.unwrap_err();
        assert!(matches!(err, Error::InvalidIndex { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_wrong_column_count() {
        let err = parse("key,start,size\nabc,0,1\nabc,0\n").await.unwrap_err();
        match err {
            Error::InvalidIndex { line, reason, .. } => {
                assert_eq!(line, 3);
                assert!(reason.contains("3 columns"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(parse("key,start,size\na,1,2,3\n").await.is_err());
    }

    #[tokio::test]
    async fn test_non_numeric_values() {
        assert!(parse("key,start,size\nabc,zero,1\n").await.is_err());
        assert!(parse("key,start,size\nabc,0,-1\n").await.is_err());
        assert!(parse("key,start,size\nabc,0,\n").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("none.index")).await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
