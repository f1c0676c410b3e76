use super::ReadAt;
use async_trait::async_trait;
use std::io::Result;
use std::path::Path;

/// Local file reader with random access support
///
/// On unix every read is a `pread`, so one reader can be shared between
/// concurrent extractions. Elsewhere the seek-then-read pair is serialized
/// behind a lock.
pub struct LocalFileReader {
    #[cfg(unix)]
    file: std::fs::File,
    #[cfg(not(unix))]
    file: std::sync::Mutex<std::fs::File>,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();

        #[cfg(not(unix))]
        let file = std::sync::Mutex::new(file);

        Ok(Self { file, size })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_at(buf, offset)
        }

        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = self
                .file
                .lock()
                .map_err(|_| std::io::Error::other("archive handle lock poisoned"))?;
            file.seek(SeekFrom::Start(offset))?;
            file.read(buf)
        }
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_at_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"hello tar world").unwrap();

        let reader = LocalFileReader::new(&path).unwrap();
        assert_eq!(reader.size(), 15);

        let mut buf = [0u8; 3];
        reader.read_exact_at(6, &mut buf).await.unwrap();
        assert_eq!(&buf, b"tar");
    }

    #[tokio::test]
    async fn test_shared_reader_serves_interleaved_reads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"aaaabbbbcccc").unwrap();

        let reader = Arc::new(LocalFileReader::new(&path).unwrap());
        let tasks: Vec<_> = (0..3u64)
            .map(|i| {
                let reader = reader.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4];
                    reader.read_exact_at(i * 4, &mut buf).await.unwrap();
                    buf
                })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        assert_eq!(results, vec![*b"aaaa", *b"bbbb", *b"cccc"]);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = LocalFileReader::new(&dir.path().join("nope.tar")).err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
