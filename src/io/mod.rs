mod buffered;
mod http;
mod local;

pub use buffered::{DEFAULT_WINDOW, ReadAhead};
pub use http::{DEFAULT_MAX_RETRY, HttpRangeReader};
pub use local::LocalFileReader;

use async_trait::async_trait;
use std::io::{Error, ErrorKind, Result};

/// Trait for random access reading from a data source
///
/// Reads are positional: an implementation must not rely on a shared
/// cursor, so one reader can serve any number of callers.
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Bytes fetched over the network so far, for remote sources
    fn transferred_bytes(&self) -> Option<u64> {
        None
    }

    /// Fill `buf` completely from `offset`.
    ///
    /// Fails with [`ErrorKind::UnexpectedEof`] when the source ends first;
    /// the error message carries the number of bytes actually read.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..]).await?;
            if n == 0 {
                return Err(Error::new(
                    ErrorKind::UnexpectedEof,
                    ShortRead {
                        expected: buf.len() as u64,
                        got: filled as u64,
                    },
                ));
            }
            filled += n;
        }
        Ok(())
    }
}

/// Payload of the `UnexpectedEof` error returned by [`ReadAt::read_exact_at`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortRead {
    pub expected: u64,
    pub got: u64,
}

impl std::fmt::Display for ShortRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected {} bytes, got {}", self.expected, self.got)
    }
}

impl std::error::Error for ShortRead {}

/// In-memory source, handy for tests and for archives already loaded into RAM
#[async_trait]
impl ReadAt for Vec<u8> {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_exact_at_fills_buffer() {
        let data = b"0123456789".to_vec();
        let mut buf = [0u8; 4];
        data.read_exact_at(3, &mut buf).await.unwrap();
        assert_eq!(&buf, b"3456");
    }

    #[tokio::test]
    async fn test_read_exact_at_reports_short_read() {
        let data = b"0123456789".to_vec();
        let mut buf = [0u8; 8];
        let err = data.read_exact_at(6, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);

        let short = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<ShortRead>())
            .copied()
            .unwrap();
        assert_eq!(short, ShortRead { expected: 8, got: 4 });
    }

    #[tokio::test]
    async fn test_read_past_end_is_empty() {
        let data = b"abc".to_vec();
        let mut buf = [0u8; 2];
        assert_eq!(data.read_at(10, &mut buf).await.unwrap(), 0);
    }
}
