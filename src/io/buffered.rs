use async_trait::async_trait;
use std::io::Result;
use std::sync::{Arc, Mutex};

use super::ReadAt;

/// Default read-ahead window: 1 MiB
pub const DEFAULT_WINDOW: usize = 1024 * 1024;

/// Forward read-ahead over another [`ReadAt`].
///
/// Indexing visits every 512-byte header in order. Against a remote archive
/// that is one round trip per member, so small reads are served from a single
/// cached window that is refilled whenever a read falls outside it.
pub struct ReadAhead<R: ReadAt + ?Sized> {
    inner: Arc<R>,
    window: usize,
    cached: Mutex<Option<Window>>,
}

struct Window {
    start: u64,
    data: Vec<u8>,
}

impl Window {
    fn copy_into(&self, offset: u64, buf: &mut [u8]) -> Option<usize> {
        let end = self.start + self.data.len() as u64;
        if offset < self.start || offset >= end {
            return None;
        }
        let from = (offset - self.start) as usize;
        let n = buf.len().min(self.data.len() - from);
        buf[..n].copy_from_slice(&self.data[from..from + n]);
        Some(n)
    }
}

impl<R: ReadAt + ?Sized> ReadAhead<R> {
    pub fn new(inner: Arc<R>) -> Self {
        Self::with_window(inner, DEFAULT_WINDOW)
    }

    pub fn with_window(inner: Arc<R>, window: usize) -> Self {
        Self {
            inner,
            window: window.max(1),
            cached: Mutex::new(None),
        }
    }

    fn read_cached(&self, offset: u64, buf: &mut [u8]) -> Option<usize> {
        let guard = self.cached.lock().ok()?;
        guard.as_ref()?.copy_into(offset, buf)
    }

    fn store(&self, window: Window) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some(window);
        }
    }
}

#[async_trait]
impl<R: ReadAt + ?Sized> ReadAt for ReadAhead<R> {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.len() >= self.window {
            return self.inner.read_at(offset, buf).await;
        }

        if let Some(n) = self.read_cached(offset, buf) {
            return Ok(n);
        }

        let size = self.inner.size();
        if offset >= size {
            return Ok(0);
        }
        let len = (size - offset).min(self.window as u64) as usize;
        let mut data = vec![0u8; len];
        self.inner.read_exact_at(offset, &mut data).await?;

        let window = Window {
            start: offset,
            data,
        };
        let n = window.copy_into(offset, buf).unwrap_or(0);
        self.store(window);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn transferred_bytes(&self) -> Option<u64> {
        self.inner.transferred_bytes()
    }
}
