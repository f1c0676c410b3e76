use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderName, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::ReadAt;
use crate::error::{Error, Result};

/// Default number of retries for a single Range request
pub const DEFAULT_MAX_RETRY: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Positioned reads from a tar archive served over HTTP.
///
/// Each read is one `Range: bytes=a-b` GET. The server has to advertise
/// `Accept-Ranges: bytes` and a `Content-Length` when the reader is opened.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

fn open_error(url: &str, kind: io::ErrorKind, reason: &'static str) -> Error {
    Error::io(format!("failed to open {url}"), io::Error::new(kind, reason))
}

impl HttpRangeReader {
    /// Send a HEAD request to `url` and learn the archive size
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let head = client.head(&url).send().await?.error_for_status()?;
        let header = |name: HeaderName| head.headers().get(name).and_then(|v| v.to_str().ok());

        if !header(ACCEPT_RANGES).is_some_and(|v| v.contains("bytes")) {
            return Err(open_error(
                &url,
                io::ErrorKind::Unsupported,
                "remote server does not support Range requests",
            ));
        }

        let size = header(CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                open_error(
                    &url,
                    io::ErrorKind::InvalidData,
                    "remote server did not return Content-Length",
                )
            })?;

        debug!(url = %url, size, "opened remote archive");
        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
            max_retry: DEFAULT_MAX_RETRY,
        })
    }

    /// Set how many times a failed connection is retried per Range request
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// Send one Range GET for `start..=end`.
    ///
    /// Connect and timeout failures are retried with a growing pause; any
    /// reply other than 206 is an error, since a 200 would carry the whole
    /// archive.
    async fn request_range(&self, start: u64, end: u64) -> io::Result<Response> {
        let mut attempt = 0;
        loop {
            let sent = self
                .client
                .get(&self.url)
                .header(RANGE, format!("bytes={start}-{end}"))
                .send()
                .await;

            match sent {
                Ok(resp) if resp.status() == StatusCode::PARTIAL_CONTENT => return Ok(resp),
                Ok(resp) => {
                    return Err(io::Error::other(format!(
                        "range request for bytes {start}-{end} answered with status {}",
                        resp.status()
                    )));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if attempt >= self.max_retry {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, e));
                    }
                    attempt += 1;
                    warn!(
                        retry = attempt,
                        max_retry = self.max_retry,
                        error = %e,
                        "connection error, retrying range request"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(io::Error::other(e)),
            }
        }
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let wanted = usize::try_from(self.size - offset)
            .map_or(buf.len(), |rest| rest.min(buf.len()));
        let end = offset + wanted as u64 - 1;

        // Servers may split a range reply; keep asking for the remainder
        let mut received = 0;
        while received < wanted {
            let resp = self.request_range(offset + received as u64, end).await?;
            let bytes = resp.bytes().await.map_err(io::Error::other)?;
            if bytes.is_empty() {
                break;
            }

            let n = bytes.len().min(wanted - received);
            buf[received..received + n].copy_from_slice(&bytes[..n]);
            received += n;
            self.transferred_bytes.fetch_add(n as u64, Ordering::Relaxed);
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn transferred_bytes(&self) -> Option<u64> {
        Some(self.transferred_bytes.load(Ordering::Relaxed))
    }
}
