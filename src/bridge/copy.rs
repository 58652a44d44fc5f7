//! One direction of the bridge
//!
//! Each half owns its buffer and loops read → write-all until EOF, a fatal
//! error, or the session going inactive. Reads use a bounded poll timeout so
//! a half whose peer went quiet still notices the other half's exit.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Bound on how long a half waits for readable data before re-checking the
/// session's active flag
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Bytes transferred by a finished bridge, per direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyResult {
    /// Bytes transferred from client to upstream
    pub client_to_upstream: u64,
    /// Bytes transferred from upstream to client
    pub upstream_to_client: u64,
}

impl CopyResult {
    /// Total bytes transferred in both directions
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.client_to_upstream + self.upstream_to_client
    }
}

/// Relay one direction until it terminates
///
/// * `initial` is written before anything is read from `src` (the replayed
///   sniff bytes on the client→upstream half).
/// * Reads time out every [`POLL_INTERVAL`]; a timeout with the session
///   inactive ends the half.
/// * Writes flush the exact byte count read; `write_all` retries partial
///   writes until everything is on the wire.
/// * EOF and fatal I/O errors both end the half; either way the `active`
///   flag is flipped and the destination's write side is shut down so the
///   peer observes the close.
///
/// Returns the number of payload bytes moved in this direction.
pub async fn copy_half<R, W>(
    mut src: R,
    mut dst: W,
    buffer_size: usize,
    active: Arc<AtomicBool>,
    direction: &'static str,
    initial: Option<Bytes>,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut transferred: u64 = 0;

    if let Some(initial) = initial {
        if !initial.is_empty() {
            if let Err(e) = dst.write_all(&initial).await {
                debug!(direction, error = %e, "Failed to replay initial bytes");
                active.store(false, Ordering::Release);
                let _ = dst.shutdown().await;
                return 0;
            }
            transferred += initial.len() as u64;
            trace!(direction, bytes = initial.len(), "Replayed initial bytes");
        }
    }

    let mut buf = vec![0u8; buffer_size];

    loop {
        let n = match timeout(POLL_INTERVAL, src.read(&mut buf)).await {
            // Poll tick: the other half may have torn the session down
            Err(_) => {
                if !active.load(Ordering::Acquire) {
                    trace!(direction, "Session inactive, exiting half");
                    break;
                }
                continue;
            }
            Ok(Ok(0)) => {
                debug!(direction, "EOF");
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) if retryable(&e) => continue,
            Ok(Err(e)) => {
                // Fatal read errors are EOF for this half
                debug!(direction, error = %e, "Read error, closing half");
                break;
            }
        };

        if let Err(e) = dst.write_all(&buf[..n]).await {
            debug!(direction, error = %e, "Write error, closing half");
            break;
        }
        transferred += n as u64;
    }

    active.store(false, Ordering::Release);

    // Half-close so the peer's read returns EOF
    let _ = dst.shutdown().await;

    transferred
}

fn retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_copy_half_simple() {
        let (mut src_w, src_r) = duplex(1024);
        let (dst_w, mut dst_r) = duplex(1024);
        let active = Arc::new(AtomicBool::new(true));

        src_w.write_all(b"hello world").await.unwrap();
        src_w.shutdown().await.unwrap();

        let n = copy_half(src_r, dst_w, 1024, Arc::clone(&active), "test", None).await;
        assert_eq!(n, 11);
        assert!(!active.load(Ordering::Acquire));

        let mut out = Vec::new();
        dst_r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn test_copy_half_initial_bytes_first() {
        let (mut src_w, src_r) = duplex(1024);
        let (dst_w, mut dst_r) = duplex(1024);
        let active = Arc::new(AtomicBool::new(true));

        src_w.write_all(b" rest").await.unwrap();
        src_w.shutdown().await.unwrap();

        let n = copy_half(
            src_r,
            dst_w,
            1024,
            active,
            "test",
            Some(Bytes::from_static(b"SSH-2.0")),
        )
        .await;
        assert_eq!(n, 12);

        let mut out = Vec::new();
        dst_r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"SSH-2.0 rest");
    }

    #[tokio::test]
    async fn test_copy_half_exits_on_inactive() {
        tokio::time::pause();

        let (_src_w, src_r) = duplex(1024);
        let (dst_w, _dst_r) = duplex(1024);
        let active = Arc::new(AtomicBool::new(false));

        // Source never produces data; the half must exit on its first poll
        // tick because the session is already inactive
        let n = copy_half(src_r, dst_w, 1024, active, "test", None).await;
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_copy_half_empty_initial() {
        let (mut src_w, src_r) = duplex(64);
        let (dst_w, mut dst_r) = duplex(64);
        let active = Arc::new(AtomicBool::new(true));

        src_w.write_all(b"x").await.unwrap();
        src_w.shutdown().await.unwrap();

        let n = copy_half(src_r, dst_w, 64, active, "test", Some(Bytes::new())).await;
        assert_eq!(n, 1);

        let mut out = Vec::new();
        dst_r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"x");
    }

    #[tokio::test]
    async fn test_copy_half_partial_writes_flushed() {
        // Destination pipe smaller than the payload: write_all must drain in
        // pieces while the reader consumes
        let (mut src_w, src_r) = duplex(8192);
        let (dst_w, mut dst_r) = duplex(16);
        let active = Arc::new(AtomicBool::new(true));

        let payload: Vec<u8> = (0..4096).map(|i| (i % 256) as u8).collect();
        let expected = payload.clone();

        let producer = tokio::spawn(async move {
            src_w.write_all(&payload).await.unwrap();
            src_w.shutdown().await.unwrap();
        });

        let copier = tokio::spawn(copy_half(src_r, dst_w, 1024, active, "test", None));

        let mut out = Vec::new();
        dst_r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, expected);

        producer.await.unwrap();
        assert_eq!(copier.await.unwrap(), 4096);
    }

    #[test]
    fn test_copy_result_total() {
        let result = CopyResult {
            client_to_upstream: 100,
            upstream_to_client: 200,
        };
        assert_eq!(result.total(), 300);
    }
}
