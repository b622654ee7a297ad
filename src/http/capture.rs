//! Append-only capture of everything read from a socket.
//!
//! [`Capture`] wraps an `AsyncRead` and records every byte it reads, so the
//! exact stream can be replayed later even though it was consumed for
//! inspection.

use bytes::{Bytes, BytesMut};
use tokio::io::{self, AsyncRead, AsyncReadExt};

/// Initial capacity for the internal buffer.
const INITIAL_CAPACITY: usize = 8 * 1024;

/// A recording wrapper around an `AsyncRead`.
#[derive(Debug)]
pub struct Capture<R> {
    inner: R,
    buf: BytesMut,
    max_len: usize,
    taken: bool,
}

impl<R: AsyncRead + Unpin> Capture<R> {
    /// Creates a capture that refuses to grow beyond `max_len` bytes.
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_CAPACITY.min(max_len)),
            max_len,
            taken: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn unlimited(inner: R) -> Self {
        Self::new(inner, usize::MAX)
    }

    /// Everything captured so far.
    #[cfg(test)]
    pub(crate) fn buffer(&self) -> &[u8] {
        &self.buf[..]
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.max_len
    }

    /// Reads once from the inner reader and returns the newly captured bytes.
    ///
    /// An empty slice means the reader reached end-of-stream (or the capture is full).
    pub async fn read_more(&mut self) -> io::Result<&[u8]> {
        let start = self.buf.len();
        let max = self.max_len.saturating_sub(start);
        (&mut self.inner).take(max as u64).read_buf(&mut self.buf).await?;
        Ok(&self.buf[start..])
    }

    /// Hands out the captured bytes. Only the first call yields data.
    pub fn take(&mut self) -> Bytes {
        if self.taken {
            return Bytes::new();
        }
        self.taken = true;
        self.buf.split().freeze()
    }

    /// Mutable access to the inner stream, e.g. to write a reply on a socket.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
