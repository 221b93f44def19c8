//! Engine-owned receive buffer and write helpers.
//!
//! Bytes are accumulated as they arrive and handed to [`wire::parse`] from
//! the start of the buffer; a complete response is cut off the front, so a
//! read that carried several responses is drained one at a time.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::parser::wire::{self, Mode, Parsed};
use crate::Result;

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Unparsed bytes received from the server.
#[derive(Debug)]
pub struct ReceiveBuffer {
    buf: BytesMut,
}

impl ReceiveBuffer {
    /// An empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Reads whatever the stream has; `Ok(0)` means EOF.
    ///
    /// Cancel safe: nothing is lost if the future is dropped before it
    /// completes.
    ///
    /// # Errors
    ///
    /// Returns the transport's I/O error.
    pub async fn fill<S>(&mut self, stream: &mut S) -> Result<usize>
    where
        S: AsyncRead + Unpin,
    {
        if self.buf.capacity() - self.buf.len() < DEFAULT_BUFFER_SIZE / 4 {
            self.buf.reserve(DEFAULT_BUFFER_SIZE);
        }
        Ok(stream.read_buf(&mut self.buf).await?)
    }

    /// Parses the first complete response and drops its bytes.
    ///
    /// On [`Parsed::NeedsMoreData`] nothing is consumed.
    pub fn next_response(&mut self, mode: Mode) -> Parsed {
        let parsed = wire::parse(&self.buf, mode);
        match &parsed {
            Parsed::Ok { consumed, .. } | Parsed::Error { consumed, .. } => {
                self.buf.advance(*consumed);
            }
            Parsed::NeedsMoreData => {}
        }
        parsed
    }

    /// Number of unparsed bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drops everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `data` in full and flushes.
///
/// # Errors
///
/// Returns the transport's I/O error.
pub async fn write_all<S>(stream: &mut S, data: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(data).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;
    use crate::parser::{Response, UntaggedResponse};

    #[tokio::test]
    async fn test_response_split_across_reads() {
        let mut mock = Builder::new()
            .read(b"* 3 EXI")
            .read(b"STS\r\nx1 OK done\r\n")
            .build();
        let mut buffer = ReceiveBuffer::new();

        buffer.fill(&mut mock).await.unwrap();
        assert!(matches!(
            buffer.next_response(Mode::Response),
            Parsed::NeedsMoreData
        ));
        assert_eq!(buffer.len(), 7);

        buffer.fill(&mut mock).await.unwrap();
        let Parsed::Ok { response, .. } = buffer.next_response(Mode::Response) else {
            panic!("expected EXISTS");
        };
        assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(3)));

        let Parsed::Ok { response, .. } = buffer.next_response(Mode::Response) else {
            panic!("expected tagged OK");
        };
        assert!(matches!(response, Response::Tagged { .. }));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_literal_waits_for_payload() {
        let mut mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {5}\r\nhel")
            .read(b"lo)\r\n")
            .build();
        let mut buffer = ReceiveBuffer::new();

        buffer.fill(&mut mock).await.unwrap();
        assert!(matches!(
            buffer.next_response(Mode::Response),
            Parsed::NeedsMoreData
        ));
        buffer.fill(&mut mock).await.unwrap();
        assert!(matches!(
            buffer.next_response(Mode::Response),
            Parsed::Ok { .. }
        ));
    }

    #[tokio::test]
    async fn test_eof_reads_zero() {
        let mut mock = Builder::new().build();
        let mut buffer = ReceiveBuffer::new();
        assert_eq!(buffer.fill(&mut mock).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_line_is_consumed() {
        let mut mock = Builder::new().read(b"garbage\r\n* 2 EXISTS\r\n").build();
        let mut buffer = ReceiveBuffer::new();
        buffer.fill(&mut mock).await.unwrap();
        assert!(matches!(
            buffer.next_response(Mode::Response),
            Parsed::Error { .. }
        ));
        assert!(matches!(
            buffer.next_response(Mode::Response),
            Parsed::Ok { .. }
        ));
    }

    #[tokio::test]
    async fn test_write_all_flushes_exact_bytes() {
        let mut mock = Builder::new().write(b"x1 NOOP\r\n").build();
        write_all(&mut mock, b"x1 NOOP\r\n").await.unwrap();
    }
}
