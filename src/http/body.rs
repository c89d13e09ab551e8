use super::request::BodyFraming;
use bytes::{Buf, Bytes, BytesMut};
use std::future::Future;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest chunk-size or trailer line accepted in a chunked body
const MAX_CHUNK_LINE: usize = 4096;
/// Spare capacity reserved before each socket read
const READ_CHUNK: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Body truncated: received {received} of {expected} bytes")]
    Truncated { expected: usize, received: usize },
    #[error("Connection closed inside a chunked body")]
    UnexpectedEof,
    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),
}

/// Source of a request body
///
/// The handler reads the whole body at most once. Reading again after a
/// successful read yields an empty body.
pub trait RequestBody: Send {
    fn read_to_end(&mut self) -> impl Future<Output = Result<Bytes, BodyError>> + Send;
}

/// An already buffered body
impl RequestBody for Bytes {
    async fn read_to_end(&mut self) -> Result<Bytes, BodyError> {
        Ok(std::mem::take(self))
    }
}

/// Reads more bytes from `stream` into `buf`, returning 0 at end of stream
pub(crate) async fn read_more<S>(stream: &mut S, buf: &mut BytesMut) -> io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    buf.reserve(READ_CHUNK);
    stream.read_buf(buf).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Unread,
    Complete,
    Failed,
}

/// Body of a request arriving on a connection
///
/// Bytes already buffered after the request head are consumed first. Bytes
/// read past the end of the body stay in the buffer for the next request.
pub(crate) struct BodyReader<'a, S> {
    stream: &'a mut S,
    buf: &'a mut BytesMut,
    framing: BodyFraming,
    expect_continue: bool,
    state: BodyState,
}

impl<'a, S> BodyReader<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(
        stream: &'a mut S,
        buf: &'a mut BytesMut,
        framing: BodyFraming,
        expect_continue: bool,
    ) -> Self {
        let state = if framing == BodyFraming::Empty {
            BodyState::Complete
        } else {
            BodyState::Unread
        };
        Self {
            stream,
            buf,
            framing,
            expect_continue,
            state,
        }
    }

    /// Whether the body was consumed exactly, leaving the connection reusable
    pub(crate) fn is_complete(&self) -> bool {
        self.state == BodyState::Complete
    }

    async fn send_continue(&mut self) -> io::Result<()> {
        self.stream.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        self.stream.flush().await
    }

    async fn fill_to(&mut self, len: usize) -> Result<(), BodyError> {
        while self.buf.len() < len {
            if read_more(&mut *self.stream, &mut *self.buf).await? == 0 {
                return Err(BodyError::UnexpectedEof);
            }
        }
        Ok(())
    }

    async fn read_length(&mut self, len: usize) -> Result<Bytes, BodyError> {
        match self.fill_to(len).await {
            Err(BodyError::UnexpectedEof) => Err(BodyError::Truncated {
                expected: len,
                received: self.buf.len(),
            }),
            Err(e) => Err(e),
            Ok(()) => Ok(self.buf.split_to(len).freeze()),
        }
    }

    async fn read_line(&mut self) -> Result<String, BodyError> {
        loop {
            if let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") {
                let line = self.buf.split_to(pos);
                self.buf.advance(2);
                return String::from_utf8(line.to_vec())
                    .map_err(|_| BodyError::InvalidChunk("non-UTF-8 chunk line".to_string()));
            }
            if self.buf.len() > MAX_CHUNK_LINE {
                return Err(BodyError::InvalidChunk("chunk line too long".to_string()));
            }
            if read_more(&mut *self.stream, &mut *self.buf).await? == 0 {
                return Err(BodyError::UnexpectedEof);
            }
        }
    }

    async fn read_chunked(&mut self) -> Result<Bytes, BodyError> {
        let mut body = BytesMut::new();
        loop {
            let line = self.read_line().await?;
            // Chunk extensions follow a ';' and carry nothing we use.
            let size = line.split(';').next().unwrap_or_default().trim();
            if size.is_empty() || !size.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(BodyError::InvalidChunk(format!("bad chunk size {size:?}")));
            }
            let size = usize::from_str_radix(size, 16)
                .map_err(|e| BodyError::InvalidChunk(format!("bad chunk size {size:?}: {e}")))?;

            if size == 0 {
                // Trailer fields, up to the terminating empty line.
                while !self.read_line().await?.is_empty() {}
                return Ok(body.freeze());
            }

            let framed = size
                .checked_add(2)
                .ok_or_else(|| BodyError::InvalidChunk("chunk size overflow".to_string()))?;
            self.fill_to(framed).await?;
            if &self.buf[size..framed] != b"\r\n" {
                return Err(BodyError::InvalidChunk(
                    "missing CRLF after chunk data".to_string(),
                ));
            }
            body.extend_from_slice(&self.buf[..size]);
            self.buf.advance(framed);
        }
    }
}

impl<S> RequestBody for BodyReader<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_to_end(&mut self) -> Result<Bytes, BodyError> {
        if self.state != BodyState::Unread {
            return Ok(Bytes::new());
        }

        if self.expect_continue {
            self.expect_continue = false;
            if let Err(e) = self.send_continue().await {
                self.state = BodyState::Failed;
                return Err(e.into());
            }
        }

        let result = match self.framing {
            BodyFraming::Empty => Ok(Bytes::new()),
            BodyFraming::Length(len) => self.read_length(len).await,
            BodyFraming::Chunked => self.read_chunked().await,
        };
        self.state = if result.is_ok() {
            BodyState::Complete
        } else {
            BodyState::Failed
        };
        result
    }
}
