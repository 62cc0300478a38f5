//! Buffered framed stream over an opaque byte transport.
use bytes::BytesMut;
use std::{io, ops::ControlFlow};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    Result,
    postgres::{ProtocolDecode, ProtocolEncode, ProtocolError},
};

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Buffered read and write over a full-duplex byte stream.
///
/// The transport itself is opaque: a TCP stream, a TLS stream, or an
/// in-memory pipe in tests. The handshake collaborator hands over a
/// stream that already finished startup and authentication.
#[derive(Debug)]
pub struct BufferedStream<IO> {
    io: IO,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl<IO> BufferedStream<IO> {
    pub fn new(io: IO) -> Self {
        Self {
            io,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
        }
    }

    /// Consume self into the underlying transport.
    pub fn into_inner(self) -> IO {
        self.io
    }
}

impl<IO> BufferedStream<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    /// Write a message to the write buffer, this does not write to the
    /// underlying io.
    pub fn send<E: ProtocolEncode>(&mut self, message: E) -> Result<(), ProtocolError> {
        message.encode(&mut self.write_buf)
    }

    /// Write buffered messages to the underlying io.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.io.write_all_buf(&mut self.write_buf).await?;
        self.io.flush().await
    }

    /// Receive a single message.
    ///
    /// The decoder reports how many buffered bytes it needs before it
    /// can split a full frame off; reads append to the buffer until
    /// that point. An EOF mid-frame is a fatal framing failure.
    pub async fn recv<D: ProtocolDecode>(&mut self) -> Result<D> {
        loop {
            #[cfg(debug_assertions)]
            let prev = (self.read_buf.len(), self.read_buf.capacity());
            match D::decode(&mut self.read_buf)? {
                ControlFlow::Continue(expect) => {
                    debug_assert_eq!(prev, (self.read_buf.len(), self.read_buf.capacity()));
                    self.read_buf.reserve(expect.saturating_sub(self.read_buf.len()));
                    while self.read_buf.len() < expect {
                        let read = self.io.read_buf(&mut self.read_buf).await?;
                        if read == 0 {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "connection closed by backend",
                            )
                            .into());
                        }
                    }
                }
                ControlFlow::Break(message) => return Ok(message),
            }
        }
    }
}
