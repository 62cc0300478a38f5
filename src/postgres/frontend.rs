//! Frontend messages, encoded client to server.
use bytes::{BufMut, Bytes, BytesMut};

use super::{ProtocolEncode, ProtocolError, protocol_err};
use crate::ext::BufMutExt;

/// Write the buffer length at the first 4 bytes.
///
/// The length counts itself but not the message type byte, so `buf`
/// must start at the reserved length field.
fn pg_write_len(mut buf: &mut [u8]) -> Result<(), ProtocolError> {
    let size = buf.len();
    let Ok(size) = i32::try_from(size) else {
        return Err(protocol_err!("message size out of range for protocol: {size}"));
    };

    buf.put_i32(size);

    Ok(())
}

/// Identifies the message as a simple query.
///
/// The query string may contain several statements separated by
/// semicolons; responses for all of them arrive before a single
/// `ReadyForQuery`.
#[derive(Debug)]
pub struct Query<'a> {
    /// The query string itself.
    pub sql: &'a str,
}

impl Query<'_> {
    pub const TAG: u8 = b'Q';
}

impl ProtocolEncode for Query<'_> {
    fn encode(self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let offset = buf.len();

        buf.put_u8(Self::TAG);

        // reserve 4 bytes for length
        buf.put_u32(0);

        buf.put_nul_string(self.sql);

        // write the length, excluding the message type
        pg_write_len(&mut buf[offset + 1..])
    }
}

/// Identifies the message as COPY data.
///
/// Chunk boundaries carry no meaning; a logical row may be split
/// across any number of `CopyData` messages.
#[derive(Debug)]
pub struct CopyData {
    pub data: Bytes,
}

impl CopyData {
    pub const TAG: u8 = b'd';
}

impl ProtocolEncode for CopyData {
    fn encode(self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let offset = buf.len();

        buf.put_u8(Self::TAG);
        buf.put_u32(0);
        buf.put(self.data);

        pg_write_len(&mut buf[offset + 1..])
    }
}

/// Identifies the message as a COPY-complete indicator.
#[derive(Debug)]
pub struct CopyDone;

impl CopyDone {
    pub const TAG: u8 = b'c';
}

impl ProtocolEncode for CopyDone {
    fn encode(self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u8(Self::TAG);
        buf.put_i32(4);
        Ok(())
    }
}

/// Identifies the message as a termination.
///
/// Sent before an orderly close; the backend then closes its side.
#[derive(Debug)]
pub struct Terminate;

impl Terminate {
    pub const TAG: u8 = b'X';
}

impl ProtocolEncode for Terminate {
    fn encode(self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u8(Self::TAG);
        buf.put_i32(4);
        Ok(())
    }
}
