use bytes::{Buf, BufMut, Bytes};

use crate::{
    common::ByteStr,
    postgres::{ProtocolError, protocol_err},
};

/// Nul string operation in [`BufMut`].
pub trait BufMutExt {
    /// Write string and nul termination.
    fn put_nul_string(&mut self, string: &str);
}

impl<B: BufMut> BufMutExt for B {
    fn put_nul_string(&mut self, string: &str) {
        self.put(string.as_bytes());
        self.put_u8(b'\0');
    }
}

/// Length checked cursor over a message body.
///
/// The `bytes` getters panic when the buffer runs short; a backend
/// could then take the session down with a truncated message. These
/// surface a [`ProtocolError`] instead.
pub trait BufExt {
    fn try_get_u8(&mut self) -> Result<u8, ProtocolError>;
    fn try_get_i16(&mut self) -> Result<i16, ProtocolError>;
    fn try_get_i32(&mut self) -> Result<i32, ProtocolError>;
    fn try_get_u32(&mut self) -> Result<u32, ProtocolError>;
    /// Split off the next `n` bytes of the body.
    fn try_next(&mut self, n: usize) -> Result<Bytes, ProtocolError>;
    /// Read a nul terminated string.
    fn try_get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError>;
}

macro_rules! check {
    ($self:ident,$n:expr) => {
        if $self.remaining() < $n {
            return Err(protocol_err!(
                "unexpected end of message body: expected {} more bytes, found {}",
                $n, $self.remaining(),
            ));
        }
    };
}

impl BufExt for Bytes {
    fn try_get_u8(&mut self) -> Result<u8, ProtocolError> {
        check!(self, 1);
        Ok(self.get_u8())
    }

    fn try_get_i16(&mut self) -> Result<i16, ProtocolError> {
        check!(self, 2);
        Ok(self.get_i16())
    }

    fn try_get_i32(&mut self) -> Result<i32, ProtocolError> {
        check!(self, 4);
        Ok(self.get_i32())
    }

    fn try_get_u32(&mut self) -> Result<u32, ProtocolError> {
        check!(self, 4);
        Ok(self.get_u32())
    }

    fn try_next(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        check!(self, n);
        Ok(self.split_to(n))
    }

    fn try_get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError> {
        let Some(end) = self.iter().position(|e| matches!(e, b'\0')) else {
            return Err(protocol_err!("postgres string missing nul termination"));
        };
        let string = self.split_to(end);
        self.advance(1);
        ByteStr::from_utf8(string)
            .map_err(|err| protocol_err!("non UTF-8 string in message: {err}"))
    }
}
