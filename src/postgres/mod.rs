//! Postgres wire protocol.
//!
//! Frontend (client to server) messages live in [`frontend`],
//! backend (server to client) messages in [`backend`].
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::BytesMut;
use std::ops::ControlFlow;

use crate::common::BoxError;

pub mod backend;
pub mod frontend;
mod error_response;

pub use backend::{BackendMessage, RawMessage};
pub use error_response::{ErrorFields, ErrorResponse};

/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// Buffered protocol encoding.
///
/// The message writes itself into the provided `buf`.
pub trait ProtocolEncode {
    fn encode(self, buf: &mut BytesMut) -> Result<(), ProtocolError>;
}

/// Buffered protocol decoding.
///
/// If decode returns [`ControlFlow::Continue`], more read is performed
/// until the *total length* in `Continue` is buffered, and decode is
/// called again. In that case the given `BytesMut` must not have been
/// modified, so that further reads append in order.
///
/// If decode returns [`ControlFlow::Break`], exactly one message has
/// been split off the buffer; leftover bytes belong to the next message.
pub trait ProtocolDecode: Sized {
    fn decode(buf: &mut BytesMut) -> Result<ControlFlow<Self, usize>, ProtocolError>;
}

/// An error when translating the wire buffer.
///
/// Framing and parse errors are fatal to the session that hit them.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct ProtocolError {
    source: BoxError,
}

impl ProtocolError {
    /// Create new [`ProtocolError`].
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self { source: source.into() }
    }
}

macro_rules! protocol_err {
    ($($tt:tt)*) => {
        crate::postgres::ProtocolError::new(format!($($tt)*))
    };
}

pub(crate) use protocol_err;
