//! `postwire` error types.
//!
//! Server-side errors are not here: an `ErrorResponse` is a regular
//! emission, after which the session drains back to idle. [`Error`]
//! covers local failures, which (other than registration conflicts,
//! returned directly by the registry) are fatal to the session.
use std::{fmt, io};

use crate::{
    codec::{DecodeError, UnknownCodec},
    postgres::ProtocolError,
    session::PhaseError,
};

/// A specialized [`Result`] type for `postwire` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible errors from the `postwire` library.
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

/// All possible error kinds from the `postwire` library.
pub enum ErrorKind {
    /// Transport failure, including EOF mid message.
    Io(io::Error),
    /// Framing failure or a malformed/unknown mandatory message.
    Protocol(ProtocolError),
    /// A column value failed to decode.
    Decode(DecodeError),
    /// The session configuration named an unregistered codec.
    UnknownCodec(UnknownCodec),
    /// An operation was issued in the wrong phase.
    Phase(PhaseError),
    /// The session already hit a fatal error and is unusable.
    SessionClosed,
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                Self { kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<io::Error>e => ErrorKind::Io(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<UnknownCodec>e => ErrorKind::UnknownCodec(e));
from!(<PhaseError>e => ErrorKind::Phase(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::UnknownCodec(e) => e.fmt(f),
            Self::Phase(e) => e.fmt(f),
            Self::SessionClosed => f.write_str("session unusable after an earlier fatal error"),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
