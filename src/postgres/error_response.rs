use bytes::Bytes;
use std::{collections::HashMap, fmt};

use super::ProtocolError;
use crate::{common::ByteStr, ext::BufExt};

/// The identified fields of an `ErrorResponse` or `NoticeResponse`.
///
/// Fields can appear in any order, and more field types might be added
/// in the future; unrecognized fields are kept but ignored.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Debug)]
pub struct ErrorFields {
    fields: HashMap<u8, ByteStr>,
}

impl ErrorFields {
    pub(crate) fn decode(mut body: Bytes) -> Result<Self, ProtocolError> {
        let mut fields = HashMap::new();

        loop {
            // a zero field code terminates the list
            let code = body.try_get_u8()?;
            if code == b'\0' {
                break;
            }
            fields.insert(code, body.try_get_nul_bytestr()?);
        }

        Ok(Self { fields })
    }

    /// Raw access by field code.
    pub fn get(&self, code: u8) -> Option<&str> {
        self.fields.get(&code).map(ByteStr::as_str)
    }

    /// Severity: `ERROR`, `FATAL`, `PANIC`, or for notices `WARNING`,
    /// `NOTICE`, `DEBUG`, `INFO`, `LOG`. Always present.
    pub fn severity(&self) -> &str {
        self.get(b'S').unwrap_or_default()
    }

    /// The SQLSTATE code of the error. Always present.
    pub fn code(&self) -> &str {
        self.get(b'C').unwrap_or_default()
    }

    /// The primary human-readable message. Always present.
    pub fn message(&self) -> &str {
        self.get(b'M').unwrap_or_default()
    }

    /// An optional secondary message with more detail.
    pub fn detail(&self) -> Option<&str> {
        self.get(b'D')
    }

    /// An optional suggestion what to do about the problem.
    pub fn hint(&self) -> Option<&str> {
        self.get(b'H')
    }

    /// Error cursor position as an index into the original query string,
    /// measured in characters, first character is 1.
    pub fn position(&self) -> Option<u32> {
        self.get(b'P')?.parse().ok()
    }
}

/// Identifies the message as an error.
///
/// A server error is an emission, not an exception: the backend follows
/// it with `ReadyForQuery` once it has recovered, so the session stays
/// usable after draining.
pub struct ErrorResponse {
    pub fields: ErrorFields,
}

impl ErrorResponse {
    pub(crate) fn decode(body: Bytes) -> Result<Self, ProtocolError> {
        Ok(Self { fields: ErrorFields::decode(body)? })
    }

    /// SQLSTATE code, e.g. `22012` for division by zero.
    pub fn code(&self) -> &str {
        self.fields.code()
    }

    pub fn severity(&self) -> &str {
        self.fields.severity()
    }

    pub fn message(&self) -> &str {
        self.fields.message()
    }
}

impl std::error::Error for ErrorResponse { }

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}): {}", self.severity(), self.code(), self.message())?;
        if let Some(detail) = self.fields.detail() {
            write!(f, "; {detail}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn fields_by_code() {
        let mut body = BytesMut::new();
        body.put(&b"SERROR\0C22012\0Mdivision by zero\0P8\0\0"[..]);
        let err = ErrorResponse::decode(body.freeze()).unwrap();
        assert_eq!(err.severity(), "ERROR");
        assert_eq!(err.code(), "22012");
        assert_eq!(err.message(), "division by zero");
        assert_eq!(err.fields.position(), Some(8));
        assert_eq!(err.fields.detail(), None);
        assert_eq!(err.to_string(), "ERROR(22012): division by zero");
    }

    #[test]
    fn missing_terminator_errors() {
        let body = Bytes::from_static(b"SERROR\0");
        assert!(ErrorResponse::decode(body).is_err());
    }
}
