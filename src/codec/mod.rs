//! Value encoding and decoding keyed by server type oid.
//!
//! A [`Codec`] is a collection of [`Decoder`]/[`Encoder`] functions
//! used to translate between postgres text-format bytes and native
//! [`Value`]s. Decoders and encoders for the standard types are
//! preloaded and cannot be replaced, so that every consumer can rely
//! on the native type a standard column decodes to. Custom types,
//! arrays, composites and so on are supported by registering
//! additional functions, or a whole named codec selected at session
//! construction (see [`register_codec`]).
use bytes::Bytes;
use std::collections::HashMap;

use crate::postgres::Oid;

pub(crate) mod registry;
mod temporal;

pub use registry::{
    UnknownCodec, register_codec, register_decoder, register_default_decoder,
    register_default_encoder, register_encoder,
};

/// Oids of the types every codec handles out of the box.
///
/// <https://www.postgresql.org/docs/current/catalog-pg-type.html>
pub mod oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const DATE: Oid = 1082;
    pub const TIME: Oid = 1083;
    pub const TIMESTAMP: Oid = 1114;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const TIMETZ: Oid = 1266;
}

/// A native column value.
///
/// Anything without a registered decoder surfaces as [`Value::Bytes`]
/// holding the raw text-format bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Bytes),
    Date(time::Date),
    Time(time::Time),
    TimeTz(time::Time, time::UtcOffset),
    Timestamp(time::PrimitiveDateTime),
    TimestampTz(time::OffsetDateTime),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Converts postgres text-format bytes into a [`Value`].
pub type Decoder = fn(&[u8]) -> Result<Value, DecodeError>;

/// Converts a [`Value`] into postgres text-format bytes.
///
/// The target oid is passed so an encoder can specialize, e.g. bytea
/// hex escaping.
pub type Encoder = fn(&Value, Oid) -> Result<Bytes, EncodeError>;

/// An error when decoding a column value. Fatal to the pull it
/// happened in.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("non UTF-8 value: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("invalid integer: {0}")]
    Int(#[from] std::num::ParseIntError),
    #[error("invalid float: {0}")]
    Float(#[from] std::num::ParseFloatError),
    #[error("invalid bytea hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid date or time: {0}")]
    Temporal(#[from] time::error::Parse),
    #[error("{0}")]
    Malformed(&'static str),
}

/// An error when encoding a parameter value.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("cannot encode SQL NULL as text; send a null parameter instead")]
    Null,
}

/// An error when registering into a [`Codec`] or the global registry.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("a decoder already exists for oid {0}")]
    DecoderExists(Oid),
    #[error("an encoder already exists for oid {0}")]
    EncoderExists(Oid),
    #[error("a codec named {0:?} already exists")]
    NameTaken(String),
    #[error("the codec registry is frozen once a session has been opened")]
    Frozen,
}

/// A collection of encoders/decoders keyed by oid.
#[derive(Clone)]
pub struct Codec {
    decoders: HashMap<Oid, Decoder>,
    encoders: HashMap<Oid, Encoder>,
    default_decoder: Decoder,
    default_encoder: Encoder,
}

impl Codec {
    /// Create a codec with the standard types preloaded.
    pub fn new() -> Self {
        let mut decoders: HashMap<Oid, Decoder> = HashMap::new();
        decoders.insert(oid::BYTEA, decode_bytea);
        decoders.insert(oid::TIMESTAMPTZ, decode_timestamptz);
        decoders.insert(oid::TIMESTAMP, decode_timestamp);
        decoders.insert(oid::TIME, decode_time);
        decoders.insert(oid::TIMETZ, decode_timetz);
        decoders.insert(oid::DATE, decode_date);
        decoders.insert(oid::BOOL, decode_bool);
        decoders.insert(oid::INT2, decode_int);
        decoders.insert(oid::INT4, decode_int);
        decoders.insert(oid::INT8, decode_int);
        decoders.insert(oid::FLOAT4, decode_float4);
        decoders.insert(oid::FLOAT8, decode_float8);

        let mut encoders: HashMap<Oid, Encoder> = HashMap::new();
        for oid in decoders.keys() {
            encoders.insert(*oid, encode_text);
        }

        Self {
            decoders,
            encoders,
            default_decoder: decode_raw,
            default_encoder: encode_text,
        }
    }

    /// Register a decoder for the given `pg_type` oid.
    ///
    /// Decoders can only be registered once, and the standard types
    /// are preloaded: overriding them would break every consumer that
    /// relies on the native type a standard column decodes to.
    pub fn register_decoder(&mut self, oid: Oid, decoder: Decoder) -> Result<(), RegisterError> {
        if self.decoders.contains_key(&oid) {
            return Err(RegisterError::DecoderExists(oid));
        }
        self.decoders.insert(oid, decoder);
        Ok(())
    }

    /// Register an encoder for the given `pg_type` oid.
    ///
    /// Same one-shot semantics as [`register_decoder`][Self::register_decoder].
    pub fn register_encoder(&mut self, oid: Oid, encoder: Encoder) -> Result<(), RegisterError> {
        if self.encoders.contains_key(&oid) {
            return Err(RegisterError::EncoderExists(oid));
        }
        self.encoders.insert(oid, encoder);
        Ok(())
    }

    /// Replace the catch-all decoder used when no oid matches.
    pub fn register_default_decoder(&mut self, decoder: Decoder) {
        self.default_decoder = decoder;
    }

    /// Replace the catch-all encoder used when no oid matches.
    pub fn register_default_encoder(&mut self, encoder: Encoder) {
        self.default_encoder = encoder;
    }

    /// Decode text-format bytes of the given oid into a [`Value`].
    pub fn decode(&self, value: &[u8], oid: Oid) -> Result<Value, DecodeError> {
        let decoder = self.decoders.get(&oid).copied().unwrap_or(self.default_decoder);
        decoder(value)
    }

    /// Returns the encoder for the given oid, to feed prepared
    /// statement parameters.
    pub fn encoder_for(&self, oid: Oid) -> Encoder {
        self.encoders.get(&oid).copied().unwrap_or(self.default_encoder)
    }

    /// Encode a [`Value`] into text-format bytes for the given oid.
    pub fn encode(&self, value: &Value, oid: Oid) -> Result<Bytes, EncodeError> {
        self.encoder_for(oid)(value, oid)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("decoders", &self.decoders.keys())
            .field("encoders", &self.encoders.keys())
            .finish_non_exhaustive()
    }
}

fn text(value: &[u8]) -> Result<&str, DecodeError> {
    Ok(std::str::from_utf8(value)?)
}

/// Catch-all decoder: the raw text-format bytes.
pub fn decode_raw(value: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Bytes(Bytes::copy_from_slice(value)))
}

/// `t` or `f` on the wire.
pub fn decode_bool(value: &[u8]) -> Result<Value, DecodeError> {
    match value.first() {
        Some(byte) => Ok(Value::Bool(*byte == b't')),
        None => Err(DecodeError::Malformed("empty boolean value")),
    }
}

/// int2, int4 and int8 all widen to [`Value::Int`].
pub fn decode_int(value: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Int(text(value)?.parse()?))
}

pub fn decode_float8(value: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Float(text(value)?.parse()?))
}

/// float4 values are parsed then narrowed through `f32`, so the result
/// carries exactly the precision the wire value had.
pub fn decode_float4(value: &[u8]) -> Result<Value, DecodeError> {
    let wide: f64 = text(value)?.parse()?;
    Ok(Value::Float(wide as f32 as f64))
}

/// Hex-escaped bytea: `\x` followed by an even number of hex digits.
pub fn decode_bytea(value: &[u8]) -> Result<Value, DecodeError> {
    let Some(digits) = value.strip_prefix(b"\\x") else {
        return Err(DecodeError::Malformed("bytea value missing \\x prefix"));
    };
    Ok(Value::Bytes(Bytes::from(hex::decode(digits)?)))
}

pub fn decode_date(value: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Date(temporal::parse_date(text(value)?)?))
}

pub fn decode_time(value: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Time(temporal::parse_time(text(value)?)?))
}

pub fn decode_timetz(value: &[u8]) -> Result<Value, DecodeError> {
    let (time, offset) = temporal::parse_timetz(text(value)?)?;
    Ok(Value::TimeTz(time, offset))
}

pub fn decode_timestamp(value: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::Timestamp(temporal::parse_timestamp(text(value)?)?))
}

pub fn decode_timestamptz(value: &[u8]) -> Result<Value, DecodeError> {
    Ok(Value::TimestampTz(temporal::parse_timestamptz(text(value)?)?))
}

/// The default text encoder.
///
/// Integers as decimal digits, floats in fixed six-digit decimal,
/// booleans as `true`/`false`, timestamps as RFC3339-style text, byte
/// strings hex-escaped when targeting bytea and raw otherwise.
pub fn encode_text(value: &Value, oid: Oid) -> Result<Bytes, EncodeError> {
    Ok(match value {
        Value::Null => return Err(EncodeError::Null),
        Value::Bool(true) => Bytes::from_static(b"true"),
        Value::Bool(false) => Bytes::from_static(b"false"),
        Value::Int(int) => {
            let mut buf = itoa::Buffer::new();
            Bytes::copy_from_slice(buf.format(*int).as_bytes())
        }
        Value::Float(float) => Bytes::from(format!("{float:.6}")),
        Value::Bytes(bytes) if oid == self::oid::BYTEA => {
            Bytes::from(format!("\\x{}", hex::encode(bytes)))
        }
        Value::Bytes(bytes) => bytes.clone(),
        Value::Date(date) => Bytes::from(temporal::format_date(*date)),
        Value::Time(time) => Bytes::from(temporal::format_time(*time)),
        Value::TimeTz(time, offset) => Bytes::from(temporal::format_timetz(*time, *offset)),
        Value::Timestamp(dt) => Bytes::from(temporal::format_timestamp(*dt)),
        Value::TimestampTz(dt) => Bytes::from(temporal::format_timestamptz(*dt)),
    })
}
