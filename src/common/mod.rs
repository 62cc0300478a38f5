//! Supporting utility types.
mod bytestr;
pub use bytestr::ByteStr;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
