//! The process-wide codec registry.
//!
//! Registration is a startup concern: every `register_*` call must
//! complete before the first session is opened. The registry freezes
//! at first use and later registrations fail deterministically, so a
//! race between setup and connection code cannot go unnoticed.
use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{
        Arc, LazyLock, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use super::{Codec, Decoder, Encoder, RegisterError};
use crate::postgres::Oid;

static REGISTRY: LazyLock<Registry> = LazyLock::new(|| Registry {
    inner: Mutex::new(Inner { default: Codec::new(), named: HashMap::new() }),
    frozen: AtomicBool::new(false),
});

struct Registry {
    inner: Mutex<Inner>,
    frozen: AtomicBool,
}

struct Inner {
    default: Codec,
    named: HashMap<String, Codec>,
}

fn check_open() -> Result<(), RegisterError> {
    if REGISTRY.frozen.load(Ordering::Acquire) {
        return Err(RegisterError::Frozen);
    }
    Ok(())
}

fn lock() -> std::sync::MutexGuard<'static, Inner> {
    REGISTRY.inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// Register a codec by name.
///
/// A session selects it by carrying the name in its configuration
/// (the `codec` connection-string key of the host).
pub fn register_codec(name: impl Into<String>, codec: Codec) -> Result<(), RegisterError> {
    check_open()?;
    match lock().named.entry(name.into()) {
        Entry::Occupied(entry) => Err(RegisterError::NameTaken(entry.key().clone())),
        Entry::Vacant(entry) => {
            entry.insert(codec);
            Ok(())
        }
    }
}

/// Register a decoder for the given oid on the process default codec.
///
/// See [`Codec::register_decoder`].
pub fn register_decoder(oid: Oid, decoder: Decoder) -> Result<(), RegisterError> {
    check_open()?;
    lock().default.register_decoder(oid, decoder)
}

/// Register an encoder for the given oid on the process default codec.
///
/// See [`Codec::register_encoder`].
pub fn register_encoder(oid: Oid, encoder: Encoder) -> Result<(), RegisterError> {
    check_open()?;
    lock().default.register_encoder(oid, encoder)
}

/// Replace the catch-all decoder of the process default codec.
pub fn register_default_decoder(decoder: Decoder) -> Result<(), RegisterError> {
    check_open()?;
    lock().default.register_default_decoder(decoder);
    Ok(())
}

/// Replace the catch-all encoder of the process default codec.
pub fn register_default_encoder(encoder: Encoder) -> Result<(), RegisterError> {
    check_open()?;
    lock().default.register_default_encoder(encoder);
    Ok(())
}

/// A session configuration named a codec nobody registered.
#[derive(Debug, thiserror::Error)]
#[error("no codec registered under {name:?}")]
pub struct UnknownCodec {
    pub name: String,
}

/// Resolve the effective codec for a new session, freezing the
/// registry.
pub(crate) fn resolve(name: Option<&str>) -> Result<Arc<Codec>, UnknownCodec> {
    REGISTRY.frozen.store(true, Ordering::Release);
    let inner = lock();
    match name {
        None => Ok(Arc::new(inner.default.clone())),
        Some(name) => match inner.named.get(name) {
            Some(codec) => Ok(Arc::new(codec.clone())),
            None => Err(UnknownCodec { name: name.into() }),
        },
    }
}
