//! PostgreSQL frontend/backend protocol driver core.
//!
//! This crate owns a single ready transport (startup and
//! authentication are a collaborator's concern) and drives the
//! connection state machine: it frames bytes both directions and
//! turns the backend's asynchronous message stream into a pull-based
//! sequence of emissions.
//!
//! # Examples
//!
//! Submit a query and drain the session:
//!
//! ```no_run
//! use postwire::{Emission, Phase, Session, SessionConfig};
//!
//! # async fn app(io: tokio::net::TcpStream) -> postwire::Result<()> {
//! let mut session = Session::new(io, SessionConfig::default())?;
//!
//! session.simple_query("SELECT generate_series(1, 3);").await?;
//!
//! loop {
//!     let (phase, emission) = session.next().await?;
//!     match emission {
//!         // the row view is only valid until the next pull
//!         Some(Emission::Row(row)) => println!("{row:?}"),
//!         Some(_) => {}
//!         None if phase == Phase::Idle => break,
//!         None => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Bulk-load with `COPY FROM STDIN`:
//!
//! ```no_run
//! use postwire::{Phase, Session, SessionConfig};
//!
//! # async fn app(mut session: Session<tokio::net::TcpStream>, chunks: Vec<Vec<u8>>) -> postwire::Result<()> {
//! session.simple_query("COPY foo FROM STDIN").await?;
//!
//! let mut chunks = chunks.into_iter();
//! loop {
//!     let (phase, _) = session.next().await?;
//!     if phase != Phase::CopyIn {
//!         continue;
//!     }
//!     match chunks.next() {
//!         Some(chunk) => session.set_copy_in_data(chunk),
//!         None => break session.set_copy_in_finish(),
//!     }
//! }
//!
//! // collect the trailing command tag and drain to idle
//! while session.next().await?.0 != Phase::Idle {}
//! # Ok(())
//! # }
//! ```

pub mod common;
mod ext;

// Protocol
pub mod postgres;
pub mod transport;

// Encoding
pub mod codec;

// Session
pub mod session;

mod error;

#[doc(inline)]
pub use codec::{
    Codec, Value, register_codec, register_decoder, register_default_decoder,
    register_default_encoder, register_encoder,
};
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use postgres::ErrorResponse;
#[doc(inline)]
pub use session::{
    BackendKey, Emission, Notification, Phase, QueryResult, Session, SessionConfig,
};
