//! The connection state machine.
//!
//! A [`Session`] owns one ready transport and translates the backend's
//! asynchronous message stream into a pull-based sequence of
//! [`Emission`]s. The caller submits a query with
//! [`simple_query`][Session::simple_query], then calls
//! [`next`][Session::next] until the session is idle again.
use bytes::Bytes;
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::{
    Result,
    codec::{Codec, Value, registry},
    common::ByteStr,
    error::ErrorKind,
    postgres::{
        BackendMessage, ErrorResponse, RawMessage,
        backend::FieldDescription,
        frontend, protocol_err,
    },
    transport::BufferedStream,
};

/// The phase of a session.
///
/// Exactly one of these at any point; the phase tells the caller
/// whether to send, to receive, or that the session is between
/// requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Between requests; `simple_query` is legal.
    Idle,
    /// A query cycle is running; keep pulling.
    Busy,
    /// The backend streams `CopyData` chunks; keep pulling.
    CopyOut,
    /// The caller drives; supply data or finish, then pull.
    CopyIn,
}

/// Backend cancellation key, vended by the handshake.
///
/// A host wanting protocol-level cancellation opens a second
/// connection carrying this key; that is outside this core.
#[derive(Debug, Clone, Copy)]
pub struct BackendKey {
    pub process_id: i32,
    pub secret_key: i32,
}

/// What the handshake collaborator hands over along with the ready
/// transport.
#[derive(Debug, Default)]
pub struct SessionConfig {
    /// The negotiated run-time parameters, kept live through
    /// `ParameterStatus` updates.
    pub parameters: HashMap<String, String>,
    /// Cancellation key, if the backend sent one.
    pub backend_key: Option<BackendKey>,
    /// Named codec to use instead of the process default.
    pub codec: Option<String>,
}

/// An asynchronous `NOTIFY` delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    /// The process ID of the notifying backend.
    pub process_id: i32,
    /// The channel the notify has been raised on.
    pub channel: ByteStr,
    /// The payload string, possibly empty.
    pub payload: ByteStr,
}

/// A parsed command tag, emitted once per completed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// The command word, e.g. `SELECT` or `INSERT`.
    pub command: ByteStr,
    /// Rows affected by the statement, 0 when the tag carries none.
    pub rows_affected: u64,
}

/// One logical item pulled from the session.
///
/// `next` returns `None` instead when the session reached idle, or as
/// the tick of a copy-in pull.
#[derive(Debug)]
pub enum Emission<'a> {
    /// A statement finished.
    Result(QueryResult),
    /// One row, borrowed from the session's row buffer.
    ///
    /// The buffer is reused: the view is valid until the next call on
    /// the session, copy the values out to retain them.
    Row(&'a [Value]),
    /// A server-side error. Keep pulling: the backend recovers on its
    /// own and the session drains back to idle.
    Error(ErrorResponse),
    /// One copy-out chunk. Boundaries carry no meaning.
    CopyData(Bytes),
    /// The copy stream was aborted, with the reason.
    CopyFail(ByteStr),
    /// An asynchronous notification.
    Notification(&'a Notification),
}

/// An operation was issued in the wrong phase.
///
/// This is a caller contract violation and fatal: the wire state can
/// no longer be trusted to line up with the machine.
#[derive(Debug)]
pub struct PhaseError {
    pub required: Phase,
    pub found: Phase,
}

impl std::error::Error for PhaseError { }

impl fmt::Display for PhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "operation requires the {:?} phase, but the session is {:?}",
            self.required, self.found,
        )
    }
}

/// What a pull produced, before borrowing the emission out of the
/// session.
enum Pulled {
    Result(QueryResult),
    Row,
    ServerError(ErrorResponse),
    CopyData(Bytes),
    CopyFail(ByteStr),
    Notification,
    Idle,
    CopyIn,
}

/// A postgres session over a ready transport.
///
/// Not safe for concurrent use: exactly one logical caller drives it,
/// and only the transport reads and writes inside
/// [`simple_query`][Session::simple_query] and [`next`][Session::next]
/// suspend.
#[derive(Debug)]
pub struct Session<IO> {
    stream: BufferedStream<IO>,
    phase: Phase,
    /// Column layout governing `DataRow` decoding, replaced by every
    /// `RowDescription`.
    description: Option<Vec<FieldDescription>>,
    /// Reused across rows; sized by the current description.
    row: Vec<Value>,
    codec: Arc<Codec>,
    notification: Option<Notification>,
    copy_in_data: Option<Bytes>,
    copy_in_finish: bool,
    parameters: HashMap<String, String>,
    backend_key: Option<BackendKey>,
    dead: bool,
}

impl<IO> Session<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a session over a transport that already finished the
    /// startup handshake.
    ///
    /// Freezes the codec registry; fails if `config` names an
    /// unregistered codec.
    pub fn new(io: IO, config: SessionConfig) -> Result<Self> {
        let codec = registry::resolve(config.codec.as_deref())?;
        Ok(Self {
            stream: BufferedStream::new(io),
            phase: Phase::Idle,
            description: None,
            row: Vec::new(),
            codec,
            notification: None,
            copy_in_data: None,
            copy_in_finish: false,
            parameters: config.parameters,
            backend_key: config.backend_key,
            dead: false,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The live run-time parameter map.
    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    pub fn backend_key(&self) -> Option<BackendKey> {
        self.backend_key
    }

    /// Submit a simple query.
    ///
    /// The query string may contain several statements; the session
    /// turns busy and the caller must drain with
    /// [`next`][Session::next] until idle before the next request.
    pub async fn simple_query(&mut self, sql: &str) -> Result<()> {
        self.ensure_alive()?;
        if self.phase != Phase::Idle {
            self.dead = true;
            return Err(PhaseError { required: Phase::Idle, found: self.phase }.into());
        }
        match self.submit(sql).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.dead = true;
                Err(err)
            }
        }
    }

    async fn submit(&mut self, sql: &str) -> Result<()> {
        self.stream.send(frontend::Query { sql })?;
        self.stream.flush().await?;
        self.phase = Phase::Busy;
        debug!(sql, "query submitted");
        Ok(())
    }

    /// Supply the next copy-in chunk, sent by the following
    /// [`next`][Session::next] call.
    ///
    /// The slot is taken on every pull and never reused; chunk
    /// boundaries do not have to line up with rows.
    pub fn set_copy_in_data(&mut self, data: impl Into<Bytes>) {
        self.copy_in_data = Some(data.into());
    }

    /// Mark the copy-in stream as finished; the following
    /// [`next`][Session::next] call sends `CopyDone` and resumes
    /// pulling the statement's trailers.
    pub fn set_copy_in_finish(&mut self) {
        self.copy_in_finish = true;
    }

    /// Pull the next emission.
    ///
    /// Drives the machine until an emission is produced, the session
    /// turns idle (`None` emission), or the copy-in phase wants input
    /// (`None` emission, phase [`Phase::CopyIn`]). A local error is
    /// fatal: the session refuses further use.
    pub async fn next(&mut self) -> Result<(Phase, Option<Emission<'_>>)> {
        self.ensure_alive()?;
        let pulled = match self.pull().await {
            Ok(pulled) => pulled,
            Err(err) => {
                self.dead = true;
                return Err(err);
            }
        };

        let emission = match pulled {
            Pulled::Result(result) => Some(Emission::Result(result)),
            Pulled::Row => Some(Emission::Row(&self.row)),
            Pulled::ServerError(err) => Some(Emission::Error(err)),
            Pulled::CopyData(data) => Some(Emission::CopyData(data)),
            Pulled::CopyFail(reason) => Some(Emission::CopyFail(reason)),
            Pulled::Notification => self.notification.as_ref().map(Emission::Notification),
            Pulled::Idle | Pulled::CopyIn => None,
        };

        Ok((self.phase, emission))
    }

    /// Send `Terminate` and drop the transport.
    pub async fn close(mut self) -> Result<()> {
        if !self.dead {
            self.stream.send(frontend::Terminate)?;
            self.stream.flush().await?;
        }
        Ok(())
    }

    fn ensure_alive(&self) -> Result<()> {
        match self.dead {
            true => Err(ErrorKind::SessionClosed.into()),
            false => Ok(()),
        }
    }

    async fn pull(&mut self) -> Result<Pulled> {
        loop {
            // copy-in is caller driven, nothing is received
            if self.phase == Phase::CopyIn {
                if self.copy_in_finish {
                    self.copy_in_finish = false;
                    self.copy_in_data = None;
                    self.stream.send(frontend::CopyDone)?;
                    self.stream.flush().await?;
                    self.phase = Phase::Busy;
                    debug!("copy-in finished");
                    continue;
                }
                if let Some(data) = self.copy_in_data.take() {
                    self.stream.send(frontend::CopyData { data })?;
                    self.stream.flush().await?;
                }
                return Ok(Pulled::CopyIn);
            }

            let frame: RawMessage = self.stream.recv().await?;
            trace!(tag = %(frame.tag as char), len = frame.body.len(), "backend message");
            let message = BackendMessage::decode(frame.tag, frame.body)?;

            // asynchronous messages are legal in any receiving phase
            match message {
                BackendMessage::NotificationResponse(n) => {
                    debug!(channel = %n.channel, "notification");
                    self.notification = Some(Notification {
                        process_id: n.process_id,
                        channel: n.channel,
                        payload: n.payload,
                    });
                    return Ok(Pulled::Notification);
                }
                BackendMessage::NoticeResponse(notice) => {
                    debug!(
                        severity = notice.fields.severity(),
                        "server notice: {}",
                        notice.fields.message(),
                    );
                    continue;
                }
                BackendMessage::ParameterStatus(status) => {
                    debug!(name = %status.name, value = %status.value, "parameter status");
                    self.parameters.insert(status.name.to_string(), status.value.to_string());
                    continue;
                }
                // extended-protocol bookkeeping: acknowledged, nothing
                // to surface here
                BackendMessage::ParseComplete
                | BackendMessage::BindComplete
                | BackendMessage::CloseComplete
                | BackendMessage::NoData
                | BackendMessage::ParameterDescription
                | BackendMessage::BackendKeyData(_) => continue,
                message => {
                    let step = match self.phase {
                        Phase::Busy => self.on_busy(message)?,
                        Phase::CopyOut => self.on_copy_out(message)?,
                        Phase::Idle => {
                            return Err(protocol_err!(
                                "unexpected {} in idle phase", message.name(),
                            )
                            .into());
                        }
                        Phase::CopyIn => unreachable!("copy-in never receives"),
                    };
                    match step {
                        Some(pulled) => return Ok(pulled),
                        None => continue,
                    }
                }
            }
        }
    }

    fn on_busy(&mut self, message: BackendMessage) -> Result<Option<Pulled>> {
        match message {
            BackendMessage::CommandComplete(cmd) => {
                Ok(Some(Pulled::Result(parse_command_tag(&cmd.tag))))
            }
            BackendMessage::RowDescription(rd) => {
                // not an emission of its own: it only configures the
                // rows that follow
                self.row.clear();
                self.row.resize(rd.fields.len(), Value::Null);
                self.description = Some(rd.fields);
                Ok(None)
            }
            BackendMessage::DataRow(dr) => {
                let Some(description) = &self.description else {
                    return Err(protocol_err!("DataRow before any RowDescription").into());
                };
                // columns past the described count are dropped, missing
                // or -1 length columns become null
                let mut columns = dr.into_columns();
                for (slot, field) in self.row.iter_mut().zip(description) {
                    *slot = match columns.next().transpose()? {
                        Some(Some(value)) => self.codec.decode(&value, field.oid)?,
                        Some(None) | None => Value::Null,
                    };
                }
                Ok(Some(Pulled::Row))
            }
            BackendMessage::EmptyQueryResponse => Ok(None),
            BackendMessage::ErrorResponse(err) => Ok(Some(Pulled::ServerError(err))),
            BackendMessage::ReadyForQuery(ready) => {
                self.phase = Phase::Idle;
                debug!(status = %(ready.status as char), "ready for query");
                Ok(Some(Pulled::Idle))
            }
            BackendMessage::CopyInResponse(_) => {
                self.phase = Phase::CopyIn;
                debug!("copy-in started");
                Ok(Some(Pulled::CopyIn))
            }
            BackendMessage::CopyOutResponse(_) => {
                self.phase = Phase::CopyOut;
                debug!("copy-out started");
                Ok(None)
            }
            message => {
                Err(protocol_err!("unexpected {} in busy phase", message.name()).into())
            }
        }
    }

    fn on_copy_out(&mut self, message: BackendMessage) -> Result<Option<Pulled>> {
        match message {
            BackendMessage::CopyData(data) => Ok(Some(Pulled::CopyData(data.data))),
            BackendMessage::CopyDone => {
                // the trailing CommandComplete and ReadyForQuery arrive
                // in the busy phase
                self.phase = Phase::Busy;
                debug!("copy-out finished");
                Ok(None)
            }
            BackendMessage::CopyFail(fail) => {
                self.phase = Phase::Busy;
                Ok(Some(Pulled::CopyFail(fail.message)))
            }
            BackendMessage::ErrorResponse(err) => {
                // the backend abandons the copy and recovers on its
                // own; ReadyForQuery follows
                self.phase = Phase::Busy;
                Ok(Some(Pulled::ServerError(err)))
            }
            message => {
                Err(protocol_err!("unexpected {} in copy-out phase", message.name()).into())
            }
        }
    }
}

/// Parse a command tag such as `SELECT 3` or `INSERT 0 1` into a
/// [`QueryResult`].
fn parse_command_tag(tag: &ByteStr) -> QueryResult {
    let mut words = tag.split_whitespace();
    let Some(command) = words.next() else {
        return QueryResult { command: ByteStr::default(), rows_affected: 0 };
    };

    let rows = words.next();
    let rows_affected = match command {
        // INSERT carries the (always zero) oid before the row count
        "INSERT" => words.next(),
        "SELECT" | "UPDATE" | "DELETE" | "MERGE" | "FETCH" | "MOVE" | "COPY" => rows,
        _ => None,
    }
    .and_then(|count| count.parse().ok())
    .unwrap_or_default();

    QueryResult { command: tag.slice_ref(command), rows_affected }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parsed(tag: &'static str) -> QueryResult {
        parse_command_tag(&ByteStr::from_static(tag))
    }

    #[test]
    fn command_tags() {
        assert_eq!(
            parsed("SELECT 3"),
            QueryResult { command: "SELECT".into(), rows_affected: 3 },
        );
        assert_eq!(
            parsed("INSERT 0 1"),
            QueryResult { command: "INSERT".into(), rows_affected: 1 },
        );
        assert_eq!(
            parsed("COPY 5"),
            QueryResult { command: "COPY".into(), rows_affected: 5 },
        );
        assert_eq!(
            parsed("CREATE TABLE"),
            QueryResult { command: "CREATE".into(), rows_affected: 0 },
        );
        assert_eq!(parsed("").command, "");
    }
}
