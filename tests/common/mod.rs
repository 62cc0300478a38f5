//! Shared harness: byte-exact backend frames and a duplex-backed
//! session, so the suites can script a server response stream and
//! assert on everything the client writes.
#![allow(dead_code)]

use postwire::{
    Emission, Phase, QueryResult, Session, SessionConfig,
    codec::Value,
};
use tokio::io::{AsyncWriteExt, DuplexStream};

pub fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// A session whose peer already wrote the whole scripted response.
pub async fn session_over(script: Vec<u8>) -> (Session<DuplexStream>, DuplexStream) {
    session_with(script, SessionConfig::default()).await
}

pub async fn session_with(
    script: Vec<u8>,
    config: SessionConfig,
) -> (Session<DuplexStream>, DuplexStream) {
    let (client, mut server) = tokio::io::duplex(1 << 16);
    server.write_all(&script).await.unwrap();
    let session = Session::new(client, config).unwrap();
    (session, server)
}

// ===== backend frames =====

pub fn frame(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + body.len());
    buf.push(tag);
    buf.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
    buf.extend_from_slice(body);
    buf
}

pub fn row_description(columns: &[(&str, u32)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(columns.len() as i16).to_be_bytes());
    for (name, oid) in columns {
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(&0i32.to_be_bytes()); // table oid
        body.extend_from_slice(&0i16.to_be_bytes()); // attribute number
        body.extend_from_slice(&oid.to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes()); // type size
        body.extend_from_slice(&(-1i32).to_be_bytes()); // type modifier
        body.extend_from_slice(&0i16.to_be_bytes()); // format code
    }
    frame(b'T', &body)
}

pub fn data_row(columns: &[Option<&[u8]>]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(columns.len() as i16).to_be_bytes());
    for column in columns {
        match column {
            Some(value) => {
                body.extend_from_slice(&(value.len() as i32).to_be_bytes());
                body.extend_from_slice(value);
            }
            None => body.extend_from_slice(&(-1i32).to_be_bytes()),
        }
    }
    frame(b'D', &body)
}

pub fn command_complete(tag: &str) -> Vec<u8> {
    let mut body = tag.as_bytes().to_vec();
    body.push(0);
    frame(b'C', &body)
}

pub fn ready_for_query() -> Vec<u8> {
    frame(b'Z', b"I")
}

pub fn empty_query_response() -> Vec<u8> {
    frame(b'I', b"")
}

pub fn error_response(fields: &[(u8, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (code, value) in fields {
        body.push(*code);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
    }
    body.push(0);
    frame(b'E', &body)
}

pub fn notice_response(fields: &[(u8, &str)]) -> Vec<u8> {
    let mut response = error_response(fields);
    response[0] = b'N';
    response
}

pub fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(name.as_bytes());
    body.push(0);
    body.extend_from_slice(value.as_bytes());
    body.push(0);
    frame(b'S', &body)
}

pub fn notification(process_id: i32, channel: &str, payload: &str) -> Vec<u8> {
    let mut body = process_id.to_be_bytes().to_vec();
    body.extend_from_slice(channel.as_bytes());
    body.push(0);
    body.extend_from_slice(payload.as_bytes());
    body.push(0);
    frame(b'A', &body)
}

fn copy_response(tag: u8, columns: i16) -> Vec<u8> {
    let mut body = vec![0u8]; // textual copy
    body.extend_from_slice(&columns.to_be_bytes());
    for _ in 0..columns {
        body.extend_from_slice(&0i16.to_be_bytes());
    }
    frame(tag, &body)
}

pub fn copy_in_response(columns: i16) -> Vec<u8> {
    copy_response(b'G', columns)
}

pub fn copy_out_response(columns: i16) -> Vec<u8> {
    copy_response(b'H', columns)
}

pub fn copy_data(payload: &[u8]) -> Vec<u8> {
    frame(b'd', payload)
}

pub fn copy_done() -> Vec<u8> {
    frame(b'c', b"")
}

pub fn copy_fail(message: &str) -> Vec<u8> {
    let mut body = message.as_bytes().to_vec();
    body.push(0);
    frame(b'f', &body)
}

/// Frontend frames, for asserting what the client wrote.
pub fn query_frame(sql: &str) -> Vec<u8> {
    let mut body = sql.as_bytes().to_vec();
    body.push(0);
    frame(b'Q', &body)
}

pub fn concat(frames: &[Vec<u8>]) -> Vec<u8> {
    frames.concat()
}

// ===== drain loop =====

/// Everything a drain to idle produced, row views copied out.
#[derive(Debug, Default)]
pub struct Drained {
    pub rows: Vec<Vec<Value>>,
    pub results: Vec<QueryResult>,
    pub error_codes: Vec<String>,
    pub copy_chunks: Vec<bytes::Bytes>,
    pub copy_fail: Option<String>,
    pub notifications: Vec<(i32, String, String)>,
}

pub async fn drain(session: &mut Session<DuplexStream>) -> Drained {
    let mut out = Drained::default();
    loop {
        let (phase, emission) = session.next().await.unwrap();
        match emission {
            Some(Emission::Row(row)) => out.rows.push(row.to_vec()),
            Some(Emission::Result(result)) => out.results.push(result),
            Some(Emission::Error(err)) => out.error_codes.push(err.code().to_string()),
            Some(Emission::CopyData(chunk)) => out.copy_chunks.push(chunk),
            Some(Emission::CopyFail(reason)) => out.copy_fail = Some(reason.to_string()),
            Some(Emission::Notification(n)) => {
                out.notifications
                    .push((n.process_id, n.channel.to_string(), n.payload.to_string()));
            }
            None => {
                assert!(
                    matches!(phase, Phase::Idle | Phase::CopyIn),
                    "nil emission only at idle or copy-in, got {phase:?}",
                );
                break;
            }
        }
    }
    out
}
