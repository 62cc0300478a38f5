//! Simple-query pull cycles against a scripted backend.
mod common;

use bytes::Bytes;
use common::*;
use postwire::{Emission, ErrorKind, Phase, codec::Value};

#[test]
fn single_statement() {
    rt().block_on(async {
        let script = concat(&[
            row_description(&[("?column?", 23)]),
            data_row(&[Some(b"0")]),
            command_complete("SELECT 1"),
            ready_for_query(),
        ]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("SELECT 0;").await.unwrap();
        assert_eq!(session.phase(), Phase::Busy);

        let drained = drain(&mut session).await;
        assert_eq!(drained.rows, vec![vec![Value::Int(0)]]);
        assert_eq!(drained.results.len(), 1);
        assert_eq!(drained.results[0].command, "SELECT");
        assert_eq!(drained.results[0].rows_affected, 1);
        assert_eq!(session.phase(), Phase::Idle);
    });
}

#[test]
fn multi_statement() {
    rt().block_on(async {
        let script = concat(&[
            row_description(&[("?column?", 23)]),
            data_row(&[Some(b"0")]),
            command_complete("SELECT 1"),
            row_description(&[("generate_series", 23)]),
            data_row(&[Some(b"1")]),
            data_row(&[Some(b"2")]),
            data_row(&[Some(b"3")]),
            command_complete("SELECT 3"),
            row_description(&[("?column?", 25), ("?column?", 25)]),
            data_row(&[Some(b"hello"), Some(b"goodbye")]),
            command_complete("SELECT 1"),
            ready_for_query(),
        ]);
        let (mut session, _server) = session_over(script).await;

        session
            .simple_query("SELECT 0; SELECT generate_series(1, 3); SELECT 'hello', 'goodbye';")
            .await
            .unwrap();

        let drained = drain(&mut session).await;
        assert_eq!(
            drained.rows,
            vec![
                vec![Value::Int(0)],
                vec![Value::Int(1)],
                vec![Value::Int(2)],
                vec![Value::Int(3)],
                vec![
                    Value::Bytes(Bytes::from_static(b"hello")),
                    Value::Bytes(Bytes::from_static(b"goodbye")),
                ],
            ],
        );
        assert_eq!(drained.results.len(), 3);
        assert_eq!(session.phase(), Phase::Idle);
    });
}

#[test]
fn empty_query() {
    rt().block_on(async {
        let script = concat(&[empty_query_response(), ready_for_query()]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("").await.unwrap();

        let drained = drain(&mut session).await;
        assert!(drained.rows.is_empty());
        assert!(drained.results.is_empty());
        assert_eq!(session.phase(), Phase::Idle);
    });
}

#[test]
fn division_by_zero_error_then_idle() {
    rt().block_on(async {
        let script = concat(&[
            error_response(&[(b'S', "ERROR"), (b'C', "22012"), (b'M', "division by zero")]),
            ready_for_query(),
        ]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("SELECT 1/0;").await.unwrap();

        let drained = drain(&mut session).await;
        assert_eq!(drained.error_codes, vec!["22012".to_string()]);
        assert!(drained.rows.is_empty());
        // the server error did not kill the session
        assert_eq!(session.phase(), Phase::Idle);
    });
}

#[test]
fn notifications_interleave_without_disturbing_the_stream() {
    rt().block_on(async {
        let script = concat(&[
            notification(7, "jobs", "first"),
            row_description(&[("a", 23)]),
            data_row(&[Some(b"1")]),
            notification(7, "jobs", "second"),
            data_row(&[Some(b"2")]),
            command_complete("SELECT 2"),
            notification(8, "other", ""),
            ready_for_query(),
        ]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("SELECT a FROM t;").await.unwrap();

        let drained = drain(&mut session).await;
        assert_eq!(drained.rows, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        assert_eq!(
            drained.notifications,
            vec![
                (7, "jobs".to_string(), "first".to_string()),
                (7, "jobs".to_string(), "second".to_string()),
                (8, "other".to_string(), String::new()),
            ],
        );
    });
}

#[test]
fn notices_and_parameter_status_are_consumed_silently() {
    rt().block_on(async {
        let script = concat(&[
            notice_response(&[(b'S', "WARNING"), (b'C', "01000"), (b'M', "be careful")]),
            parameter_status("application_name", "postwire-test"),
            command_complete("SET"),
            ready_for_query(),
        ]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("SET application_name TO 'postwire-test';").await.unwrap();

        let drained = drain(&mut session).await;
        assert_eq!(drained.results.len(), 1);
        assert!(drained.notifications.is_empty());
        assert_eq!(
            session.parameters().get("application_name").map(String::as_str),
            Some("postwire-test"),
        );
    });
}

#[test]
fn extended_protocol_bookkeeping_is_benign() {
    rt().block_on(async {
        let script = concat(&[
            frame(b'1', b""), // ParseComplete
            frame(b'2', b""), // BindComplete
            frame(b'n', b""), // NoData
            command_complete("SELECT 0"),
            ready_for_query(),
        ]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("SELECT;").await.unwrap();
        let drained = drain(&mut session).await;
        assert_eq!(drained.results.len(), 1);
    });
}

#[test]
fn zero_column_rows_are_empty() {
    rt().block_on(async {
        let script = concat(&[
            row_description(&[]),
            data_row(&[]),
            command_complete("SELECT 1"),
            ready_for_query(),
        ]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("SELECT;").await.unwrap();
        let drained = drain(&mut session).await;
        assert_eq!(drained.rows, vec![Vec::<Value>::new()]);
    });
}

#[test]
fn extra_columns_are_truncated_to_the_description() {
    rt().block_on(async {
        let script = concat(&[
            row_description(&[("a", 23)]),
            data_row(&[Some(b"7"), Some(b"dropped")]),
            command_complete("SELECT 1"),
            ready_for_query(),
        ]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("SELECT a FROM t;").await.unwrap();
        let drained = drain(&mut session).await;
        assert_eq!(drained.rows, vec![vec![Value::Int(7)]]);
    });
}

#[test]
fn null_columns_never_reach_the_decoder() {
    rt().block_on(async {
        let script = concat(&[
            row_description(&[("a", 23), ("b", 23)]),
            data_row(&[Some(b"1"), Some(b"2")]),
            // a stale "2" must not leak into the null slot
            data_row(&[Some(b"3"), None]),
            command_complete("SELECT 2"),
            ready_for_query(),
        ]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("SELECT a, b FROM t;").await.unwrap();
        let drained = drain(&mut session).await;
        assert_eq!(
            drained.rows,
            vec![
                vec![Value::Int(1), Value::Int(2)],
                vec![Value::Int(3), Value::Null],
            ],
        );
        assert!(drained.rows[1][1].is_null());
    });
}

#[test]
fn close_sends_terminate() {
    rt().block_on(async {
        use tokio::io::AsyncReadExt;

        let script = concat(&[command_complete("SELECT 0"), ready_for_query()]);
        let (mut session, mut server) = session_over(script).await;

        session.simple_query("SELECT;").await.unwrap();
        drain(&mut session).await;
        session.close().await.unwrap();

        let expected = concat(&[query_frame("SELECT;"), frame(b'X', b"")]);
        let mut written = vec![0u8; expected.len()];
        server.read_exact(&mut written).await.unwrap();
        assert_eq!(written, expected);
    });
}

#[test]
fn row_views_share_the_reused_buffer() {
    rt().block_on(async {
        let script = concat(&[
            row_description(&[("a", 23)]),
            data_row(&[Some(b"1")]),
            data_row(&[Some(b"2")]),
            command_complete("SELECT 2"),
            ready_for_query(),
        ]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("SELECT a FROM t;").await.unwrap();

        let (_, first) = session.next().await.unwrap();
        let Some(Emission::Row(first)) = first else { panic!("expected a row") };
        assert_eq!(first, &[Value::Int(1)]);
        let copied = first.to_vec();

        // the next pull rewrites the same buffer the first view aliased
        let (_, second) = session.next().await.unwrap();
        let Some(Emission::Row(second)) = second else { panic!("expected a row") };
        assert_eq!(second, &[Value::Int(2)]);
        assert_eq!(copied, vec![Value::Int(1)]);

        drain(&mut session).await;
    });
}

#[test]
fn data_row_before_description_is_fatal() {
    rt().block_on(async {
        let script = concat(&[data_row(&[Some(b"1")])]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("SELECT 1;").await.unwrap();

        let err = session.next().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(_)));

        // a fatal error marks the session unusable
        let err = session.next().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SessionClosed));
    });
}

#[test]
fn query_while_busy_is_a_contract_violation() {
    rt().block_on(async {
        let script = concat(&[command_complete("SELECT 0"), ready_for_query()]);
        let (mut session, _server) = session_over(script).await;

        session.simple_query("SELECT 1;").await.unwrap();
        let err = session.simple_query("SELECT 2;").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Phase(_)));
    });
}

#[test]
fn the_query_message_is_framed_exactly() {
    rt().block_on(async {
        use tokio::io::AsyncReadExt;

        let script = concat(&[command_complete("SELECT 0"), ready_for_query()]);
        let (mut session, mut server) = session_over(script).await;

        session.simple_query("SELECT 1;").await.unwrap();
        drain(&mut session).await;

        let expected = query_frame("SELECT 1;");
        let mut written = vec![0u8; expected.len()];
        server.read_exact(&mut written).await.unwrap();
        assert_eq!(written, expected);
    });
}
