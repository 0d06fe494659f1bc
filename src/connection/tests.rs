// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Loopback tests driving the connection against an in-process mock node.

use super::*;
use crate::frame::{
    requests::RequestBody,
    responses::result::{
        GLOBAL_TABLES_SPEC,
        PREPARED,
        ROWS,
        SETKEYSPACE,
        VOID,
    },
    write_bytes,
    write_int,
    write_short,
    write_short_bytes,
    write_string,
    write_string_multimap,
    CqlType,
    CqlValue,
    FromPayload,
    OpCode,
    ToPayload,
    UNPREPARED,
};
use std::collections::HashMap;
use tokio::net::TcpListener;

/// Serialize a response frame with the v4 response version byte.
fn reply(op: OpCode, stream: i16, body: Vec<u8>) -> Vec<u8> {
    let mut payload = vec![0x84, 0];
    payload.extend(stream.to_be_bytes());
    payload.push(op as u8);
    payload.extend((body.len() as u32).to_be_bytes());
    payload.extend(body);
    payload
}

fn supported_body() -> Vec<u8> {
    let mut options = HashMap::new();
    options.insert("CQL_VERSION".to_owned(), vec!["3.4.5".to_owned()]);
    options.insert("COMPRESSION".to_owned(), vec!["lz4".to_owned(), "snappy".to_owned()]);
    let mut body = Vec::new();
    write_string_multimap(&options, &mut body);
    body
}

fn void_body() -> Vec<u8> {
    let mut body = Vec::new();
    write_int(VOID, &mut body);
    body
}

fn set_keyspace_body(keyspace: &str) -> Vec<u8> {
    let mut body = Vec::new();
    write_int(SETKEYSPACE, &mut body);
    write_string(keyspace, &mut body);
    body
}

/// A Rows result with a single varchar column and one row per given value.
fn rows_body(column: &str, values: &[&str]) -> Vec<u8> {
    let mut body = Vec::new();
    write_int(ROWS, &mut body);
    write_int(GLOBAL_TABLES_SPEC, &mut body);
    write_int(1, &mut body);
    write_string("system", &mut body);
    write_string("local", &mut body);
    write_string(column, &mut body);
    CqlType::Varchar.to_payload(&mut body);
    write_int(values.len() as i32, &mut body);
    for value in values {
        write_bytes(value.as_bytes(), &mut body);
    }
    body
}

fn prepared_body(id: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    write_int(PREPARED, &mut body);
    write_short_bytes(id, &mut body);
    // bind metadata: one varchar column, pk index 0
    write_int(GLOBAL_TABLES_SPEC, &mut body);
    write_int(1, &mut body);
    write_int(1, &mut body);
    write_short(0, &mut body);
    write_string("ks", &mut body);
    write_string("tbl", &mut body);
    write_string("id", &mut body);
    CqlType::Varchar.to_payload(&mut body);
    // result metadata: no columns
    write_int(0, &mut body);
    write_int(0, &mut body);
    body
}

fn unprepared_body(id: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    write_int(UNPREPARED, &mut body);
    write_string("Prepared query not found", &mut body);
    write_short_bytes(id, &mut body);
    body
}

fn authenticate_body() -> Vec<u8> {
    let mut body = Vec::new();
    write_string("org.apache.cassandra.auth.PasswordAuthenticator", &mut body);
    body
}

fn auth_success_body() -> Vec<u8> {
    let mut body = Vec::new();
    write_bytes(&[], &mut body);
    body
}

fn status_up_event_body() -> Vec<u8> {
    let mut body = Vec::new();
    write_string("STATUS_CHANGE", &mut body);
    write_string("UP", &mut body);
    crate::frame::write_inet(([127, 0, 0, 1], 9042).into(), &mut body);
    body
}

async fn read_request(stream: &mut TcpStream) -> Option<RequestFrame> {
    let mut buffer = vec![0; 9];
    stream.read_exact(&mut buffer).await.ok()?;
    let header = Header::try_from(buffer.as_slice()).ok()?;
    buffer.resize(9 + header.body_len() as usize, 0);
    stream.read_exact(&mut buffer[9..]).await.ok()?;
    RequestFrame::try_from(buffer.as_slice()).ok()
}

/// Accept one connection and answer each request through the handler. A `None`
/// from the handler swallows the request (no response).
fn mock_node(
    listener: TcpListener,
    mut handler: impl FnMut(&RequestFrame) -> Option<Vec<Vec<u8>>> + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut stream, _) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(_) => return,
        };
        while let Some(request) = read_request(&mut stream).await {
            if let Some(responses) = handler(&request) {
                for response in responses {
                    if stream.write_all(&response).await.is_err() {
                        return;
                    }
                }
            }
        }
    })
}

/// The default handshake handler: SUPPORTED, READY, and USE acknowledgement.
fn handshake_responses(request: &RequestFrame) -> Option<Vec<Vec<u8>>> {
    let stream = request.stream();
    match request.body() {
        RequestBody::Options(_) => Some(vec![reply(OpCode::Supported, stream, supported_body())]),
        RequestBody::Startup(_) => Some(vec![reply(OpCode::Ready, stream, Vec::new())]),
        RequestBody::Query(query) if query.statement().starts_with("USE ") => {
            let keyspace = query.statement().trim_start_matches("USE ").to_owned();
            Some(vec![reply(OpCode::Result, stream, set_keyspace_body(&keyspace))])
        }
        _ => None,
    }
}

async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    (listener, address)
}

#[tokio::test]
async fn connect_and_query_one_row() {
    let (listener, address) = listen().await;
    mock_node(listener, |request| {
        handshake_responses(request).or_else(|| match request.body() {
            RequestBody::Query(_) => Some(vec![reply(
                OpCode::Result,
                request.stream(),
                rows_body("release_version", &["3.0.8"]),
            )]),
            _ => None,
        })
    });

    let conn = Connection::<Uncompressed>::builder().address(address).build().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Ready);

    let result = conn
        .query("SELECT release_version FROM system.local", QueryParams::default())
        .await
        .unwrap();
    let rows = result.rows().unwrap();
    assert_eq!(rows.rows_count(), 1);
    let records = rows.records().unwrap();
    assert_eq!(
        records[0].get("release_version"),
        Some(&CqlValue::Varchar("3.0.8".to_owned()))
    );
    assert_eq!(conn.in_flight(), 0);
}

#[tokio::test]
async fn connect_with_keyspace_runs_use_first() {
    let (listener, address) = listen().await;
    mock_node(listener, handshake_responses);

    let conn = Connection::<Uncompressed>::builder()
        .address(address)
        .keyspace("system_schema")
        .build()
        .await
        .unwrap();
    assert_eq!(conn.keyspace(), Some("system_schema"));
    assert_eq!(conn.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn password_authentication_flow() {
    let (listener, address) = listen().await;
    mock_node(listener, |request| {
        let stream = request.stream();
        match request.body() {
            RequestBody::Options(_) => Some(vec![reply(OpCode::Supported, stream, supported_body())]),
            RequestBody::Startup(_) => Some(vec![reply(OpCode::Authenticate, stream, authenticate_body())]),
            RequestBody::AuthResponse(auth) => {
                assert_eq!(auth.token(), b"\0cassandra\0cassandra");
                Some(vec![reply(OpCode::AuthSuccess, stream, auth_success_body())])
            }
            _ => None,
        }
    });

    let conn = Connection::<Uncompressed>::builder_with_auth("cassandra".to_owned(), "cassandra".to_owned())
        .address(address)
        .build()
        .await
        .unwrap();
    assert_eq!(conn.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn unprepared_execute_is_reprepared_once() {
    let (listener, address) = listen().await;
    mock_node(listener, |request| {
        let stream = request.stream();
        handshake_responses(request).or_else(|| match request.body() {
            RequestBody::Prepare(_) => Some(vec![reply(OpCode::Result, stream, prepared_body(b"fresh"))]),
            RequestBody::Execute(execute) => {
                if execute.id() == b"stale" {
                    Some(vec![reply(OpCode::Error, stream, unprepared_body(b"stale"))])
                } else {
                    Some(vec![reply(OpCode::Result, stream, void_body())])
                }
            }
            _ => None,
        })
    });

    let conn = Connection::<Uncompressed>::builder().address(address).build().await.unwrap();
    let prepared = conn.prepare("INSERT INTO ks.tbl (id) VALUES (?)").await.unwrap();
    assert_eq!(prepared.id(), b"fresh".to_vec());
    assert_eq!(prepared.pk_indexes(), vec![0]);

    // evict the id client side to simulate the server forgetting it
    let evicted = {
        let mut body = Vec::new();
        write_short_bytes(b"stale", &mut body);
        write_int(0, &mut body);
        write_int(0, &mut body);
        write_int(0, &mut body);
        write_int(0, &mut body);
        write_int(0, &mut body);
        PreparedResult::from_payload(&mut 0, &body).unwrap()
    };
    prepared.update(&evicted);
    assert_eq!(prepared.id(), b"stale".to_vec());

    let params = QueryParams::default().consistency(Consistency::One);
    let result = conn.execute(&prepared, params.value("k").unwrap()).await.unwrap();
    assert!(matches!(result, QueryResult::Void));
    // the transparent re-prepare swapped the cached id back
    assert_eq!(prepared.id(), b"fresh".to_vec());
}

#[tokio::test]
async fn responses_may_arrive_out_of_submission_order() {
    let (listener, address) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // handshake
        for _ in 0..2 {
            let request = read_request(&mut stream).await.unwrap();
            let responses = handshake_responses(&request).unwrap();
            for response in responses {
                stream.write_all(&response).await.unwrap();
            }
        }
        // gather both queries, answer them in reverse order, echoing the
        // statement so each waiter can check it got its own reply
        let mut queries = Vec::new();
        for _ in 0..2 {
            let request = read_request(&mut stream).await.unwrap();
            if let RequestBody::Query(query) = request.body() {
                queries.push((request.stream(), query.statement().clone()));
            }
        }
        for (stream_id, statement) in queries.into_iter().rev() {
            let response = reply(OpCode::Result, stream_id, set_keyspace_body(&statement));
            stream.write_all(&response).await.unwrap();
        }
        // keep the socket open until the client is done
        let _ = read_request(&mut stream).await;
    });

    let conn = Connection::<Uncompressed>::builder().address(address).build().await.unwrap();
    let first = conn.query("first", QueryParams::default());
    let second = conn.query("second", QueryParams::default());
    let (first, second) = tokio::join!(first, second);
    match (first.unwrap(), second.unwrap()) {
        (QueryResult::SetKeyspace(a), QueryResult::SetKeyspace(b)) => {
            assert_eq!(a, "first");
            assert_eq!(b, "second");
        }
        _ => panic!("Expected echoed results"),
    }
}

#[tokio::test]
async fn timeout_does_not_poison_the_connection() {
    let (listener, address) = listen().await;
    mock_node(listener, |request| {
        handshake_responses(request).or_else(|| match request.body() {
            // swallow the first query, answer later ones
            RequestBody::Query(query) if query.statement().as_str() == "slow" => Some(Vec::new()),
            RequestBody::Query(_) => Some(vec![reply(OpCode::Result, request.stream(), void_body())]),
            _ => None,
        })
    });

    let conn = Connection::<Uncompressed>::builder()
        .address(address)
        .request_timeout(Some(Duration::from_millis(50)))
        .build()
        .await
        .unwrap();

    let err = conn.query("slow", QueryParams::default()).await.unwrap_err();
    assert!(matches!(err, RequestError::Timeout));
    // the stream id stays reserved for the unanswered request
    assert_eq!(conn.in_flight(), 1);
    assert_eq!(conn.state(), ConnectionState::Ready);

    // the connection keeps working on other stream ids
    let result = conn.query("fast", QueryParams::default()).await.unwrap();
    assert!(matches!(result, QueryResult::Void));
}

#[tokio::test]
async fn close_fails_remaining_waiters() {
    let (listener, address) = listen().await;
    mock_node(listener, |request| {
        handshake_responses(request).or_else(|| match request.body() {
            // never answer queries
            RequestBody::Query(_) => Some(Vec::new()),
            _ => None,
        })
    });

    let conn = Connection::<Uncompressed>::builder()
        .address(address)
        .request_timeout(None)
        .build()
        .await
        .unwrap();

    let pending = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.query("never answered", QueryParams::default()).await })
    };
    // let the query reach the wire
    tokio::time::sleep(Duration::from_millis(50)).await;
    conn.close(Duration::from_millis(50)).await;
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert_eq!(conn.in_flight(), 0);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, RequestError::ConnectionClosed));

    // new submissions are refused
    let err = conn.query("after close", QueryParams::default()).await.unwrap_err();
    assert!(matches!(err, RequestError::ConnectionClosed));
}

#[tokio::test]
async fn events_fan_out_to_subscribers() {
    let (listener, address) = listen().await;
    mock_node(listener, |request| {
        let stream = request.stream();
        match request.body() {
            RequestBody::Options(_) => Some(vec![reply(OpCode::Supported, stream, supported_body())]),
            RequestBody::Startup(_) => Some(vec![reply(OpCode::Ready, stream, Vec::new())]),
            RequestBody::Register(_) => Some(vec![
                reply(OpCode::Ready, stream, Vec::new()),
                // push an event right after acknowledging, on stream -1
                reply(OpCode::Event, -1, status_up_event_body()),
            ]),
            _ => None,
        }
    });

    let conn = Connection::<Uncompressed>::builder().address(address).build().await.unwrap();
    let mut events = conn.subscribe();
    conn.register(vec![RegisterEventType::StatusChange]).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event.event_type() {
        crate::frame::EventType::StatusChange { change_type, address } => {
            assert_eq!(*change_type, crate::frame::StatusChangeType::Up);
            assert_eq!(*address, ([127, 0, 0, 1], 9042).into());
        }
        _ => panic!("Expected a status change event"),
    }
}

#[tokio::test]
async fn oversized_frame_poisons_the_connection() {
    let (listener, address) = listen().await;
    mock_node(listener, |request| {
        handshake_responses(request).or_else(|| match request.body() {
            RequestBody::Query(_) => {
                // claim a body far over the client's ceiling
                let mut response = vec![0x84, 0];
                response.extend(request.stream().to_be_bytes());
                response.push(OpCode::Result as u8);
                response.extend((64 * 1024 * 1024u32).to_be_bytes());
                Some(vec![response])
            }
            _ => None,
        })
    });

    let conn = Connection::<Uncompressed>::builder()
        .address(address)
        .max_frame_len(1024 * 1024)
        .build()
        .await
        .unwrap();

    let err = conn.query("big", QueryParams::default()).await.unwrap_err();
    assert!(matches!(err, RequestError::Frame(crate::frame::FrameError::Oversized(_, _))));
    assert_eq!(conn.state(), ConnectionState::Closed);

    let err = conn.query("after poison", QueryParams::default()).await.unwrap_err();
    assert!(matches!(err, RequestError::ConnectionClosed));
}

#[tokio::test]
async fn prepares_of_the_same_statement_coalesce() {
    let (listener, address) = listen().await;
    let prepare_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let server_count = prepare_count.clone();
    mock_node(listener, move |request| {
        handshake_responses(request).or_else(|| match request.body() {
            RequestBody::Prepare(_) => {
                server_count.fetch_add(1, Ordering::SeqCst);
                Some(vec![reply(OpCode::Result, request.stream(), prepared_body(b"one"))])
            }
            _ => None,
        })
    });

    let conn = Connection::<Uncompressed>::builder().address(address).build().await.unwrap();
    let statement = "SELECT * FROM ks.tbl WHERE id = ?";
    let (a, b, c) = tokio::join!(conn.prepare(statement), conn.prepare(statement), conn.prepare(statement));
    assert_eq!(a.unwrap().id(), b"one".to_vec());
    assert_eq!(b.unwrap().id(), b"one".to_vec());
    assert_eq!(c.unwrap().id(), b"one".to_vec());
    assert_eq!(prepare_count.load(Ordering::SeqCst), 1);

    // a later prepare of the same statement is served from the cache
    let cached = conn.prepare(statement).await.unwrap();
    assert_eq!(cached.id(), b"one".to_vec());
    assert_eq!(prepare_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batch_roundtrip() {
    let (listener, address) = listen().await;
    mock_node(listener, |request| {
        handshake_responses(request).or_else(|| match request.body() {
            RequestBody::Batch(batch) => {
                assert_eq!(batch.queries().len(), 2);
                Some(vec![reply(OpCode::Result, request.stream(), void_body())])
            }
            _ => None,
        })
    });

    let conn = Connection::<Uncompressed>::builder().address(address).build().await.unwrap();
    let batch = crate::frame::BatchFrameBuilder::default()
        .logged()
        .statement("INSERT INTO ks.tbl (id) VALUES (?)")
        .value("a")
        .unwrap()
        .id(b"prepared".to_vec())
        .value("b")
        .unwrap()
        .consistency(Consistency::Quorum)
        .build()
        .unwrap();
    let result = conn.batch(batch).await.unwrap();
    assert!(matches!(result, QueryResult::Void));
}
