//! Integration tests for the sandbox host: SQL and HTTP capabilities, and
//! the full client → dispatcher → guest → client pipeline.

use std::io::Read;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use yoframe::DataFrame;
use yoframe::Frame;
use yorun::Dispatcher;
use yorun::Loader;

use yocore::Client;
use yocore::ClientOptions;
use yocore::ClientType;
use yocore::Credential;
use yocore::FrameStream;
use yocore::mem::MemNetwork;
use yocore::transport::Connection;

/// Opens an in-memory sqlite database and walks the whole SQL surface:
/// a plain query, a zero-row query-row (sentinel left untouched), DDL and
/// an insert through exec, a parameterized query, then close. Statuses land
/// in one buffer, results are emitted on distinct tags.
const SQL_GUEST: &str = r#"
(module
  (import "env" "yomo_sql_open" (func $open (param i32 i32 i32 i32) (result i32)))
  (import "env" "yomo_sql_query" (func $query (param i32 i32 i32 i32 i32 i32) (result i32)))
  (import "env" "yomo_sql_query_row" (func $query_row (param i32 i32 i32 i32 i32 i32) (result i32)))
  (import "env" "yomo_sql_exec" (func $exec (param i32 i32 i32 i32 i32 i32) (result i32)))
  (import "env" "yomo_sql_close" (func $close (result i32)))
  (import "env" "yomo_write" (func $write (param i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "sqlite")
  (data (i32.const 8) ":memory:")
  (data (i32.const 16) "SELECT 1")
  (data (i32.const 24) "\50\00\00\00")
  (data (i32.const 32) "SELECT 1 WHERE 1=0")
  (data (i32.const 56) "INSERT INTO t(x) VALUES(7)")
  (data (i32.const 88) "CREATE TABLE t(x)")
  (data (i32.const 112) "[5]")
  (data (i32.const 120) "SELECT ?1")
  (global $next (mut i32) (i32.const 1024))
  (func (export "yomo_alloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $next))
    (global.set $next (i32.add (global.get $next) (local.get $size)))
    (local.get $ptr))
  (func (export "yomo_data_tags") (result i64)
    (i64.or (i64.shl (i64.const 24) (i64.const 32)) (i64.const 4)))
  (func (export "yomo_handler")
    (i32.store8 (i32.const 192)
      (call $open (i32.const 0) (i32.const 6) (i32.const 8) (i32.const 8)))
    (i32.store (i32.const 204) (i32.const 0))
    (i32.store8 (i32.const 193)
      (call $query (i32.const 16) (i32.const 8) (i32.const 0) (i32.const 0)
        (i32.const 200) (i32.const 204)))
    (i32.store (i32.const 212) (i32.const 43690))
    (i32.store8 (i32.const 194)
      (call $query_row (i32.const 32) (i32.const 18) (i32.const 0) (i32.const 0)
        (i32.const 208) (i32.const 212)))
    (i32.store8 (i32.const 195)
      (call $exec (i32.const 88) (i32.const 17) (i32.const 0) (i32.const 0)
        (i32.const 224) (i32.const 228)))
    (i32.store8 (i32.const 196)
      (call $exec (i32.const 56) (i32.const 26) (i32.const 0) (i32.const 0)
        (i32.const 216) (i32.const 220)))
    (i32.store8 (i32.const 197)
      (call $query (i32.const 120) (i32.const 9) (i32.const 112) (i32.const 3)
        (i32.const 232) (i32.const 236)))
    (i32.store8 (i32.const 198) (call $close))
    (drop (call $write (i32.const 0xEE) (i32.const 192) (i32.const 7)))
    (drop (call $write (i32.const 0x99) (i32.load (i32.const 200)) (i32.load (i32.const 204))))
    (drop (call $write (i32.const 0x9A) (i32.const 212) (i32.const 4)))
    (drop (call $write (i32.const 0x9B) (i32.load (i32.const 216)) (i32.load (i32.const 220))))
    (drop (call $write (i32.const 0x9C) (i32.load (i32.const 232)) (i32.load (i32.const 236))))))
"#;

/// Closing with nothing open reports status 1.
const SQL_CLOSE_GUEST: &str = r#"
(module
  (import "env" "yomo_sql_close" (func $close (result i32)))
  (import "env" "yomo_write" (func $write (param i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "\51\00\00\00")
  (global $next (mut i32) (i32.const 1024))
  (func (export "yomo_alloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $next))
    (global.set $next (i32.add (global.get $next) (local.get $size)))
    (local.get $ptr))
  (func (export "yomo_data_tags") (result i64)
    (i64.const 4))
  (func (export "yomo_handler")
    (i32.store8 (i32.const 32) (call $close))
    (drop (call $write (i32.const 0x52) (i32.const 32) (i32.const 1)))))
"#;

/// Fetches the URL handed in as the frame payload and reports the status.
const HTTP_GUEST: &str = r#"
(module
  (import "env" "yomo_context_data" (func $ctx_data (param i32 i32) (result i32)))
  (import "env" "yomo_http_get" (func $get (param i32 i32) (result i32)))
  (import "env" "yomo_write" (func $write (param i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "\60\00\00\00")
  (global $next (mut i32) (i32.const 1024))
  (func (export "yomo_alloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $next))
    (global.set $next (i32.add (global.get $next) (local.get $size)))
    (local.get $ptr))
  (func (export "yomo_data_tags") (result i64)
    (i64.const 4))
  (func (export "yomo_handler")
    (drop (call $ctx_data (i32.const 16) (i32.const 20)))
    (i32.store8 (i32.const 24)
      (call $get (i32.load (i32.const 16)) (i32.load (i32.const 20))))
    (drop (call $write (i32.const 0x61) (i32.const 24) (i32.const 1)))))
"#;

/// Same echo guest as the unit suite; observes 0x33, re-emits on 0x34.
const ECHO_GUEST: &str = r#"
(module
  (import "env" "yomo_context_tag" (func $ctx_tag (result i32)))
  (import "env" "yomo_context_data" (func $ctx_data (param i32 i32) (result i32)))
  (import "env" "yomo_write" (func $write (param i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "\33\00\00\00")
  (global $next (mut i32) (i32.const 1024))
  (func (export "yomo_alloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $next))
    (global.set $next (i32.add (global.get $next) (local.get $size)))
    (local.get $ptr))
  (func (export "yomo_data_tags") (result i64)
    (i64.const 4))
  (func (export "yomo_handler")
    (drop (call $ctx_data (i32.const 16) (i32.const 20)))
    (drop (call $write
      (i32.add (call $ctx_tag) (i32.const 1))
      (i32.load (i32.const 16))
      (i32.load (i32.const 20))))))
"#;

fn emitted<'a>(emits: &'a [(u32, Vec<u8>)], tag: u32) -> &'a [u8] {
    emits
        .iter()
        .find(|(t, _)| *t == tag)
        .unwrap_or_else(|| panic!("no emit with tag {:#x}", tag))
        .1
        .as_slice()
}

// --- Scenario 6: SQL round-trip ---

#[tokio::test]
async fn test_sql_roundtrip() {
    let dispatcher = Dispatcher::new(Loader::from_bytes(SQL_GUEST).unwrap());
    let emits = dispatcher.dispatch(0x50, vec![]).await.unwrap();

    // open, query, query_row, create, insert, args query, close: all 0.
    assert_eq!(emitted(&emits, 0xEE), &[0u8; 7]);

    let query: serde_json::Value = serde_json::from_slice(emitted(&emits, 0x99)).unwrap();
    assert_eq!(query, serde_json::json!([{"1": 1}]));

    // Zero rows: the guest's size cell still holds its sentinel.
    assert_eq!(emitted(&emits, 0x9A), 43690u32.to_le_bytes());

    let exec: serde_json::Value = serde_json::from_slice(emitted(&emits, 0x9B)).unwrap();
    assert_eq!(exec, serde_json::json!({"last_insert_id": 1, "rows_affected": 1}));

    let args_query: serde_json::Value = serde_json::from_slice(emitted(&emits, 0x9C)).unwrap();
    assert_eq!(args_query, serde_json::json!([{"?1": 5}]));
}

#[tokio::test]
async fn test_sql_close_without_open_is_error_status() {
    let dispatcher = Dispatcher::new(Loader::from_bytes(SQL_CLOSE_GUEST).unwrap());
    let emits = dispatcher.dispatch(0x51, vec![]).await.unwrap();
    assert_eq!(emits, vec![(0x52, vec![1])]);
}

// --- HTTP egress ---

#[tokio::test]
async fn test_http_get_success() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).unwrap();
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
            .unwrap();
    });

    let dispatcher = Dispatcher::new(Loader::from_bytes(HTTP_GUEST).unwrap());
    let url = format!("http://{}/", addr);
    let emits = dispatcher.dispatch(0x60, url.into_bytes()).await.unwrap();
    assert_eq!(emits, vec![(0x61, vec![0])]);
}

#[tokio::test]
async fn test_http_get_unreachable_is_status_two() {
    let dispatcher = Dispatcher::new(Loader::from_bytes(HTTP_GUEST).unwrap());
    // Reserved port; nothing listens there.
    let emits = dispatcher
        .dispatch(0x60, b"http://127.0.0.1:1/".to_vec())
        .await
        .unwrap();
    assert_eq!(emits, vec![(0x61, vec![2])]);
}

// --- Full pipeline: zipper -> client -> dispatcher -> guest -> zipper ---

#[tokio::test]
async fn test_guest_pipeline_end_to_end() {
    let network = MemNetwork::new();
    let mut listener = network.bind("zipper.test:9000");

    let server = tokio::spawn(async move {
        let conn = listener.accept().await.expect("no connection");
        let control = conn.accept_stream().await.expect("no control stream");
        let stream = FrameStream::new(control);
        let handshake = match stream.read_frame().await.unwrap() {
            Frame::Handshake(hf) => hf,
            other => panic!("expected handshake, got {:?}", other),
        };
        assert_eq!(handshake.observe_data_tags, vec![0x33]);
        stream.write_frame(&Frame::HandshakeAck).await.unwrap();

        stream
            .write_frame(&Frame::Data(DataFrame {
                tag: 0x33,
                metadata: None,
                payload: b"hello".to_vec(),
            }))
            .await
            .unwrap();

        match stream.read_frame().await.unwrap() {
            Frame::Data(df) => {
                assert_eq!(df.tag, 0x34);
                assert_eq!(df.payload, b"hello");
            }
            other => panic!("expected data frame, got {:?}", other),
        }
    });

    let dispatcher = Dispatcher::new(Loader::from_bytes(ECHO_GUEST).unwrap());
    let tags = dispatcher.observed_tags().await.unwrap();

    let options = ClientOptions::new(Arc::new(network.dialer()))
        .credential(Credential::new("token", "secret"))
        .observe_data_tags(tags);
    let client = Client::new("wasm-sfn", ClientType::StreamFunction, options);
    dispatcher.attach(&client);

    client.connect("zipper.test:9000").await.unwrap();
    timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
}
