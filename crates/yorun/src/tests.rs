use crate::Dispatcher;
use crate::Loader;

// ============================================================================
//  WAT GUEST FIXTURES
// ============================================================================

/// Observes 0x33 via `yomo_data_tags`; the handler reads the current frame
/// through the context imports and echoes the payload on tag + 1.
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

/// Observes 0x33 and 0xDEAD; traps on 0xDEAD, otherwise writes the first
/// four bytes of its data segment back out.
const TRAP_GUEST: &str = r#"
(module
  (import "env" "yomo_context_tag" (func $ctx_tag (result i32)))
  (import "env" "yomo_write" (func $write (param i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "\33\00\00\00\ad\de\00\00")
  (global $next (mut i32) (i32.const 1024))
  (func (export "yomo_alloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $next))
    (global.set $next (i32.add (global.get $next) (local.get $size)))
    (local.get $ptr))
  (func (export "yomo_data_tags") (result i64)
    (i64.const 8))
  (func (export "yomo_handler")
    (if (i32.eq (call $ctx_tag) (i32.const 0xdead))
      (then unreachable))
    (drop (call $write (call $ctx_tag) (i32.const 0) (i32.const 4)))))
"#;

/// No `yomo_data_tags` export; registers 0x77 from `yomo_init` instead.
const INIT_GUEST: &str = r#"
(module
  (import "env" "yomo_observe_datatag" (func $observe (param i32) (result i32)))
  (memory (export "memory") 1)
  (global $next (mut i32) (i32.const 1024))
  (func (export "yomo_alloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $next))
    (global.set $next (i32.add (global.get $next) (local.get $size)))
    (local.get $ptr))
  (func (export "yomo_init")
    (drop (call $observe (i32.const 0x77))))
  (func (export "yomo_handler")))
"#;

const NO_ALLOC_GUEST: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "yomo_handler")))
"#;

/// Tries to emit a payload far past the end of linear memory, then reports
/// the status it got back.
const BAD_PTR_GUEST: &str = r#"
(module
  (import "env" "yomo_write" (func $write (param i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "\44\00\00\00")
  (global $next (mut i32) (i32.const 1024))
  (func (export "yomo_alloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $next))
    (global.set $next (i32.add (global.get $next) (local.get $size)))
    (local.get $ptr))
  (func (export "yomo_data_tags") (result i64)
    (i64.const 4))
  (func (export "yomo_handler")
    (i32.store8 (i32.const 32)
      (call $write (i32.const 9) (i32.const 0x7fffff00) (i32.const 64)))
    (drop (call $write (i32.const 0x45) (i32.const 32) (i32.const 1)))))
"#;

/// Reports the status of an HTTP GET against an out-of-range url pointer.
const HTTP_BAD_PTR_GUEST: &str = r#"
(module
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
    (i32.store8 (i32.const 24)
      (call $get (i32.const 0x7fffff00) (i32.const 16)))
    (drop (call $write (i32.const 0x61) (i32.const 24) (i32.const 1)))))
"#;

// ============================================================================
//  LOADER
// ============================================================================

#[test]
fn test_loader_rejects_missing_alloc_export() {
    let loader = Loader::from_bytes(NO_ALLOC_GUEST).unwrap();
    let err = loader.instantiate().unwrap_err();
    assert!(err.to_string().contains("yomo_alloc"), "err: {}", err);
}

#[test]
fn test_loader_rejects_garbage_artifact() {
    assert!(Loader::from_bytes(b"\x00asm not really").is_err());
}

#[test]
fn test_declared_tags_from_export() {
    let loader = Loader::from_bytes(ECHO_GUEST).unwrap();
    let instance = loader.instantiate().unwrap();
    assert_eq!(
        instance.observed_tags().iter().copied().collect::<Vec<_>>(),
        vec![0x33]
    );
}

#[test]
fn test_observe_datatag_during_init() {
    let loader = Loader::from_bytes(INIT_GUEST).unwrap();
    let instance = loader.instantiate().unwrap();
    assert!(instance.observed_tags().contains(&0x77));
}

// ============================================================================
//  DISPATCH
// ============================================================================

#[tokio::test]
async fn test_echo_guest_roundtrip() {
    let dispatcher = Dispatcher::new(Loader::from_bytes(ECHO_GUEST).unwrap());
    let emits = dispatcher.dispatch(0x33, b"hello".to_vec()).await.unwrap();
    assert_eq!(emits, vec![(0x34, b"hello".to_vec())]);
}

#[tokio::test]
async fn test_payload_roundtrips_through_guest_memory() {
    // The guest only ever sees the payload through yomo_alloc + the out
    // cells, so byte equality proves the allocator protocol end to end.
    let dispatcher = Dispatcher::new(Loader::from_bytes(ECHO_GUEST).unwrap());
    let payload: Vec<u8> = (0..=255).collect();
    let emits = dispatcher.dispatch(0x33, payload.clone()).await.unwrap();
    assert_eq!(emits, vec![(0x34, payload)]);
}

#[tokio::test]
async fn test_unobserved_tag_is_ignored() {
    let dispatcher = Dispatcher::new(Loader::from_bytes(ECHO_GUEST).unwrap());
    let emits = dispatcher.dispatch(0x99, b"ignored".to_vec()).await.unwrap();
    assert!(emits.is_empty());
}

#[tokio::test]
async fn test_observed_tags_via_dispatcher() {
    let dispatcher = Dispatcher::new(Loader::from_bytes(TRAP_GUEST).unwrap());
    assert_eq!(dispatcher.observed_tags().await.unwrap(), vec![0x33, 0xDEAD]);
}

#[tokio::test]
async fn test_trap_discards_instance_and_recovers() {
    let dispatcher = Dispatcher::new(Loader::from_bytes(TRAP_GUEST).unwrap());

    let trap = dispatcher.dispatch(0xDEAD, vec![]).await.unwrap_err();
    assert!(trap.to_string().contains("trapped"), "err: {}", trap);

    // A fresh instance serves the next frame.
    let emits = dispatcher.dispatch(0x33, vec![]).await.unwrap();
    assert_eq!(emits, vec![(0x33, vec![0x33, 0x00, 0x00, 0x00])]);
}

#[tokio::test]
async fn test_consecutive_dispatches_reuse_the_instance() {
    let dispatcher = Dispatcher::new(Loader::from_bytes(ECHO_GUEST).unwrap());
    for _ in 0..3 {
        let emits = dispatcher.dispatch(0x33, b"again".to_vec()).await.unwrap();
        assert_eq!(emits, vec![(0x34, b"again".to_vec())]);
    }
}

// ============================================================================
//  HOST ABI STATUS CODES
// ============================================================================

#[tokio::test]
async fn test_out_of_range_write_is_status_error() {
    let dispatcher = Dispatcher::new(Loader::from_bytes(BAD_PTR_GUEST).unwrap());
    let emits = dispatcher.dispatch(0x44, vec![]).await.unwrap();
    // The out-of-range yomo_write returned 1 and queued nothing.
    assert_eq!(emits, vec![(0x45, vec![1])]);
}

#[tokio::test]
async fn test_http_get_bad_pointer_is_status_one() {
    let dispatcher = Dispatcher::new(Loader::from_bytes(HTTP_BAD_PTR_GUEST).unwrap());
    let emits = dispatcher.dispatch(0x60, vec![]).await.unwrap();
    assert_eq!(emits, vec![(0x61, vec![1])]);
}
