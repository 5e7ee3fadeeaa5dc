//! Atomic Primitive Tests
//!
//! Tests verify:
//! - Compare-and-swap / compare-and-delete outcomes
//! - Floor-protected increments (string, hash field, multi-field)
//! - All-or-nothing multi-field updates
//! - Lease lock acquire / contention / release / expiry
//! - No lost updates under concurrent increments
//! - Both backend modes and the unset backend

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scriptkv::{arg, Backend, MemConn, MemStore, Reply, ScriptKv, ScriptKvError};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (Arc<MemStore>, ScriptKv) {
    let store = Arc::new(MemStore::new());
    let kv = ScriptKv::with_pool(Arc::clone(&store)).unwrap();
    (store, kv)
}

fn get(store: &MemStore, key: &str) -> Option<Vec<u8>> {
    store
        .with_keyspace(|ks| ks.get(key.as_bytes()))
        .unwrap()
        .map(|v| v.to_vec())
}

fn hget(store: &MemStore, key: &str, field: &str) -> Option<Vec<u8>> {
    store
        .with_keyspace(|ks| ks.hget(key.as_bytes(), field.as_bytes()))
        .unwrap()
        .map(|v| v.to_vec())
}

fn set(store: &MemStore, key: &str, value: &str) {
    store.execute("SET", &[arg(key), arg(value)]).unwrap();
}

fn hset(store: &MemStore, key: &str, field: &str, value: &str) {
    store
        .execute("HSET", &[arg(key), arg(field), arg(value)])
        .unwrap();
}

// =============================================================================
// Compare-And-Swap Tests
// =============================================================================

#[test]
fn test_cas_on_absent_key_sets_value() {
    let (store, kv) = setup();

    kv.compare_and_swap("k", "X", "Y").unwrap();

    assert_eq!(get(&store, "k"), Some(b"Y".to_vec()));
}

#[test]
fn test_cas_with_matching_value_swaps() {
    let (store, kv) = setup();
    set(&store, "k", "A");

    kv.compare_and_swap("k", "A", "B").unwrap();

    assert_eq!(get(&store, "k"), Some(b"B".to_vec()));
}

#[test]
fn test_cas_with_different_value_fails_and_keeps_value() {
    let (store, kv) = setup();
    set(&store, "k", "A");

    let result = kv.compare_and_swap("k", "C", "B");

    assert!(matches!(result, Err(ScriptKvError::ValueMismatch)));
    assert_eq!(get(&store, "k"), Some(b"A".to_vec()));
}

#[test]
fn test_cas_compares_exact_bytes() {
    let (store, kv) = setup();
    set(&store, "k", "a");

    let result = kv.compare_and_swap("k", "A", "B");

    assert!(matches!(result, Err(ScriptKvError::ValueMismatch)));
    assert_eq!(get(&store, "k"), Some(b"a".to_vec()));
}

#[test]
fn test_cas_accepts_binary_values() {
    let (store, kv) = setup();

    kv.compare_and_swap("bin", &[0u8, 1, 2][..], &[0xffu8, 0x00][..])
        .unwrap();
    kv.compare_and_swap("bin", &[0xffu8, 0x00][..], &[7u8][..])
        .unwrap();

    assert_eq!(get(&store, "bin"), Some(vec![7u8]));
}

// =============================================================================
// Compare-And-Delete Tests
// =============================================================================

#[test]
fn test_cad_with_matching_value_deletes() {
    let (store, kv) = setup();
    set(&store, "k", "A");

    let removed = kv.compare_and_delete("k", "A").unwrap();

    assert_eq!(removed, 1);
    assert_eq!(get(&store, "k"), None);
}

#[test]
fn test_cad_with_different_value_fails_and_keeps_key() {
    let (store, kv) = setup();
    set(&store, "k", "A");

    let result = kv.compare_and_delete("k", "C");

    assert!(matches!(result, Err(ScriptKvError::ValueMismatch)));
    assert_eq!(get(&store, "k"), Some(b"A".to_vec()));
}

#[test]
fn test_cad_on_absent_key_is_noop() {
    let (_store, kv) = setup();

    assert_eq!(kv.compare_and_delete("missing", "anything").unwrap(), 0);
}

// =============================================================================
// Increment Tests
// =============================================================================

#[test]
fn test_increment_decrements_within_floor() {
    let (store, kv) = setup();
    set(&store, "n", "5");

    assert_eq!(kv.increment("n", -3).unwrap(), 2);
    assert_eq!(get(&store, "n"), Some(b"2".to_vec()));
}

#[test]
fn test_increment_below_zero_fails_and_keeps_value() {
    let (store, kv) = setup();
    set(&store, "n", "2");

    let result = kv.increment("n", -5);

    assert!(matches!(result, Err(ScriptKvError::Insufficient)));
    assert_eq!(get(&store, "n"), Some(b"2".to_vec()));
}

#[test]
fn test_increment_to_exactly_zero_is_allowed() {
    let (store, kv) = setup();
    set(&store, "n", "4");

    assert_eq!(kv.increment("n", -4).unwrap(), 0);
}

#[test]
fn test_increment_absent_key_counts_as_zero() {
    let (store, kv) = setup();

    assert_eq!(kv.increment("fresh", 7).unwrap(), 7);

    let result = kv.increment("other", -1);
    assert!(matches!(result, Err(ScriptKvError::Insufficient)));
    assert_eq!(get(&store, "other"), None);
}

#[test]
fn test_increment_non_integer_value_is_not_insufficient() {
    let (store, kv) = setup();
    set(&store, "n", "abc");

    for delta in [-1, 1] {
        match kv.increment("n", delta) {
            Err(ScriptKvError::Store(message)) => assert!(message.contains("not an integer")),
            other => panic!("expected store error, got {:?}", other),
        }
    }
    assert_eq!(get(&store, "n"), Some(b"abc".to_vec()));
}

#[test]
fn test_hash_increment_floor() {
    let (store, kv) = setup();

    assert_eq!(kv.hash_increment("h", "f", 3).unwrap(), 3);
    assert_eq!(kv.hash_increment("h", "f", -2).unwrap(), 1);

    let result = kv.hash_increment("h", "f", -2);
    assert!(matches!(result, Err(ScriptKvError::Insufficient)));
    assert_eq!(hget(&store, "h", "f"), Some(b"1".to_vec()));
}

#[test]
fn test_increment_on_hash_key_is_wrongtype() {
    let (store, kv) = setup();
    hset(&store, "h", "f", "1");

    match kv.increment("h", 1) {
        Err(ScriptKvError::Store(message)) => assert!(message.contains("WRONGTYPE")),
        other => panic!("expected WRONGTYPE, got {:?}", other),
    }
}

// =============================================================================
// Multi-Field Increment Tests
// =============================================================================

#[test]
fn test_multi_field_increment_is_all_or_nothing() {
    let (store, kv) = setup();
    hset(&store, "h", "f1", "3");
    hset(&store, "h", "f2", "1");

    let result = kv.multi_field_increment("h", &["f1", "f2"], &[-1, -5]);

    assert!(matches!(result, Err(ScriptKvError::Insufficient)));
    assert_eq!(hget(&store, "h", "f1"), Some(b"3".to_vec()));
    assert_eq!(hget(&store, "h", "f2"), Some(b"1".to_vec()));
}

#[test]
fn test_multi_field_increment_returns_values_in_order() {
    let (store, kv) = setup();
    hset(&store, "h", "b", "10");

    let values = kv
        .multi_field_increment("h", &["b", "a", "c"], &[-4, 2, 0])
        .unwrap();

    assert_eq!(values, vec![6, 2, 0]);
    assert_eq!(hget(&store, "h", "a"), Some(b"2".to_vec()));
    assert_eq!(hget(&store, "h", "b"), Some(b"6".to_vec()));
    assert_eq!(hget(&store, "h", "c"), Some(b"0".to_vec()));
}

#[test]
fn test_multi_field_increment_length_mismatch_never_reaches_store() {
    let (store, kv) = setup();
    let before = store.command_count("EVALSHA");

    let result = kv.multi_field_increment("h", &["f1", "f2"], &[1]);

    match result {
        Err(ScriptKvError::ArgumentMismatch { fields, deltas }) => {
            assert_eq!((fields, deltas), (2, 1));
        }
        other => panic!("expected ArgumentMismatch, got {:?}", other),
    }
    assert_eq!(store.command_count("EVALSHA"), before);
}

#[test]
fn test_multi_field_increment_rejects_non_integer_field() {
    let (store, kv) = setup();
    hset(&store, "h", "ok", "5");
    hset(&store, "h", "bad", "five");

    match kv.multi_field_increment("h", &["ok", "bad"], &[1, 1]) {
        Err(ScriptKvError::Store(message)) => assert!(message.contains("not an integer")),
        other => panic!("expected store error, got {:?}", other),
    }
    assert_eq!(hget(&store, "h", "ok"), Some(b"5".to_vec()));
}

#[test]
fn test_lax_numeric_text_is_never_coerced() {
    let (store, kv) = setup();

    for raw in ["2.5", "0x10", "1e3", " 7 ", "+7", ""] {
        set(&store, "n", raw);
        hset(&store, "h", "f", raw);

        for delta in [-1, 1] {
            let results = [
                kv.increment("n", delta).map(|v| vec![v]),
                kv.hash_increment("h", "f", delta).map(|v| vec![v]),
                kv.multi_field_increment("h", &["f"], &[delta]),
            ];
            for result in results {
                match result {
                    Err(ScriptKvError::Store(message)) => {
                        assert!(message.contains("not an integer"), "{:?}: {}", raw, message)
                    }
                    other => panic!("{:?} with delta {}: got {:?}", raw, delta, other),
                }
            }
        }

        assert_eq!(get(&store, "n"), Some(raw.as_bytes().to_vec()));
        assert_eq!(hget(&store, "h", "f"), Some(raw.as_bytes().to_vec()));
    }
}

#[test]
fn test_multi_field_increment_overflow_writes_nothing() {
    let (store, kv) = setup();
    hset(&store, "h", "big", &i64::MAX.to_string());

    match kv.multi_field_increment("h", &["small", "big"], &[1, 1]) {
        Err(ScriptKvError::Store(message)) => assert!(message.contains("overflow")),
        other => panic!("expected overflow, got {:?}", other),
    }
    assert_eq!(hget(&store, "h", "small"), None);
}

#[test]
fn test_multi_field_increment_accumulates_repeated_field() {
    let (store, kv) = setup();

    let values = kv
        .multi_field_increment("h", &["a", "a"], &[2, 3])
        .unwrap();

    assert_eq!(values, vec![2, 5]);
    assert_eq!(hget(&store, "h", "a"), Some(b"5".to_vec()));
}

#[test]
fn test_multi_field_increment_empty_is_noop() {
    let (store, kv) = setup();
    let fields: [&str; 0] = [];

    assert_eq!(kv.multi_field_increment("h", &fields, &[]).unwrap(), Vec::<i64>::new());
    assert!(!store.with_keyspace(|ks| ks.exists(b"h")));
}

// =============================================================================
// Lock Tests
// =============================================================================

#[test]
fn test_lock_acquire_and_contention() {
    let (store, kv) = setup();

    kv.lock("lease", "T", 10).unwrap();
    let result = kv.lock("lease", "T2", 10);

    assert!(matches!(result, Err(ScriptKvError::LockOccupied)));
    assert_eq!(get(&store, "lease"), Some(b"T".to_vec()));
}

#[test]
fn test_lock_sets_expiry() {
    let (store, kv) = setup();

    kv.lock("lease", "T", 10).unwrap();

    let ttl = store.with_keyspace(|ks| ks.ttl(b"lease"));
    assert!((1..=10).contains(&ttl), "ttl was {}", ttl);
}

#[test]
fn test_unlock_with_owner_token_releases() {
    let (store, kv) = setup();
    kv.lock("lease", "T", 10).unwrap();

    kv.unlock("lease", "T").unwrap();

    assert_eq!(get(&store, "lease"), None);
    kv.lock("lease", "T2", 10).unwrap();
}

#[test]
fn test_unlock_with_foreign_token_fails() {
    let (store, kv) = setup();
    kv.lock("lease", "T", 10).unwrap();

    let result = kv.unlock("lease", "T2");

    assert!(matches!(result, Err(ScriptKvError::ValueMismatch)));
    assert_eq!(get(&store, "lease"), Some(b"T".to_vec()));
}

#[test]
fn test_unlock_after_expiry_and_reacquire_reports_mismatch() {
    let (_store, kv) = setup();
    kv.lock("lease", "T", 1).unwrap();

    thread::sleep(Duration::from_millis(1100));

    // Expired and unclaimed: releasing is a no-op success
    kv.unlock("lease", "T").unwrap();

    kv.lock("lease", "T", 1).unwrap();
    thread::sleep(Duration::from_millis(1100));
    kv.lock("lease", "T2", 10).unwrap();

    let result = kv.unlock("lease", "T");
    assert!(matches!(result, Err(ScriptKvError::ValueMismatch)));
}

#[test]
fn test_lock_with_zero_ttl_is_a_store_error() {
    let (_store, kv) = setup();

    match kv.lock("lease", "T", 0) {
        Err(ScriptKvError::Store(message)) => assert!(message.contains("invalid expire time")),
        other => panic!("expected store error, got {:?}", other),
    }
}

#[test]
fn test_concurrent_lock_has_single_winner() {
    let (_store, kv) = setup();
    let kv = Arc::new(kv);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let kv = Arc::clone(&kv);
            thread::spawn(move || kv.lock("lease", &format!("token-{}", i), 10))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let occupied = results
        .iter()
        .filter(|r| matches!(r, Err(ScriptKvError::LockOccupied)))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(occupied, 7);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_increments_lose_no_updates() {
    let (store, kv) = setup();
    let kv = Arc::new(kv);
    let threads = 8;
    let rounds = 100;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let kv = Arc::clone(&kv);
            thread::spawn(move || {
                // +2 then -1: every thread's running sum stays >= 0
                for _ in 0..rounds {
                    kv.increment("counter", 2).unwrap();
                    kv.increment("counter", -1).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let expected = (threads * rounds).to_string();
    assert_eq!(get(&store, "counter"), Some(expected.into_bytes()));
}

#[test]
fn test_concurrent_decrements_never_cross_zero() {
    let (store, kv) = setup();
    set(&store, "stock", "50");
    let kv = Arc::new(kv);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let kv = Arc::clone(&kv);
            thread::spawn(move || {
                let mut taken = 0;
                for _ in 0..20 {
                    match kv.increment("stock", -1) {
                        Ok(_) => taken += 1,
                        Err(ScriptKvError::Insufficient) => {}
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                taken
            })
        })
        .collect();

    let taken: i32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(taken, 50);
    assert_eq!(get(&store, "stock"), Some(b"0".to_vec()));
}

// =============================================================================
// Backend Tests
// =============================================================================

#[test]
fn test_shared_connection_backend() {
    let store = Arc::new(MemStore::new());
    let kv = ScriptKv::with_conn(MemConn::new(Arc::clone(&store))).unwrap();

    kv.compare_and_swap("k", "", "v").unwrap();
    assert_eq!(kv.increment("n", 3).unwrap(), 3);
    assert_eq!(get(&store, "k"), Some(b"v".to_vec()));
}

#[test]
fn test_unset_backend_fails_immediately() {
    assert!(matches!(
        ScriptKv::new(Backend::default()),
        Err(ScriptKvError::Uninitialized)
    ));
    assert!(matches!(
        Backend::default().call("PING", &[]),
        Err(ScriptKvError::Uninitialized)
    ));
}

#[test]
fn test_independent_instances_do_not_share_registry() {
    let (_store_a, kv_a) = setup();
    let (_store_b, kv_b) = setup();

    kv_a.delete_script("CAS");

    assert!(kv_a.registry().resolve("CAS").is_none());
    assert!(kv_b.registry().resolve("CAS").is_some());
    kv_b.compare_and_swap("k", "a", "b").unwrap();
    assert!(matches!(
        kv_a.compare_and_swap("k", "a", "b"),
        Err(ScriptKvError::NotRegistered(_))
    ));
}

#[test]
fn test_exec_runs_body_without_registering() {
    let (_store, kv) = setup();

    let reply = kv
        .exec(scriptkv::scripts::INC_BODY, 1, &[arg("n"), arg(&4i64)])
        .unwrap();
    assert_eq!(reply, Reply::Int(4));

    let result = kv.exec(scriptkv::scripts::INC_BODY, 1, &[arg("n"), arg(&-9i64)]);
    assert!(matches!(result, Err(ScriptKvError::Insufficient)));
    assert_eq!(kv.registry().len(), 5);
}
