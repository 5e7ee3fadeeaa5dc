//! Error Translator Tests
//!
//! Tests verify:
//! - Sentinel text maps to the typed error, wrapped or bare
//! - Unknown store text and non-store errors pass through untouched
//! - NOSCRIPT detection

use std::io;

use scriptkv::scripts::sentinel;
use scriptkv::translate::{is_noscript, translate, translate_result};
use scriptkv::ScriptKvError;

// =============================================================================
// Classification Tests
// =============================================================================

#[test]
fn test_bare_sentinels() {
    assert!(matches!(
        translate(ScriptKvError::store("error insufficient")),
        ScriptKvError::Insufficient
    ));
    assert!(matches!(
        translate(ScriptKvError::store("val not match")),
        ScriptKvError::ValueMismatch
    ));
    assert!(matches!(
        translate(ScriptKvError::store("lock occupied")),
        ScriptKvError::LockOccupied
    ));
}

#[test]
fn test_wrapped_sentinel() {
    let raw = "ERR Error running script (call to f_abc123): @user_script:12: error insufficient";

    assert!(matches!(
        translate(ScriptKvError::store(raw)),
        ScriptKvError::Insufficient
    ));
}

#[test]
fn test_typed_error_display_matches_sentinel() {
    assert_eq!(ScriptKvError::Insufficient.to_string(), sentinel::INSUFFICIENT);
    assert_eq!(ScriptKvError::ValueMismatch.to_string(), sentinel::VALUE_MISMATCH);
    assert_eq!(ScriptKvError::LockOccupied.to_string(), sentinel::LOCK_OCCUPIED);
}

#[test]
fn test_first_sentinel_in_order_wins() {
    let raw = format!("{} / {}", sentinel::LOCK_OCCUPIED, sentinel::INSUFFICIENT);

    assert!(matches!(
        translate(ScriptKvError::store(raw)),
        ScriptKvError::Insufficient
    ));
    assert!(matches!(
        translate(ScriptKvError::store("lock occupied, val not match")),
        ScriptKvError::ValueMismatch
    ));
}

#[test]
fn test_sentinels_are_distinct() {
    for (i, a) in sentinel::ALL.iter().enumerate() {
        for (j, b) in sentinel::ALL.iter().enumerate() {
            if i != j {
                assert!(!a.contains(b), "{:?} contains {:?}", a, b);
            }
        }
    }
}

// =============================================================================
// Passthrough Tests
// =============================================================================

#[test]
fn test_unknown_store_text_passes_through() {
    let raw = "WRONGTYPE Operation against a key holding the wrong kind of value";

    match translate(ScriptKvError::store(raw)) {
        ScriptKvError::Store(message) => assert_eq!(message, raw),
        other => panic!("expected passthrough, got {:?}", other),
    }
}

#[test]
fn test_non_store_errors_untouched() {
    let io = ScriptKvError::Io(io::Error::new(io::ErrorKind::Other, "error insufficient"));
    assert!(matches!(translate(io), ScriptKvError::Io(_)));

    let protocol = ScriptKvError::Protocol("val not match".to_string());
    assert!(matches!(translate(protocol), ScriptKvError::Protocol(_)));

    assert!(matches!(
        translate(ScriptKvError::Uninitialized),
        ScriptKvError::Uninitialized
    ));
}

#[test]
fn test_translate_result_keeps_ok() {
    assert_eq!(translate_result::<i64>(Ok(7)).unwrap(), 7);
    assert!(matches!(
        translate_result::<()>(Err(ScriptKvError::store("lock occupied"))),
        Err(ScriptKvError::LockOccupied)
    ));
}

// =============================================================================
// NOSCRIPT Detection Tests
// =============================================================================

#[test]
fn test_is_noscript() {
    assert!(is_noscript(&ScriptKvError::store(
        "NOSCRIPT No matching script. Please use EVAL."
    )));
    assert!(!is_noscript(&ScriptKvError::store("ERR unknown command")));
    assert!(!is_noscript(&ScriptKvError::Network("NOSCRIPT".to_string())));
}

#[test]
fn test_noscript_must_lead_the_message() {
    assert!(is_noscript(&ScriptKvError::store("  NOSCRIPT No matching script.")));
    assert!(!is_noscript(&ScriptKvError::store(
        "ERR Error running script (call to f_abc): @user_script: NOSCRIPT-like failure"
    )));
    assert!(!is_noscript(&ScriptKvError::store("NOSCRIPTS are fine")));
}

#[test]
fn test_noscript_is_not_translated() {
    let err = translate(ScriptKvError::store("NOSCRIPT No matching script."));

    assert!(is_noscript(&err));
}
