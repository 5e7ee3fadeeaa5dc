//! Embedded Program Tests
//!
//! Nothing in this suite runs a Lua interpreter, so these tests pin the
//! structure of the program bodies that the native equivalents rely on.
//!
//! Tests verify:
//! - Failure paths raise the sentinel phrases
//! - Increment bodies accept only plain decimal integers
//! - Stored values are written by the store's integer commands, never from
//!   Lua numbers
//! - Every body addresses exactly one key

use scriptkv::scripts::{
    sentinel, Builtin, CAD_BODY, CAS_BODY, HINC_BODY, HMINC_BODY, INC_BODY,
};

// =============================================================================
// Helper Functions
// =============================================================================

const INCREMENT_BODIES: [(&str, &str); 3] = [
    ("INC", INC_BODY),
    ("HINC", HINC_BODY),
    ("HMINC", HMINC_BODY),
];

const INTEGER_PATTERN: &str = r#"string.match(raw, "^%-?%d+$")"#;

fn error_reply(phrase: &str) -> String {
    format!("redis.error_reply(\"{}\")", phrase)
}

// =============================================================================
// Sentinel Tests
// =============================================================================

#[test]
fn test_compare_bodies_raise_value_mismatch() {
    for body in [CAS_BODY, CAD_BODY] {
        assert!(body.contains(&error_reply(sentinel::VALUE_MISMATCH)));
        assert!(!body.contains(sentinel::INSUFFICIENT));
    }
}

#[test]
fn test_increment_bodies_raise_insufficient() {
    for (name, body) in INCREMENT_BODIES {
        assert!(
            body.contains(&error_reply(sentinel::INSUFFICIENT)),
            "{} lacks the insufficient sentinel",
            name
        );
        assert!(!body.contains(sentinel::VALUE_MISMATCH), "{}", name);
    }
}

#[test]
fn test_no_body_raises_lock_occupied() {
    for builtin in Builtin::ALL {
        assert!(!builtin.body().contains(sentinel::LOCK_OCCUPIED), "{}", builtin.name());
    }
}

// =============================================================================
// Integer Handling Tests
// =============================================================================

#[test]
fn test_increment_bodies_validate_integers_strictly() {
    for (name, body) in INCREMENT_BODIES {
        assert!(body.contains(INTEGER_PATTERN), "{} lacks strict parsing", name);
        // The only tonumber call is the one behind the pattern check.
        assert_eq!(body.matches("tonumber(").count(), 1, "{}", name);
    }
}

#[test]
fn test_increment_bodies_report_store_wording() {
    assert!(INC_BODY.contains(&error_reply("ERR value is not an integer or out of range")));
    assert!(HINC_BODY.contains(&error_reply("ERR hash value is not an integer")));
    assert!(HMINC_BODY.contains(&error_reply("ERR hash value is not an integer")));
    for (name, body) in INCREMENT_BODIES {
        assert!(body.contains(&error_reply("ERR increment is not an integer")), "{}", name);
    }
}

#[test]
fn test_values_written_by_integer_commands() {
    for (name, body) in INCREMENT_BODIES {
        assert!(!body.contains("string.format"), "{} formats numbers", name);
        assert!(!body.contains("\"HSET\""), "{} writes with HSET", name);
        assert!(!body.contains("\"SET\""), "{} writes with SET", name);
    }
    assert!(INC_BODY.contains(r#"redis.call("INCRBY", KEYS[1], ARGV[1])"#));
    assert!(HINC_BODY.contains(r#"redis.call("HINCRBY", KEYS[1], ARGV[1], ARGV[2])"#));
    assert!(HMINC_BODY.contains(r#"redis.call("HINCRBY", KEYS[1], fields[i], ARGV[n + i])"#));
}

#[test]
fn test_multi_field_checks_before_first_write() {
    let last_check = HMINC_BODY.rfind(&error_reply(sentinel::INSUFFICIENT)).unwrap();
    let first_write = HMINC_BODY.find("\"HINCRBY\"").unwrap();

    assert!(last_check < first_write);
    assert!(HMINC_BODY.contains("ERR increment or decrement would overflow"));
}

// =============================================================================
// Key Usage Tests
// =============================================================================

#[test]
fn test_bodies_use_a_single_key() {
    for builtin in Builtin::ALL {
        let body = builtin.body();
        assert_eq!(builtin.key_count(), 1);
        assert!(body.contains("KEYS[1]"), "{}", builtin.name());
        assert!(!body.contains("KEYS[2]"), "{}", builtin.name());
    }
}

#[test]
fn test_bodies_are_distinct() {
    for a in Builtin::ALL {
        assert_eq!(Builtin::from_body(a.body()), Some(a));
    }
    assert_eq!(Builtin::from_body("return 1"), None);
}
