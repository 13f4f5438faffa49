//! Canonical-form vectors
//!
//! The event id is the SHA-256 of the compact JSON array
//! `[0, pubkey, created_at, kind, tags, content]`. Implementations in
//! other languages MUST produce identical bytes for these inputs; the
//! vectors below pin the exact serialization, including escaping.

use crate::event::UnsignedEvent;
use serde_json::json;

fn canonical(unsigned: &UnsignedEvent) -> String {
    serde_json::to_string(&(
        0u8,
        &unsigned.pubkey,
        unsigned.created_at,
        unsigned.kind,
        &unsigned.tags,
        &unsigned.content,
    ))
    .unwrap()
}

#[test]
fn canonical_form_is_exact() {
    let unsigned = UnsignedEvent {
        pubkey: "a".repeat(64),
        created_at: 1_766_726_400,
        kind: 30058,
        tags: vec![vec!["d".into(), "addr".into()]],
        content: "hello".into(),
    };

    let expected = format!(
        "[0,\"{}\",1766726400,30058,[[\"d\",\"addr\"]],\"hello\"]",
        "a".repeat(64)
    );
    assert_eq!(canonical(&unsigned), expected);
}

#[test]
fn canonical_form_escapes_content() {
    let unsigned = UnsignedEvent {
        pubkey: "b".repeat(64),
        created_at: 1,
        kind: 30058,
        tags: vec![],
        content: "line1\nline2 \"quoted\"".into(),
    };

    let serialized = canonical(&unsigned);
    assert!(serialized.contains(r#""line1\nline2 \"quoted\"""#));
    // no pretty-printing whitespace may ever sneak in
    assert!(!serialized.contains(": "));
    assert!(!serialized.contains(", "));
}

#[test]
fn id_is_stable_across_tag_value_variants() {
    let base = UnsignedEvent {
        pubkey: "c".repeat(64),
        created_at: 99,
        kind: 30058,
        tags: vec![vec!["d".into(), "addr".into()]],
        content: String::new(),
    };
    let mut renamed = base.clone();
    renamed.tags = vec![vec!["d".into(), "backup".into()]];

    let (id_a, _) = base.id().unwrap();
    let (id_b, _) = base.id().unwrap();
    let (id_c, _) = renamed.id().unwrap();

    assert_eq!(id_a, id_b);
    assert_ne!(id_a, id_c);
    assert_eq!(id_a.len(), 64);
    assert!(id_a.chars().all(|ch| ch.is_ascii_hexdigit()));

    // the json! form of the same array serializes identically
    let via_value = json!([
        0,
        base.pubkey.clone(),
        base.created_at,
        base.kind,
        base.tags.clone(),
        base.content.clone()
    ]);
    assert_eq!(serde_json::to_string(&via_value).unwrap(), canonical(&base));
}
