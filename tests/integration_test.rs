use bankersbox::adapter::{FileAdapter, LocalStorage, NullAdapter};
use bankersbox::{Adapter, Error, KeyType, Store};
use serde_json::{json, Value};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_round_trip_through_file_snapshot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bb.json");

    {
        let mut store = Store::open(FileAdapter::open(&path).unwrap(), 0).unwrap();
        store.set("name", "Alice").unwrap();
        store.rpush("queue", "a").unwrap();
        store.rpush("queue", "b").unwrap();
        store.sadd("tags", "x").unwrap();
        store.sadd("tags", "y").unwrap();
    }

    let mut store = Store::open(FileAdapter::open(&path).unwrap(), 0).unwrap();
    assert_eq!(store.get("name").unwrap().as_deref(), Some("Alice"));
    assert_eq!(store.lrange("queue", 0, -1).unwrap(), vec!["a", "b"]);
    assert_eq!(store.scard("tags").unwrap(), 2);
    assert_eq!(store.keys(), vec!["name", "queue", "tags"]);
}

#[test]
fn test_snapshot_wire_format() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bb.json");

    let mut store = Store::open(FileAdapter::open(&path).unwrap(), 0).unwrap();
    store.sadd("s", "m").unwrap();

    let snapshot: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    let envelope: Value = serde_json::from_str(snapshot["bb:0:s"].as_str().unwrap()).unwrap();
    assert_eq!(envelope, json!({"v": {"m": 1}, "m": {"t": "set", "card": 1}}));

    let index: Value =
        serde_json::from_str(snapshot["bb:0k:___keys___"].as_str().unwrap()).unwrap();
    assert_eq!(index["v"], json!({"s": 1}));
}

#[test]
fn test_round_trip_through_local_storage() {
    let storage = LocalStorage::new();

    let mut store = Store::open(storage.adapter(), 3).unwrap();
    store.set("k", "v").unwrap();
    drop(store);

    let mut fresh = Store::open(storage.adapter(), 3).unwrap();
    assert_eq!(fresh.get("k").unwrap().as_deref(), Some("v"));
    assert_eq!(fresh.key_type("k").unwrap(), Some(KeyType::String));
}

#[test]
fn test_null_adapter_forgets_between_instances() {
    let mut store = Store::open(NullAdapter, 0).unwrap();
    store.set("k", "v").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

    let mut fresh = Store::open(store.into_adapter(), 0).unwrap();
    assert_eq!(fresh.get("k").unwrap(), None);
}

#[test]
fn test_cross_database_isolation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bb.json");
    let mut store = Store::open(FileAdapter::open(&path).unwrap(), 0).unwrap();

    store.select(1).unwrap();
    store.set("a", "x").unwrap();
    store.select(2).unwrap();
    assert!(!store.exists("a").unwrap());
    assert!(store.keys().is_empty());
    store.select(1).unwrap();
    assert!(store.exists("a").unwrap());

    // The selection survives a reopen only through the snapshot.
    let mut reopened = Store::open(FileAdapter::open(&path).unwrap(), 1).unwrap();
    assert_eq!(reopened.get("a").unwrap().as_deref(), Some("x"));
}

#[test]
fn test_cross_database_isolation_in_memory() {
    let mut store = Store::open(NullAdapter, 0).unwrap();

    store.select(1).unwrap();
    store.set("a", "x").unwrap();
    store.select(2).unwrap();
    assert!(!store.exists("a").unwrap());
    assert_eq!(store.dbsize(), 0);

    store.select(1).unwrap();
    assert!(store.exists("a").unwrap());
    assert_eq!(store.keys(), vec!["a"]);
    assert_eq!(store.dbsize(), 1);

    assert!(store.del("a").unwrap());
    store.select(0).unwrap();
    store.select(1).unwrap();
    assert!(store.keys().is_empty());
}

#[test]
fn test_flushdb_removes_everything_for_database() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bb.json");
    let mut store = Store::open(FileAdapter::open(&path).unwrap(), 0).unwrap();
    store.set("a", "1").unwrap();
    store.lpush("b", "2").unwrap();
    store.select(4).unwrap();
    store.set("other", "kept").unwrap();
    store.select(0).unwrap();

    store.flushdb().unwrap();

    let snapshot: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    let keys: Vec<&String> = snapshot.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["bb:4:other", "bb:4k:___keys___"]);
}

#[test]
fn test_type_enforcement_leaves_value_intact() {
    let storage = LocalStorage::new();
    let mut store = Store::open(storage.adapter(), 0).unwrap();
    store.set("k", "x").unwrap();

    assert!(matches!(
        store.lpush("k", "y"),
        Err(Error::TypeMismatch {
            expected: KeyType::List,
            found: KeyType::String
        })
    ));
    assert!(matches!(store.sadd("k", "y"), Err(Error::TypeMismatch { .. })));

    let mut fresh = Store::open(storage.adapter(), 0).unwrap();
    assert_eq!(fresh.get("k").unwrap().as_deref(), Some("x"));
}

#[test]
fn test_emptied_set_disappears_from_storage() {
    let storage = LocalStorage::new();
    let mut store = Store::open(storage.adapter(), 0).unwrap();
    store.sadd("s", "only").unwrap();
    assert!(store.srem("s", "only").unwrap());

    assert!(!store.exists("s").unwrap());
    assert_eq!(store.key_type("s").unwrap(), None);
    assert!(storage.is_empty());
}

#[test]
fn test_rpoplpush_from_empty_source() {
    let mut store = Store::open(NullAdapter, 0).unwrap();
    store.rpush("dest", "d").unwrap();
    assert_eq!(store.rpoplpush("src", "dest").unwrap(), None);
    assert_eq!(store.lrange("dest", 0, -1).unwrap(), vec!["d"]);
}

#[test]
fn test_corrupt_envelope_fails_fast() {
    let storage = LocalStorage::new();
    storage.adapter().write("bb:0:broken", "not an envelope").unwrap();

    let mut store = Store::open(storage.adapter(), 0).unwrap();
    assert!(matches!(store.get("broken"), Err(Error::Corrupt { .. })));
    assert!(matches!(store.exists("broken"), Err(Error::Corrupt { .. })));
    assert!(store.del("broken").unwrap());
    assert_eq!(store.get("broken").unwrap(), None);
}

#[test]
fn test_capacity_exceeded_surfaces() {
    let storage = LocalStorage::with_quota(200);
    let mut store = Store::open(storage.adapter(), 0).unwrap();
    store.rpush("q", "first").unwrap();

    let err = store.rpush("q", &"x".repeat(300)).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { .. }));
    assert_eq!(store.lrange("q", 0, -1).unwrap(), vec!["first"]);

    let err = store.set("new", &"y".repeat(300)).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { .. }));
    assert_eq!(store.keys(), vec!["q"]);
}

#[test]
fn test_reads_envelopes_written_by_other_tools() {
    let storage = LocalStorage::new();
    let mut adapter = storage.adapter();
    adapter
        .write("bb:0:count", r#"{"v": 41, "m": {"t": "string"}}"#)
        .unwrap();
    adapter
        .write(
            "bb:0k:___keys___",
            r#"{"v": {"count": 1}, "m": {"t": "set"}}"#,
        )
        .unwrap();

    let mut store = Store::open(storage.adapter(), 0).unwrap();
    assert_eq!(store.keys(), vec!["count"]);
    assert_eq!(store.incr("count").unwrap(), 42);
}

#[test]
fn test_shell_session() {
    let mut store = Store::open(NullAdapter, 0).unwrap();
    let input = "LPUSH q a\nLPUSH q b\nLLEN q\nLRANGE q 0 -1\nSELECT 1\nEXISTS q\nSELECT 99\n";
    let mut output = Vec::new();
    bankersbox::shell::run(input.as_bytes(), &mut output, &mut store).unwrap();

    let output = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[..6], ["OK 1", "OK 2", "OK 2", r#"OK ["b","a"]"#, "OK", "OK false"]);
    assert!(lines[6].starts_with("ERR configuration error"));
}
