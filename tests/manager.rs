//! Manager end-to-end tests over the in-process backend.

use std::thread;
use std::time::{Duration, Instant};
use syncell::{encode, Backend, Manager, MemoryBackend, Scalar, Value, Version};

fn wait_until(deadline: Duration, mut ready: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if ready() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    ready()
}

// ============================================================================
// Read / Write / Snapshot
// ============================================================================

#[test]
fn read_on_empty_cell_is_an_error() {
    let manager = Manager::new(MemoryBackend::new()).unwrap();
    let err = manager.read().unwrap_err();
    assert!(err.is_empty_cell());
}

#[test]
fn snapshot_of_empty_cell_is_none() {
    let manager = Manager::new(MemoryBackend::new()).unwrap();
    assert_eq!(manager.snapshot().unwrap(), None);
}

#[test]
fn read_after_write_yields_structural_copy() {
    let manager = Manager::new(MemoryBackend::new()).unwrap();
    let value = Value::map_of([
        ("nums", Value::List(vec![Value::Int(1), Value::Int(2)])),
        ("name", Value::String("cell".into())),
    ]);
    manager.write(value.clone()).unwrap();
    assert_eq!(manager.snapshot().unwrap(), Some(value));
}

#[test]
fn snapshot_is_a_detached_copy() {
    let manager = Manager::new(MemoryBackend::new()).unwrap();
    manager.write(Value::map_of([("n", 1i64)])).unwrap();

    let mut copy = manager.snapshot().unwrap().unwrap();
    if let Value::Map(map) = &mut copy {
        map.insert(Scalar::Str("n".into()), Value::Int(99));
    }
    // The shared state did not move.
    assert_eq!(manager.snapshot().unwrap(), Some(Value::map_of([("n", 1i64)])));
}

#[test]
fn scalar_root_roundtrips() {
    let manager = Manager::new(MemoryBackend::new()).unwrap();
    manager.write(Value::Int(7)).unwrap();
    let root = manager.read().unwrap();
    assert_eq!(root.as_int(), Some(7));
}

#[test]
fn write_replaces_root_and_detaches_old_tree() {
    let manager = Manager::new(MemoryBackend::new()).unwrap();
    manager.write(Value::map_of([("a", Value::List(vec![Value::Int(1)]))])).unwrap();

    let root = manager.read().unwrap();
    let list = root.as_map().unwrap().get("a").unwrap().unwrap();

    manager.write(Value::map_of([("b", 2i64)])).unwrap();
    assert!(!manager.is_linked(&list));
    assert!(list.as_list().unwrap().push(9i64).unwrap_err().is_detached());
}

// ============================================================================
// Versions
// ============================================================================

#[test]
fn version_tracks_backend_generations() {
    let backend = MemoryBackend::new();
    let manager = Manager::new(backend.clone()).unwrap();

    assert_eq!(manager.version(), Version::NONE);
    manager.write(Value::Int(1)).unwrap();
    let v1 = manager.version();
    assert!(!v1.is_none());
    assert_eq!(backend.current_version(), v1);

    manager.write(Value::Int(2)).unwrap();
    assert_ne!(manager.version(), v1);
}

#[test]
fn try_write_is_a_version_guarded_escape_hatch() {
    let manager = Manager::new(MemoryBackend::new()).unwrap();
    manager.write(Value::Int(1)).unwrap();
    let v1 = manager.version();

    assert!(manager.try_write(Value::Int(2), v1).unwrap());
    assert!(!manager.try_write(Value::Int(3), v1).unwrap());
    assert_eq!(manager.snapshot().unwrap(), Some(Value::Int(2)));
}

#[test]
fn try_write_against_empty_cell() {
    let manager = Manager::new(MemoryBackend::new()).unwrap();
    assert!(manager.try_write(Value::Int(1), Version::NONE).unwrap());
    assert!(!manager.try_write(Value::Int(2), Version::NONE).unwrap());
}

// ============================================================================
// Scenario: single-participant mapping mutation
// ============================================================================

#[test]
fn single_participant_mapping_mutation() {
    let manager = Manager::new(MemoryBackend::new()).unwrap();
    manager.write(Value::map_of([("count", 0i64)])).unwrap();
    let initial = manager.version();

    {
        let txn = manager.transaction();
        let root = manager.read().unwrap();
        root.as_map().unwrap().insert("count", 1i64).unwrap();
        txn.commit().unwrap();
    }

    assert_eq!(manager.snapshot().unwrap(), Some(Value::map_of([("count", 1i64)])));
    assert_ne!(manager.version(), initial);
}

// ============================================================================
// Scenario: detected conflict
// ============================================================================

#[test]
fn competing_commit_wins_and_conflict_is_detected() {
    let backend = MemoryBackend::new();
    let ours = Manager::new(backend.clone()).unwrap();
    let theirs = Manager::new(backend.clone()).unwrap();

    ours.write(Value::map_of([("x", 10i64)])).unwrap();
    let root = ours.read().unwrap();
    let map = root.as_map().unwrap().clone();

    // Open the transaction first so the baseline is pinned at v1, then
    // let the other participant commit.
    let txn = ours.transaction();
    let their_root = theirs.read().unwrap();
    their_root.as_map().unwrap().insert("x", 11i64).unwrap();

    let x = map.get("x").unwrap().unwrap().as_int().unwrap();
    map.insert("x", x + 1).unwrap();
    let err = txn.commit().unwrap_err();
    assert!(err.is_conflict());

    // The losing participant converges on the winning state.
    assert_eq!(ours.snapshot().unwrap(), Some(Value::map_of([("x", 11i64)])));
    assert_eq!(
        ours.refresh().unwrap().as_map().unwrap().get("x").unwrap().unwrap().as_int(),
        Some(11)
    );
}

// ============================================================================
// Scenario: watcher-driven refresh
// ============================================================================

#[test]
fn watcher_folds_in_remote_commits_without_explicit_refresh() {
    let backend = MemoryBackend::new();
    let observer = Manager::new(backend.clone()).unwrap();

    observer.write(Value::map_of([("state", "old")])).unwrap();
    let v1 = observer.version();
    observer.read().unwrap();

    // Another participant replaces the value behind our back.
    let blob = encode(&Value::map_of([("state", "new")])).unwrap();
    backend.clone().write(&blob).unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || observer.version() != v1),
        "watcher never picked up the remote commit"
    );
    let root = observer.read().unwrap();
    assert_eq!(
        root.as_map().unwrap().get("state").unwrap().unwrap().as_str(),
        Some("new")
    );
}

#[test]
fn watcher_defers_refresh_while_a_transaction_is_open() {
    let backend = MemoryBackend::new();
    let ours = Manager::new(backend.clone()).unwrap();
    ours.write(Value::map_of([("x", 1i64)])).unwrap();
    let root = ours.read().unwrap();
    let map = root.as_map().unwrap().clone();

    let txn = ours.transaction();
    let blob = encode(&Value::map_of([("x", 2i64)])).unwrap();
    backend.clone().write(&blob).unwrap();

    // Reads inside the scope keep seeing the pinned snapshot.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(map.get("x").unwrap().unwrap().as_int(), Some(1));

    // Nothing was mutated, so the exit commits nothing and the
    // deferred refresh is applied.
    txn.commit().unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        map.get("x").unwrap().unwrap().as_int() == Some(2)
    }));
}

// ============================================================================
// Refresh rules
// ============================================================================

#[test]
fn refresh_inside_transaction_is_rejected() {
    let manager = Manager::new(MemoryBackend::new()).unwrap();
    manager.write(Value::Int(1)).unwrap();

    let txn = manager.transaction();
    let err = manager.refresh().unwrap_err();
    assert!(matches!(err, syncell::Error::RefreshInTransaction));
    txn.commit().unwrap();
}

#[test]
fn refresh_is_a_no_op_when_version_matches() {
    let manager = Manager::new(MemoryBackend::new()).unwrap();
    manager.write(Value::map_of([("k", 1i64)])).unwrap();

    let root = manager.read().unwrap();
    let map = root.as_map().unwrap().clone();
    manager.refresh().unwrap();

    // The same wrapper is still live; identity survived the refresh.
    assert!(manager.is_linked(&syncell::ValueRef::Map(map.clone())));
    map.insert("k", 2i64).unwrap();
}
