mod helpers;

use helpers::{note, open_engine};
use memvault::memory::{MemoryInput, MemoryStore, MemoryType};
use memvault::MemoryError;
use tempfile::TempDir;

#[test]
fn initialize_alone_creates_file_and_directories() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("dirs").join("store.db");
    assert!(!path.exists());

    let store = MemoryStore::initialize(&path).unwrap();

    // No save, no close: the file must already be there with a schema
    let meta = std::fs::metadata(&path).unwrap();
    assert!(meta.len() > 0);
    assert_eq!(store.get_memory_count().unwrap(), 0);
    assert!(store.get_db_size_bytes().unwrap() > 0);
}

#[test]
fn initialized_file_is_valid_without_close() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("store.db");
    let store = MemoryStore::initialize(&path).unwrap();
    std::mem::forget(store);

    let reopened = MemoryStore::initialize(&path).unwrap();
    assert_eq!(reopened.get_memory_count().unwrap(), 0);
}

#[test]
fn records_survive_reopen_without_close() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("store.db");

    {
        let mut store = MemoryStore::initialize(&path).unwrap();
        store
            .save_memory(
                MemoryInput::new(MemoryType::Decision, "Use WAL", "Readers never block writers")
                    .with_id("wal")
                    .with_tags(["sqlite"]),
            )
            .unwrap();
        // Dropped here without save_to_disk or close
    }

    let store = MemoryStore::initialize(&path).unwrap();
    let memory = store.get_memory("wal").unwrap().unwrap();
    assert_eq!(memory.title, "Use WAL");
    assert_eq!(memory.memory_type, MemoryType::Decision);
    assert_eq!(memory.tags, vec!["sqlite"]);
}

#[test]
fn second_handle_reads_while_first_is_open() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("shared.db");

    let mut first = MemoryStore::initialize(&path).unwrap();
    first
        .save_memory(MemoryInput::new(MemoryType::Discovery, "t", "seen by both").with_id("x"))
        .unwrap();

    // `first` stays open for the whole test
    let second = MemoryStore::initialize(&path).unwrap();
    let seen = second.get_memory("x").unwrap().unwrap();
    assert_eq!(seen.title, "t");
    assert_eq!(second.get_memory_count().unwrap(), 1);

    first
        .save_memory(MemoryInput::new(MemoryType::Discovery, "u", "later").with_id("y"))
        .unwrap();
    assert!(second.peek_memory("y").unwrap().is_some());
    assert_eq!(first.get_memory_count().unwrap(), 2);
}

#[test]
fn three_sessions_accumulate_records() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sessions.db");

    for session in 0..3 {
        let mut store = MemoryStore::initialize(&path).unwrap();
        assert_eq!(store.get_memory_count().unwrap(), session as u64);
        store
            .save_memory(
                MemoryInput::new(MemoryType::Change, format!("session {session}"), "work")
                    .with_id(format!("s{session}")),
            )
            .unwrap();
        if session == 1 {
            store.close().unwrap();
        }
    }

    let store = MemoryStore::initialize(&path).unwrap();
    assert_eq!(store.get_memory_count().unwrap(), 3);
    for session in 0..3 {
        assert!(store.get_memory(&format!("s{session}")).unwrap().is_some());
    }
}

#[test]
fn garbage_file_fails_fast() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("garbage.db");
    let junk: Vec<u8> = (0..8192u32).map(|i| (i * 31 % 251) as u8).collect();
    std::fs::write(&path, &junk).unwrap();

    let err = MemoryStore::initialize(&path).err().unwrap();
    assert!(matches!(err, MemoryError::CorruptStore { .. }), "got {err:?}");

    // The file was not overwritten
    assert_eq!(std::fs::read(&path).unwrap(), junk);
}

#[test]
fn foreign_sqlite_file_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("foreign.db");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE invoices (id INTEGER PRIMARY KEY, total REAL);")
            .unwrap();
    }

    let err = MemoryStore::initialize(&path).err().unwrap();
    assert!(matches!(err, MemoryError::CorruptStore { .. }), "got {err:?}");
}

#[test]
fn engine_state_survives_crash_between_snapshots() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("engine.db");

    {
        let mut engine = open_engine(&path);
        for i in 0..5 {
            engine
                .remember(note(&format!("m{i}"), MemoryType::Observation, &format!("note {i}"), "body"))
                .unwrap();
        }
        // Dropped without flush: fewer mutations than the snapshot interval
    }

    let engine = open_engine(&path);
    assert_eq!(engine.store().get_memory_count().unwrap(), 5);
    assert_eq!(engine.index().len(), 5);
    for i in 0..5 {
        assert!(engine.index().contains(&format!("m{i}")));
    }
}

#[test]
fn save_to_disk_folds_wal_into_main_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("flush.db");
    let mut store = MemoryStore::initialize(&path).unwrap();
    for i in 0..20 {
        store
            .save_memory(MemoryInput::new(MemoryType::Feature, format!("t{i}"), "x".repeat(500)))
            .unwrap();
    }
    store.save_to_disk().unwrap();

    let main = std::fs::metadata(&path).unwrap().len();
    assert_eq!(store.get_db_size_bytes().unwrap(), main);
}
