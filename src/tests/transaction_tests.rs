use crate::core::btree::BTreeDb;
use crate::core::options::{BTreeRetune, OpenMode};
use crate::error::ErrorCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn open_small(path: &std::path::Path) -> BTreeDb {
    BTreeDb::builder()
        .lmemb(4)
        .nmemb(4)
        .cache(8, 8)
        .open(path, OpenMode::create())
        .unwrap()
}

#[test]
fn test_commit_persists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("commit.sbt");

    {
        let db = open_small(&path);
        db.tran_begin().unwrap();
        db.put(b"a", b"1").unwrap();
        db.putdup(b"a", b"2").unwrap();
        db.tran_commit().unwrap();
        db.close().unwrap();
    }

    let db = BTreeDb::open(&path, OpenMode::reader()).unwrap();
    assert_eq!(db.getlist(b"a").unwrap(), vec!["1", "2"]);
}

#[test]
fn test_abort_restores_previous_state() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir.path().join("abort.sbt"));

    for i in 0..100 {
        db.put(format!("{:03}", i).as_bytes(), b"before").unwrap();
    }
    let keys_before = db.range(None, None, None).unwrap();

    db.tran_begin().unwrap();
    // Enough work to split, merge and evict pages
    for i in 100..400 {
        db.put(format!("{:03}", i).as_bytes(), b"during").unwrap();
    }
    for i in 0..80 {
        db.out(format!("{:03}", i).as_bytes()).unwrap();
    }
    db.put(b"050", b"changed").unwrap();
    assert_eq!(db.rnum(), 321);
    db.tran_abort().unwrap();

    assert_eq!(db.rnum(), 100);
    assert_eq!(db.range(None, None, None).unwrap(), keys_before);
    assert_eq!(db.get(b"050").unwrap().as_deref(), Some(&b"before"[..]));
    assert!(db.get(b"150").unwrap().is_none());

    // Tree is still consistent after the rollback
    for i in 100..200 {
        db.put(format!("{:03}", i).as_bytes(), b"after").unwrap();
    }
    assert_eq!(db.rnum(), 200);
    assert_eq!(db.range(None, None, None).unwrap().len(), 200);
}

#[test]
fn test_abort_on_empty_tree() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir.path().join("empty.sbt"));

    db.tran_begin().unwrap();
    for i in 0..50 {
        db.put(format!("{}", i).as_bytes(), b"v").unwrap();
    }
    db.tran_abort().unwrap();

    assert_eq!(db.rnum(), 0);
    assert!(db.range(None, None, None).unwrap().is_empty());
    let mut cur = db.cursor();
    assert!(!cur.first().unwrap());
}

#[test]
fn test_close_aborts_open_transaction() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("close.sbt");

    {
        let db = open_small(&path);
        db.put(b"kept", b"yes").unwrap();
        db.tran_begin().unwrap();
        db.put(b"lost", b"no").unwrap();
        db.out(b"kept").unwrap();
        db.close().unwrap();
    }

    let db = BTreeDb::open(&path, OpenMode::reader()).unwrap();
    assert_eq!(db.get(b"kept").unwrap().as_deref(), Some(&b"yes"[..]));
    assert!(db.get(b"lost").unwrap().is_none());
    assert_eq!(db.rnum(), 1);
}

#[test]
fn test_drop_aborts_open_transaction() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("drop.sbt");

    {
        let db = open_small(&path);
        db.tran_begin().unwrap();
        db.put(b"lost", b"no").unwrap();
    }

    let db = BTreeDb::open(&path, OpenMode::reader()).unwrap();
    assert_eq!(db.rnum(), 0);
}

#[test]
fn test_transaction_misuse() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir.path().join("misuse.sbt"));

    assert_eq!(db.tran_commit().unwrap_err().code(), ErrorCode::Invalid);
    assert_eq!(db.tran_abort().unwrap_err().code(), ErrorCode::Invalid);

    db.tran_begin().unwrap();
    assert_eq!(db.tran_begin().unwrap_err().code(), ErrorCode::Invalid);

    // Whole-file operations are refused mid transaction
    assert_eq!(
        db.optimize(BTreeRetune::default()).unwrap_err().code(),
        ErrorCode::Invalid
    );
    assert_eq!(db.vanish().unwrap_err().code(), ErrorCode::Invalid);
    assert_eq!(
        db.copy(dir.path().join("copy.sbt")).unwrap_err().code(),
        ErrorCode::Invalid
    );

    db.tran_commit().unwrap();
    db.tran_begin().unwrap();
    db.tran_abort().unwrap();
}

#[test]
fn test_sync_inside_transaction_still_aborts() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir.path().join("sync.sbt"));

    db.put(b"base", b"1").unwrap();
    db.tran_begin().unwrap();
    for i in 0..40 {
        db.put(format!("t{}", i).as_bytes(), b"v").unwrap();
    }
    db.sync().unwrap();
    db.tran_abort().unwrap();

    assert_eq!(db.rnum(), 1);
    assert!(db.get(b"t0").unwrap().is_none());
}

#[test]
fn test_other_threads_wait_for_transaction() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(open_small(&dir.path().join("wait.sbt")));
    let done = Arc::new(AtomicBool::new(false));

    db.tran_begin().unwrap();
    db.put(b"owner", b"1").unwrap();

    let handle = {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            db.put(b"other", b"2").unwrap();
            done.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!done.load(Ordering::SeqCst));
    // The owner keeps full access meanwhile
    assert_eq!(db.get(b"owner").unwrap().as_deref(), Some(&b"1"[..]));

    db.tran_abort().unwrap();
    handle.join().unwrap();

    assert!(done.load(Ordering::SeqCst));
    assert!(db.get(b"owner").unwrap().is_none());
    assert_eq!(db.get(b"other").unwrap().as_deref(), Some(&b"2"[..]));
}

#[test]
fn test_reader_cannot_begin() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reader.sbt");
    open_small(&path).close().unwrap();

    let db = BTreeDb::open(&path, OpenMode::reader()).unwrap();
    assert_eq!(db.tran_begin().unwrap_err().code(), ErrorCode::Invalid);
}
