use crate::core::btree::BTreeDb;
use crate::core::fixed::FixedDb;
use crate::core::hash::HashDb;
use crate::core::options::OpenMode;
use crate::error::ErrorCode;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Byte copy of a file that is still open, as a crash would leave it.
fn snapshot_open_file(from: &Path, to: &Path) {
    std::fs::copy(from, to).unwrap();
}

#[test]
fn test_basic_persistence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("casket.shh");

    // Create database and insert data
    {
        let db = HashDb::open(&path, OpenMode::create()).unwrap();
        db.put(b"persist_key", b"persist_value").unwrap();
        db.put(b"another_key", b"another_value").unwrap();
        db.close().unwrap();
    }

    // Reopen and verify data persisted
    {
        let db = HashDb::open(&path, OpenMode::writer()).unwrap();
        assert_eq!(db.rnum(), 2);
        assert_eq!(
            db.get(b"persist_key").unwrap().as_deref(),
            Some(&b"persist_value"[..])
        );
        assert_eq!(
            db.get(b"another_key").unwrap().as_deref(),
            Some(&b"another_value"[..])
        );
    }
}

#[test]
fn test_graceful_shutdown_on_drop() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("drop.shh");

    {
        let db = HashDb::open(&path, OpenMode::create()).unwrap();
        for i in 0..20 {
            db.putasync(format!("shutdown_key_{}", i).as_bytes(), b"v")
                .unwrap();
        }
        // Dropped without close: buffered writes are applied and the header is synced
    }

    let db = HashDb::open(&path, OpenMode::reader()).unwrap();
    assert_eq!(db.rnum(), 20);
    for i in 0..20 {
        assert!(db
            .get(format!("shutdown_key_{}", i).as_bytes())
            .unwrap()
            .is_some());
    }
}

#[test]
fn test_free_pool_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pool.shh");

    let fsiz = {
        let db = HashDb::open(&path, OpenMode::create()).unwrap();
        for i in 0..100 {
            db.put(format!("k{}", i).as_bytes(), &[0u8; 200]).unwrap();
        }
        for i in 0..50 {
            db.out(format!("k{}", i).as_bytes()).unwrap();
        }
        let fsiz = db.fsiz();
        db.close().unwrap();
        fsiz
    };

    // Records of the same size fit into the freed blocks
    let db = HashDb::open(&path, OpenMode::writer()).unwrap();
    for i in 100..140 {
        db.put(format!("k{}", i).as_bytes(), &[0u8; 200]).unwrap();
    }
    assert_eq!(db.fsiz(), fsiz);
    assert_eq!(db.rnum(), 90);
}

#[test]
fn test_recovery_after_unclean_shutdown() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("live.shh");
    let crashed = dir.path().join("crashed.shh");

    let db = HashDb::open(&path, OpenMode::create()).unwrap();
    for i in 0..200 {
        db.put(format!("key_{}", i).as_bytes(), format!("value_{}", i).as_bytes())
            .unwrap();
    }
    for i in 0..200 {
        if i % 4 == 0 {
            db.out(format!("key_{}", i).as_bytes()).unwrap();
        }
    }
    snapshot_open_file(&path, &crashed);
    drop(db);

    let recovered = HashDb::open(&crashed, OpenMode::writer()).unwrap();
    assert_eq!(recovered.rnum(), 150);
    for i in 0..200 {
        let got = recovered.get(format!("key_{}", i).as_bytes()).unwrap();
        assert_eq!(got.is_some(), i % 4 != 0);
    }

    // Freed blocks were found again and get reused
    let fsiz = recovered.fsiz();
    recovered.put(b"key_0", b"value_0").unwrap();
    assert_eq!(recovered.fsiz(), fsiz);
    recovered.close().unwrap();

    // The recovered file is clean now
    let db = HashDb::open(&crashed, OpenMode::reader()).unwrap();
    assert_eq!(db.rnum(), 151);
}

#[test]
fn test_recovery_cuts_torn_tail() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("torn_live.shh");
    let crashed = dir.path().join("torn.shh");

    let db = HashDb::open(&path, OpenMode::create()).unwrap();
    db.put(b"kept", b"value").unwrap();
    let fsiz = db.fsiz();
    snapshot_open_file(&path, &crashed);
    drop(db);

    // Garbage past the last complete block
    let mut file = OpenOptions::new().append(true).open(&crashed).unwrap();
    file.write_all(&[0u8; 100]).unwrap();
    drop(file);

    let db = HashDb::open(&crashed, OpenMode::writer()).unwrap();
    assert_eq!(db.fsiz(), fsiz);
    assert_eq!(db.get(b"kept").unwrap().as_deref(), Some(&b"value"[..]));
    assert_eq!(std::fs::metadata(&crashed).unwrap().len(), fsiz);
}

#[test]
fn test_btree_persistence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("casket.sbt");

    {
        let db = BTreeDb::builder()
            .lmemb(8)
            .nmemb(8)
            .open(&path, OpenMode::create())
            .unwrap();
        for i in 0..500 {
            db.put(format!("key_{:04}", i).as_bytes(), format!("{}", i).as_bytes())
                .unwrap();
        }
        db.putdup(b"key_0000", b"dup").unwrap();
        db.close().unwrap();
    }

    let db = BTreeDb::open(&path, OpenMode::reader()).unwrap();
    assert_eq!(db.rnum(), 501);
    assert_eq!(db.getlist(b"key_0000").unwrap(), vec!["0", "dup"]);
    let keys = db.range(None, None, None).unwrap();
    assert_eq!(keys.len(), 500);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_btree_drop_writes_back_pages() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dropped.sbt");

    {
        let db = BTreeDb::open(&path, OpenMode::create()).unwrap();
        for i in 0..300 {
            db.put(format!("{:03}", i).as_bytes(), b"v").unwrap();
        }
    }

    let db = BTreeDb::open(&path, OpenMode::reader()).unwrap();
    assert_eq!(db.rnum(), 300);
    assert_eq!(db.get(b"299").unwrap().as_deref(), Some(&b"v"[..]));
}

#[test]
fn test_fixed_persistence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("casket.sfx");

    {
        let db = FixedDb::builder()
            .width(16)
            .open(&path, OpenMode::create())
            .unwrap();
        db.put(3, b"three").unwrap();
        db.put(10, b"ten").unwrap();
        db.close().unwrap();
    }

    // Geometry comes from the file, not the builder
    let db = FixedDb::builder()
        .width(999)
        .open(&path, OpenMode::reader())
        .unwrap();
    assert_eq!(db.width(), 16);
    assert_eq!(db.rnum(), 2);
    assert_eq!(db.get(10).unwrap().as_deref(), Some(&b"ten"[..]));
    assert_eq!(db.range("[min,max]", None).unwrap(), vec![3, 10]);
}

#[test]
fn test_engine_kind_mismatch() {
    let dir = TempDir::new().unwrap();
    let hash_path = dir.path().join("hash.shh");
    let fixed_path = dir.path().join("fixed.sfx");

    HashDb::open(&hash_path, OpenMode::create())
        .unwrap()
        .close()
        .unwrap();
    FixedDb::open(&fixed_path, OpenMode::create())
        .unwrap()
        .close()
        .unwrap();

    let err = BTreeDb::open(&hash_path, OpenMode::reader()).err().unwrap();
    assert_eq!(err.code(), ErrorCode::Meta);
    let err = FixedDb::open(&hash_path, OpenMode::reader()).err().unwrap();
    assert_eq!(err.code(), ErrorCode::Meta);
    let err = HashDb::open(&fixed_path, OpenMode::reader()).err().unwrap();
    assert_eq!(err.code(), ErrorCode::Meta);
}

#[test]
fn test_truncate_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trunc.shh");

    {
        let db = HashDb::open(&path, OpenMode::create()).unwrap();
        db.put(b"old", b"data").unwrap();
    }

    let db = HashDb::open(&path, OpenMode::truncate()).unwrap();
    assert_eq!(db.rnum(), 0);
    assert!(db.get(b"old").unwrap().is_none());
}
