use crate::core::hash::HashDb;
use crate::core::options::{Compression, HashRetune, OpenMode, TuningOptions};
use crate::error::{ErrorCode, ShelfError};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn open_db(dir: &TempDir) -> HashDb {
    HashDb::open(dir.path().join("casket.shh"), OpenMode::create()).unwrap()
}

#[test]
fn test_put_get_out() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    db.put(b"foo", b"hop").unwrap();
    db.put(b"bar", b"step").unwrap();
    assert_eq!(db.get(b"foo").unwrap().as_deref(), Some(&b"hop"[..]));
    assert_eq!(db.vsiz(b"bar").unwrap(), Some(4));
    assert_eq!(db.rnum(), 2);

    db.out(b"foo").unwrap();
    assert!(db.get(b"foo").unwrap().is_none());
    assert!(matches!(db.out(b"foo"), Err(ShelfError::NoRecord)));
    assert_eq!(db.rnum(), 1);
}

#[test]
fn test_put_modes() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    // putkeep only stores absent keys
    assert!(db.putkeep(b"k", b"first").unwrap());
    assert!(!db.putkeep(b"k", b"second").unwrap());
    assert_eq!(db.get(b"k").unwrap().as_deref(), Some(&b"first"[..]));

    // putcat appends, or creates
    db.putcat(b"k", b"+more").unwrap();
    db.putcat(b"new", b"tail").unwrap();
    assert_eq!(db.get(b"k").unwrap().as_deref(), Some(&b"first+more"[..]));
    assert_eq!(db.get(b"new").unwrap().as_deref(), Some(&b"tail"[..]));

    // put overwrites
    db.put(b"k", b"x").unwrap();
    assert_eq!(db.get(b"k").unwrap().as_deref(), Some(&b"x"[..]));
    assert_eq!(db.rnum(), 2);
}

#[test]
fn test_empty_key_and_value() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    db.put(b"", b"empty key").unwrap();
    db.put(b"empty value", b"").unwrap();
    assert_eq!(db.get(b"").unwrap().as_deref(), Some(&b"empty key"[..]));
    assert_eq!(db.get(b"empty value").unwrap().as_deref(), Some(&b""[..]));
    assert_eq!(db.vsiz(b"empty value").unwrap(), Some(0));
}

#[test]
fn test_growing_value_moves_record() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    db.put(b"grow", b"small").unwrap();
    db.put(b"other", b"neighbour").unwrap();
    let big = vec![b'g'; 10_000];
    db.put(b"grow", &big).unwrap();

    assert_eq!(db.get(b"grow").unwrap().as_deref(), Some(&big[..]));
    assert_eq!(db.get(b"other").unwrap().as_deref(), Some(&b"neighbour"[..]));
    assert_eq!(db.rnum(), 2);
}

#[test]
fn test_collisions_in_small_bucket_array() {
    let dir = TempDir::new().unwrap();
    let db = HashDb::builder()
        .bnum(3)
        .open(dir.path().join("chain.shh"), OpenMode::create())
        .unwrap();

    for i in 0..200 {
        db.put(format!("key_{}", i).as_bytes(), format!("value_{}", i).as_bytes())
            .unwrap();
    }
    // Remove from the middle of chains
    for i in (0..200).step_by(3) {
        db.out(format!("key_{}", i).as_bytes()).unwrap();
    }

    for i in 0..200 {
        let got = db.get(format!("key_{}", i).as_bytes()).unwrap();
        if i % 3 == 0 {
            assert!(got.is_none());
        } else {
            assert_eq!(got.unwrap(), format!("value_{}", i).as_bytes());
        }
    }
}

#[test]
fn test_iteration_visits_every_record_once() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    for i in 0..500 {
        db.put(format!("k{}", i).as_bytes(), b"v").unwrap();
    }

    let mut seen = BTreeMap::new();
    db.iter_init().unwrap();
    while let Some(key) = db.iter_next().unwrap() {
        *seen.entry(key).or_insert(0) += 1;
    }
    assert_eq!(seen.len(), 500);
    assert!(seen.values().all(|&n| n == 1));

    // Exhausted iterator keeps returning None
    assert!(db.iter_next().unwrap().is_none());

    let pairs: Vec<_> = db.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(pairs.len(), 500);
}

#[test]
fn test_iterator_on_empty_database() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    db.iter_init().unwrap();
    assert!(db.iter_next().unwrap().is_none());
    assert_eq!(db.iter().count(), 0);
}

#[test]
fn test_fwmkeys() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    for key in ["user:1", "user:2", "user:3", "admin:1", "use"] {
        db.put(key.as_bytes(), b"v").unwrap();
    }

    let mut keys = db.fwmkeys(b"user:", None).unwrap();
    keys.sort();
    assert_eq!(keys, vec!["user:1", "user:2", "user:3"]);

    assert_eq!(db.fwmkeys(b"user:", Some(2)).unwrap().len(), 2);
    assert!(db.fwmkeys(b"none", None).unwrap().is_empty());
    assert!(db.fwmkeys(b"user:", Some(0)).unwrap().is_empty());
    assert_eq!(db.fwmkeys(b"", None).unwrap().len(), 5);
}

#[test]
fn test_putasync_is_visible() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    for i in 0..2500 {
        db.putasync(format!("async_{}", i).as_bytes(), b"queued").unwrap();
    }
    db.putasync(b"async_0", b"latest").unwrap();

    assert_eq!(db.rnum(), 2500);
    assert_eq!(db.get(b"async_0").unwrap().as_deref(), Some(&b"latest"[..]));
    assert_eq!(db.get(b"async_2499").unwrap().as_deref(), Some(&b"queued"[..]));
    assert!(db.stats().writes_buffered >= 2501);
}

#[test]
fn test_counts_include_queued_writes() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    db.put(b"plain", b"v").unwrap();
    let size = db.fsiz();

    // Well under the batch limit, so nothing has been applied yet
    for i in 0..10 {
        db.putasync(format!("queued_{}", i).as_bytes(), b"value").unwrap();
    }
    assert_eq!(db.stats().writes_flushed, 0);

    assert_eq!(db.rnum(), 11);
    assert!(db.fsiz() > size);
    assert_eq!(db.stats().writes_flushed, 10);
}

#[test]
fn test_record_cache() {
    let dir = TempDir::new().unwrap();
    let db = HashDb::builder()
        .cache(16)
        .open(dir.path().join("cached.shh"), OpenMode::create())
        .unwrap();

    db.put(b"hot", b"1").unwrap();
    for _ in 0..10 {
        assert_eq!(db.get(b"hot").unwrap().as_deref(), Some(&b"1"[..]));
    }
    db.put(b"hot", b"2").unwrap();
    assert_eq!(db.get(b"hot").unwrap().as_deref(), Some(&b"2"[..]));
    db.out(b"hot").unwrap();
    assert!(db.get(b"hot").unwrap().is_none());

    assert!(db.stats().cache_hits >= 10);
}

#[test]
fn test_compressed_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("packed.shh");
    let value = "compressible ".repeat(500);

    let plain = HashDb::open(dir.path().join("plain.shh"), OpenMode::create()).unwrap();
    plain.put(b"doc", value.as_bytes()).unwrap();

    {
        let db = HashDb::builder()
            .options(TuningOptions {
                large: false,
                compress: Compression::Snappy,
            })
            .open(&path, OpenMode::create())
            .unwrap();
        db.put(b"doc", value.as_bytes()).unwrap();
        assert_eq!(db.vsiz(b"doc").unwrap(), Some(value.len()));
        assert!(db.fsiz() < plain.fsiz());
        db.close().unwrap();
    }

    let db = HashDb::open(&path, OpenMode::reader()).unwrap();
    assert_eq!(db.get(b"doc").unwrap().unwrap(), value.as_bytes());
}

#[test]
fn test_vanish() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    for i in 0..50 {
        db.put(format!("k{}", i).as_bytes(), b"v").unwrap();
    }
    db.vanish().unwrap();
    assert_eq!(db.rnum(), 0);
    assert!(db.get(b"k1").unwrap().is_none());

    db.put(b"after", b"vanish").unwrap();
    assert_eq!(db.rnum(), 1);
}

#[test]
fn test_optimize_keeps_records() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);

    for i in 0..1000 {
        db.put(format!("key_{}", i).as_bytes(), &vec![b'v'; 100]).unwrap();
    }
    for i in 0..900 {
        db.out(format!("key_{}", i).as_bytes()).unwrap();
    }
    let before = db.fsiz();

    db.optimize(HashRetune {
        bnum: Some(0),
        ..HashRetune::default()
    })
    .unwrap();

    assert!(db.fsiz() < before);
    assert_eq!(db.rnum(), 100);
    for i in 900..1000 {
        assert!(db.get(format!("key_{}", i).as_bytes()).unwrap().is_some());
    }
    // The handle keeps working on the rebuilt file
    db.put(b"post", b"optimize").unwrap();
    assert_eq!(db.rnum(), 101);
}

#[test]
fn test_reader_rejects_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ro.shh");
    {
        let db = HashDb::open(&path, OpenMode::create()).unwrap();
        db.put(b"k", b"v").unwrap();
    }

    let db = HashDb::open(&path, OpenMode::reader()).unwrap();
    assert_eq!(db.get(b"k").unwrap().as_deref(), Some(&b"v"[..]));
    let err = db.put(b"k", b"w").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Invalid);
    assert!(db.out(b"k").is_err());
    assert!(db.vanish().is_err());
}

#[test]
fn test_open_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = HashDb::open(dir.path().join("missing.shh"), OpenMode::writer());
    assert_eq!(result.err().map(|e| e.code()), Some(ErrorCode::NoFile));
}

#[test]
fn test_copy_and_copy_with() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    db.put(b"a", b"1").unwrap();

    let backup = dir.path().join("backup.shh");
    db.copy(&backup).unwrap();

    let mut hooked = None;
    db.copy_with(|path| {
        hooked = Some(path.to_path_buf());
        Ok(())
    })
    .unwrap();
    assert_eq!(hooked, Some(db.path()));

    // A failing hook surfaces its error
    let result = db.copy_with(|_| Err(ShelfError::Misc("backup tool failed".into())));
    assert!(matches!(result, Err(ShelfError::Misc(_))));

    drop(db);
    let copy = HashDb::open(&backup, OpenMode::reader()).unwrap();
    assert_eq!(copy.get(b"a").unwrap().as_deref(), Some(&b"1"[..]));
}
