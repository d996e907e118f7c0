use crate::core::btree::{BTreeDb, CursorPutMode};
use crate::core::options::OpenMode;
use crate::error::{ErrorCode, ShelfError};
use bytes::Bytes;
use tempfile::TempDir;

fn open_small(dir: &TempDir) -> BTreeDb {
    BTreeDb::builder()
        .lmemb(4)
        .nmemb(4)
        .cache(8, 8)
        .open(dir.path().join("cursor.sbt"), OpenMode::create())
        .unwrap()
}

fn pair(key: &str, value: &str) -> (Bytes, Bytes) {
    (
        Bytes::copy_from_slice(key.as_bytes()),
        Bytes::copy_from_slice(value.as_bytes()),
    )
}

#[test]
fn test_empty_tree() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir);

    let mut cur = db.cursor();
    assert!(!cur.first().unwrap());
    assert!(!cur.last().unwrap());
    assert!(!cur.jump(b"anything").unwrap());
    assert!(!cur.is_positioned());
    assert!(matches!(cur.record(), Err(ShelfError::NoRecord)));
    assert!(cur.next().is_err());
}

#[test]
fn test_forward_walk_visits_duplicates() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir);

    db.put(b"b", b"1").unwrap();
    db.putdup(b"b", b"2").unwrap();
    db.put(b"a", b"0").unwrap();
    db.put(b"c", b"3").unwrap();

    let mut cur = db.cursor();
    let mut seen = vec![];
    let mut ok = cur.first().unwrap();
    while ok {
        seen.push(cur.record().unwrap());
        ok = cur.next().unwrap();
    }
    assert_eq!(
        seen,
        vec![pair("a", "0"), pair("b", "1"), pair("b", "2"), pair("c", "3")]
    );
    assert!(!cur.is_positioned());
}

#[test]
fn test_backward_walk() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir);

    for i in 0..50 {
        db.put(format!("{:02}", i).as_bytes(), b"v").unwrap();
    }
    db.putdup(b"25", b"w").unwrap();

    let mut cur = db.cursor();
    let mut keys = vec![];
    let mut ok = cur.last().unwrap();
    while ok {
        keys.push(cur.key().unwrap());
        ok = cur.prev().unwrap();
    }
    assert_eq!(keys.len(), 51);
    assert_eq!(keys[0], "49");
    assert_eq!(keys[50], "00");
    // Duplicates come back in reverse insertion order
    let pos = keys.iter().position(|k| k == "25").unwrap();
    assert_eq!(keys[pos + 1], "25");
}

#[test]
fn test_walk_across_many_leaves() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir);

    for i in 0..500 {
        db.put(format!("{:03}", i).as_bytes(), format!("{}", i).as_bytes())
            .unwrap();
    }

    let mut cur = db.cursor();
    let mut count = 0;
    let mut ok = cur.first().unwrap();
    while ok {
        let (key, value) = cur.record().unwrap();
        assert_eq!(key, format!("{:03}", count).as_bytes());
        assert_eq!(value, format!("{}", count).as_bytes());
        count += 1;
        ok = cur.next().unwrap();
    }
    assert_eq!(count, 500);
}

#[test]
fn test_jump() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir);

    for key in ["apple", "banana", "cherry", "date"] {
        db.put(key.as_bytes(), b"fruit").unwrap();
    }

    let mut cur = db.cursor();
    assert!(cur.jump(b"banana").unwrap());
    assert_eq!(cur.key().unwrap(), "banana");

    // Lands on the next key when there is no exact match
    assert!(cur.jump(b"c").unwrap());
    assert_eq!(cur.key().unwrap(), "cherry");
    assert!(cur.prev().unwrap());
    assert_eq!(cur.key().unwrap(), "banana");

    assert!(!cur.jump(b"zebra").unwrap());
    assert!(!cur.is_positioned());
}

#[test]
fn test_put_current() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir);

    db.putlist(b"k", &[b"a", b"b", b"c"]).unwrap();

    let mut cur = db.cursor();
    cur.first().unwrap();
    cur.next().unwrap();
    cur.put(b"B", CursorPutMode::Current).unwrap();

    assert_eq!(cur.val().unwrap(), "B");
    assert_eq!(db.getlist(b"k").unwrap(), vec!["a", "B", "c"]);
    assert_eq!(db.rnum(), 3);

    // The cursor keeps working after its own edit
    assert!(cur.next().unwrap());
    assert_eq!(cur.val().unwrap(), "c");
}

#[test]
fn test_put_before_and_after() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir);

    db.put(b"k", b"mid").unwrap();

    let mut cur = db.cursor();
    assert!(cur.jump(b"k").unwrap());
    cur.put(b"first", CursorPutMode::Before).unwrap();
    assert_eq!(cur.val().unwrap(), "first");

    cur.put(b"second", CursorPutMode::After).unwrap();
    assert_eq!(cur.val().unwrap(), "second");

    assert_eq!(db.getlist(b"k").unwrap(), vec!["first", "second", "mid"]);
    assert_eq!(db.rnum(), 3);
}

#[test]
fn test_out_moves_to_next_record() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir);

    db.putlist(b"a", &[b"1", b"2"]).unwrap();
    db.put(b"b", b"3").unwrap();

    let mut cur = db.cursor();
    cur.first().unwrap();
    cur.out().unwrap();
    assert_eq!(cur.record().unwrap(), pair("a", "2"));

    cur.out().unwrap();
    assert_eq!(cur.record().unwrap(), pair("b", "3"));
    assert_eq!(db.vnum(b"a").unwrap(), 0);

    cur.out().unwrap();
    assert!(!cur.is_positioned());
    assert_eq!(db.rnum(), 0);
}

#[test]
fn test_out_everything_through_cursor() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir);

    for i in 0..300 {
        db.put(format!("{:03}", i).as_bytes(), b"v").unwrap();
    }

    let mut cur = db.cursor();
    cur.first().unwrap();
    let mut removed = 0;
    while cur.is_positioned() {
        cur.out().unwrap();
        removed += 1;
    }
    assert_eq!(removed, 300);
    assert_eq!(db.rnum(), 0);
    assert!(!cur.first().unwrap());
}

#[test]
fn test_outside_change_invalidates_cursor() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir);

    db.put(b"a", b"1").unwrap();
    db.put(b"b", b"2").unwrap();

    let mut cur = db.cursor();
    cur.first().unwrap();
    db.put(b"c", b"3").unwrap();

    let err = cur.next().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Invalid);
    assert!(cur.record().is_err());
    assert!(cur.put(b"x", CursorPutMode::Current).is_err());

    // Repositioning revalidates it
    assert!(cur.first().unwrap());
    assert_eq!(cur.key().unwrap(), "a");
}

#[test]
fn test_two_cursors() {
    let dir = TempDir::new().unwrap();
    let db = open_small(&dir);

    for key in ["a", "b", "c"] {
        db.put(key.as_bytes(), b"v").unwrap();
    }

    let mut forward = db.cursor();
    let mut backward = db.cursor();
    forward.first().unwrap();
    backward.last().unwrap();
    assert_eq!(forward.key().unwrap(), "a");
    assert_eq!(backward.key().unwrap(), "c");

    // Editing through one cursor invalidates the other
    forward.put(b"w", CursorPutMode::Current).unwrap();
    assert!(backward.prev().is_err());
    assert_eq!(forward.val().unwrap(), "w");
}
