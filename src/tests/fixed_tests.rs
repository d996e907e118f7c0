use crate::constants::{FIXED_HEADER_SIZE, FIXED_SLOT_OVERHEAD};
use crate::core::fixed::{FixedCore, FixedDb, FixedKey};
use crate::core::hash::PutMode;
use crate::core::options::{FixedTuning, OpenMode};
use crate::error::{ErrorCode, ShelfError};
use crate::stats::Statistics;
use std::sync::Arc;
use tempfile::TempDir;

fn open_db(dir: &TempDir, width: u32) -> FixedDb {
    FixedDb::builder()
        .width(width)
        .open(dir.path().join("casket.sfx"), OpenMode::create())
        .unwrap()
}

#[test]
fn test_put_get_out() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, 16);

    db.put(1, b"one").unwrap();
    db.put(42, b"forty-two").unwrap();
    assert_eq!(db.get(1).unwrap().as_deref(), Some(&b"one"[..]));
    assert_eq!(db.vsiz(42).unwrap(), Some(9));
    assert!(db.get(2).unwrap().is_none());
    assert_eq!(db.rnum(), 2);

    db.out(1).unwrap();
    assert!(db.get(1).unwrap().is_none());
    assert!(matches!(db.out(1), Err(ShelfError::NoRecord)));
    assert_eq!(db.rnum(), 1);
}

#[test]
fn test_put_modes() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, 8);

    assert!(db.putkeep(5, b"abc").unwrap());
    assert!(!db.putkeep(5, b"xyz").unwrap());
    db.putcat(5, b"def").unwrap();
    assert_eq!(db.get(5).unwrap().as_deref(), Some(&b"abcdef"[..]));

    // The joined value must still fit
    let err = db.putcat(5, b"ghi").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Invalid);
    assert_eq!(db.get(5).unwrap().as_deref(), Some(&b"abcdef"[..]));

    db.putcat(6, b"new").unwrap();
    assert_eq!(db.get(6).unwrap().as_deref(), Some(&b"new"[..]));
}

#[test]
fn test_value_width_limit() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, 4);

    db.put(1, b"four").unwrap();
    db.put(2, b"").unwrap();
    assert_eq!(db.vsiz(2).unwrap(), Some(0));

    let err = db.put(3, b"fives").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Invalid);
    assert!(db.get(3).unwrap().is_none());
    assert_eq!(db.rnum(), 2);
}

#[test]
fn test_id_bounds() {
    let dir = TempDir::new().unwrap();
    let width = 8u32;
    let slots = 10u64;
    let limsiz = FIXED_HEADER_SIZE as u64 + slots * (FIXED_SLOT_OVERHEAD as u64 + width as u64);
    let db = FixedDb::builder()
        .width(width)
        .limsiz(limsiz)
        .open(dir.path().join("bounded.sfx"), OpenMode::create())
        .unwrap();

    assert_eq!(db.limit(), slots);
    db.put(slots, b"last").unwrap();
    assert_eq!(db.put(slots + 1, b"over").unwrap_err().code(), ErrorCode::Invalid);
    assert_eq!(db.put(0, b"zero").unwrap_err().code(), ErrorCode::Invalid);
    assert!(db.get(0).is_err());
    assert!(db.fsiz() <= limsiz);
}

#[test]
fn test_relative_keys() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, 16);

    // Empty database: next is 1, the rest name nothing
    assert!(db.get(FixedKey::Min).unwrap().is_none());
    assert!(db.get(FixedKey::Max).unwrap().is_none());
    assert!(db.get(FixedKey::Prev).unwrap().is_none());
    assert_eq!(db.put(FixedKey::Max, b"x").unwrap_err().code(), ErrorCode::Invalid);
    assert_eq!(db.put(FixedKey::Prev, b"x").unwrap_err().code(), ErrorCode::Invalid);

    db.put(FixedKey::Next, b"first").unwrap();
    db.put(FixedKey::Next, b"second").unwrap();
    assert_eq!(db.range("[min,max]", None).unwrap(), vec![1, 2]);

    db.put(10, b"tenth").unwrap();
    assert_eq!(db.get(FixedKey::Max).unwrap().as_deref(), Some(&b"tenth"[..]));
    assert_eq!(db.get(FixedKey::Min).unwrap().as_deref(), Some(&b"first"[..]));

    db.put(FixedKey::Next, b"eleventh").unwrap();
    assert_eq!(db.get(11).unwrap().as_deref(), Some(&b"eleventh"[..]));

    // Prev of id 1 is out of range
    assert_eq!(db.put(FixedKey::Prev, b"x").unwrap_err().code(), ErrorCode::Invalid);

    db.out(1).unwrap();
    db.out(2).unwrap();
    db.put(FixedKey::Prev, b"ninth").unwrap();
    assert_eq!(db.get(9).unwrap().as_deref(), Some(&b"ninth"[..]));

    db.out(FixedKey::Max).unwrap();
    assert!(db.get(11).unwrap().is_none());
}

#[test]
fn test_textual_keys() {
    assert_eq!(FixedKey::parse(b"12").unwrap(), FixedKey::Id(12));
    assert_eq!(FixedKey::parse(b" max ").unwrap(), FixedKey::Max);
    assert_eq!(FixedKey::parse(b"MIN").unwrap(), FixedKey::Min);
    assert_eq!(FixedKey::parse(b"next").unwrap(), FixedKey::Next);
    assert_eq!(FixedKey::parse(b"prev").unwrap(), FixedKey::Prev);
    assert!(FixedKey::parse(b"-1").is_err());
    assert!(FixedKey::parse(b"twelve").is_err());
    assert!(FixedKey::parse(&[0xff, 0xfe]).is_err());
}

#[test]
fn test_interval_ranges() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, 8);

    for id in [2, 3, 5, 8, 13, 21] {
        db.put(id, b"fib").unwrap();
    }

    assert_eq!(db.range("[3,13]", None).unwrap(), vec![3, 5, 8, 13]);
    assert_eq!(db.range("(3,13)", None).unwrap(), vec![5, 8]);
    assert_eq!(db.range("[min,5)", None).unwrap(), vec![2, 3]);
    assert_eq!(db.range("(8,max]", None).unwrap(), vec![13, 21]);
    assert_eq!(db.range("[min,max]", Some(3)).unwrap(), vec![2, 3, 5]);
    assert_eq!(db.range("8", None).unwrap(), vec![8]);
    assert!(db.range("9", None).unwrap().is_empty());
    assert!(db.range("[13,3]", None).unwrap().is_empty());
    assert!(db.range("(0,1)", None).unwrap().is_empty());

    assert_eq!(db.range("[1,", None).unwrap_err().code(), ErrorCode::Invalid);

    assert_eq!(db.range_ids(4, 20, None), vec![5, 8, 13]);
    assert_eq!(db.range_ids(1, 100, Some(2)), vec![2, 3]);
}

#[test]
fn test_range_on_empty_database() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, 8);
    assert!(db.range("[min,max]", None).unwrap().is_empty());
    assert!(db.range_ids(1, 10, None).is_empty());
}

#[test]
fn test_iteration_in_id_order() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, 8);

    for id in [7, 1, 300, 42] {
        db.put(id, b"v").unwrap();
    }

    db.iter_init();
    let mut ids = vec![];
    while let Some(id) = db.iter_next() {
        ids.push(id);
    }
    assert_eq!(ids, vec![1, 7, 42, 300]);
    assert!(db.iter_next().is_none());

    // Records removed mid iteration are skipped
    db.iter_init();
    assert_eq!(db.iter_next(), Some(1));
    db.out(7).unwrap();
    assert_eq!(db.iter_next(), Some(42));
}

#[test]
fn test_reopen_rebuilds_id_set() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reopen.sfx");

    {
        let db = FixedDb::builder()
            .width(8)
            .open(&path, OpenMode::create())
            .unwrap();
        for id in 1..=100 {
            db.put(id, format!("{}", id).as_bytes()).unwrap();
        }
        for id in (1..=100).step_by(2) {
            db.out(id).unwrap();
        }
    }

    let db = FixedDb::open(&path, OpenMode::reader()).unwrap();
    assert_eq!(db.rnum(), 50);
    assert_eq!(db.get(FixedKey::Min).unwrap().as_deref(), Some(&b"2"[..]));
    assert_eq!(db.range("[10,20]", None).unwrap(), vec![10, 12, 14, 16, 18, 20]);
    assert!(db.put(1, b"x").is_err());
}

#[test]
fn test_optimize_changes_width() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, 64);

    for id in 1..=20 {
        db.put(id, format!("value{}", id).as_bytes()).unwrap();
    }
    let before = db.fsiz();

    db.optimize(8, 0).unwrap();
    assert_eq!(db.width(), 8);
    assert!(db.fsiz() < before);
    assert_eq!(db.rnum(), 20);
    assert_eq!(db.get(20).unwrap().as_deref(), Some(&b"value20"[..]));

    // Handle keeps working with the new geometry
    db.put(21, b"value21").unwrap();
    assert!(db.put(22, b"too wide value").is_err());
}

#[test]
fn test_optimize_fails_when_values_do_not_fit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("casket.sfx");
    let db = open_db(&dir, 32);

    db.put(1, b"short").unwrap();
    db.put(2, b"this value is far too long").unwrap();

    let err = db.optimize(8, 0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Invalid);

    // Original file untouched and still usable
    assert_eq!(db.width(), 32);
    assert_eq!(
        db.get(2).unwrap().as_deref(),
        Some(&b"this value is far too long"[..])
    );
    db.put(3, b"more").unwrap();
    drop(db);

    let reopened = FixedDb::open(&path, OpenMode::reader()).unwrap();
    assert_eq!(reopened.rnum(), 3);
    // The rebuild file was cleaned up
    assert_eq!(dir.path().read_dir().unwrap().count(), 1);
}

#[test]
fn test_vanish() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, 8);

    for id in 1..=10 {
        db.put(id, b"v").unwrap();
    }
    db.vanish().unwrap();
    assert_eq!(db.rnum(), 0);
    assert_eq!(db.fsiz(), FIXED_HEADER_SIZE as u64);
    assert!(db.get(FixedKey::Max).unwrap().is_none());

    db.put(FixedKey::Next, b"fresh").unwrap();
    assert_eq!(db.get(1).unwrap().as_deref(), Some(&b"fresh"[..]));
}

#[test]
fn test_recovery_after_unclean_shutdown() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("live.sfx");
    let crashed = dir.path().join("crashed.sfx");

    let db = FixedDb::builder()
        .width(8)
        .open(&path, OpenMode::create())
        .unwrap();
    for id in 1..=30 {
        db.put(id, b"v").unwrap();
    }
    db.out(15).unwrap();
    std::fs::copy(&path, &crashed).unwrap();
    drop(db);

    let db = FixedDb::open(&crashed, OpenMode::writer()).unwrap();
    assert_eq!(db.rnum(), 29);
    assert!(db.get(15).unwrap().is_none());
    assert_eq!(db.get(FixedKey::Max).unwrap().as_deref(), Some(&b"v"[..]));
}

#[test]
fn test_copy() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, 8);
    db.put(3, b"three").unwrap();

    let backup = dir.path().join("backup.sfx");
    db.copy(&backup).unwrap();

    let copy = FixedDb::open(&backup, OpenMode::reader()).unwrap();
    assert_eq!(copy.get(3).unwrap().as_deref(), Some(&b"three"[..]));
    assert_eq!(copy.width(), 8);
}

#[test]
fn test_short_value_at_highest_id() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tail.sfx");
    let slot = (FIXED_SLOT_OVERHEAD + 16) as u64;

    {
        let db = FixedDb::builder()
            .width(16)
            .open(&path, OpenMode::create())
            .unwrap();
        db.put(FixedKey::Next, b"a").unwrap();
        db.put(5, b"e").unwrap();
        db.put(FixedKey::Next, b"f").unwrap();

        // Highest id holds a value much shorter than the slot
        assert_eq!(db.get(FixedKey::Max).unwrap().as_deref(), Some(&b"f"[..]));
        assert_eq!(db.vsiz(6).unwrap(), Some(1));
        assert!(!db.putkeep(6, b"x").unwrap());
        db.putcat(6, b"gh").unwrap();
        assert_eq!(db.get(6).unwrap().as_deref(), Some(&b"fgh"[..]));

        // The file ends exactly on the last slot
        let on_disk = std::fs::metadata(&path).unwrap().len();
        assert_eq!(on_disk, FIXED_HEADER_SIZE as u64 + 6 * slot);
        assert_eq!(db.fsiz(), on_disk);
        db.close().unwrap();
    }

    let db = FixedDb::open(&path, OpenMode::writer()).unwrap();
    assert_eq!(db.rnum(), 3);
    assert_eq!(db.get(FixedKey::Max).unwrap().as_deref(), Some(&b"fgh"[..]));
    assert_eq!(db.range("[min,max]", None).unwrap(), vec![1, 5, 6]);
}

#[test]
fn test_partial_tail_slot_is_recovered() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cut.sfx");

    {
        let db = FixedDb::builder()
            .width(8)
            .open(&path, OpenMode::create())
            .unwrap();
        for id in 1..=3 {
            db.put(id, b"abc").unwrap();
        }
    }

    // Drop the unused end of the last slot
    let full = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(full - 4).unwrap();
    drop(file);

    let db = FixedDb::open(&path, OpenMode::writer()).unwrap();
    assert_eq!(db.rnum(), 3);
    assert_eq!(db.get(3).unwrap().as_deref(), Some(&b"abc"[..]));
    assert_eq!(std::fs::metadata(&path).unwrap().len(), full);
}

#[test]
fn test_range_ids_across_sparse_ids() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, 4);

    for id in [3, 65_535, 65_536, 70_000, 200_000] {
        db.put(id, b"v").unwrap();
    }

    assert_eq!(db.range_ids(65_536, 199_999, None), vec![65_536, 70_000]);
    assert_eq!(db.range_ids(70_001, 200_000, None), vec![200_000]);
    assert_eq!(db.range_ids(4, 65_535, None), vec![65_535]);
    assert!(db.range_ids(200_001, 300_000, None).is_empty());
    assert_eq!(db.range("(3,max)", Some(2)).unwrap(), vec![65_535, 65_536]);
}

#[test]
fn test_failed_reopen_closes_connection() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gone.sfx");
    let stats = Arc::new(Statistics::new());

    let mut core =
        FixedCore::open(&path, OpenMode::create(), FixedTuning::default(), stats).unwrap();
    core.put(FixedKey::Id(1), b"v", PutMode::Overwrite).unwrap();

    // Nothing left at the path to reopen
    std::fs::remove_file(&path).unwrap();
    let err = core.reopen(FixedTuning::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoFile);

    let err = core.put(FixedKey::Id(2), b"w", PutMode::Overwrite).unwrap_err();
    assert!(matches!(err, ShelfError::Invalid(msg) if msg.contains("failed optimize")));
    assert!(core.get(FixedKey::Id(1)).is_err());
    assert!(core.range("[min,max]", None).is_err());
    assert!(core.sync().is_err());
}
