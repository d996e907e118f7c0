use shelfdb::{BTreeDb, Bound, FixedDb, FixedKey, HashDb, MapAdapter, OpenMode};
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("ShelfDB Basic Usage Example\n");

    let dir = std::env::temp_dir().join(format!("shelfdb-demo-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;

    // Hash database
    let hash = HashDb::open(dir.join("casket.shh"), OpenMode::truncate())?;

    println!("Inserting 1000 key-value pairs...");
    let start = Instant::now();
    for i in 0..1000 {
        let key = format!("key_{:04}", i);
        let value = format!("value_{:04}", i);
        hash.put(key.as_bytes(), value.as_bytes())?;
    }
    let elapsed = start.elapsed();
    println!(
        "Insert time: {:?} ({:.0} ops/sec)\n",
        elapsed,
        1000.0 / elapsed.as_secs_f64()
    );

    println!("Reading 1000 key-value pairs...");
    let start = Instant::now();
    for i in 0..1000 {
        let key = format!("key_{:04}", i);
        let expected = format!("value_{:04}", i);
        let value = hash.get(key.as_bytes())?;
        assert_eq!(value.as_deref(), Some(expected.as_bytes()));
    }
    let elapsed = start.elapsed();
    println!(
        "Read time: {:?} ({:.0} ops/sec)\n",
        elapsed,
        1000.0 / elapsed.as_secs_f64()
    );

    let matches = hash.fwmkeys(b"key_001", Some(5))?;
    println!("Keys starting with key_001: {} found", matches.len());
    println!("Hash records: {}, file size: {} bytes\n", hash.rnum(), hash.fsiz());

    // B+tree database with duplicates and ordered ranges
    let tree = BTreeDb::open(dir.join("casket.sbt"), OpenMode::truncate())?;
    tree.put(b"fruit:apple", b"red")?;
    tree.putdup(b"fruit:apple", b"green")?;
    tree.put(b"fruit:banana", b"yellow")?;
    tree.put(b"veg:carrot", b"orange")?;

    println!("Range query from fruit: to fruit;");
    let keys = tree.range(
        Some(Bound {
            key: b"fruit:",
            inclusive: true,
        }),
        Some(Bound {
            key: b"fruit;",
            inclusive: false,
        }),
        None,
    )?;
    for key in &keys {
        let values: Vec<String> = tree
            .getlist(key)?
            .iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect();
        println!("  {} => {:?}", String::from_utf8_lossy(key), values);
    }

    println!("\nTransaction that is rolled back:");
    tree.tran_begin()?;
    tree.outlist(b"veg:carrot")?;
    println!("  inside: {} records", tree.rnum());
    tree.tran_abort()?;
    println!("  after abort: {} records\n", tree.rnum());

    println!("Walking the tree with a cursor:");
    let mut cur = tree.cursor();
    let mut more = cur.last()?;
    while more {
        let (key, value) = cur.record()?;
        println!(
            "  {} => {}",
            String::from_utf8_lossy(&key),
            String::from_utf8_lossy(&value)
        );
        more = cur.prev()?;
    }

    // Fixed-length database
    let fixed = FixedDb::builder()
        .width(16)
        .open(dir.join("casket.sfx"), OpenMode::truncate())?;
    for name in ["alpha", "beta", "gamma"] {
        fixed.put(FixedKey::Next, name.as_bytes())?;
    }
    println!("\nFixed ids in [min,max]: {:?}", fixed.range("[min,max]", None)?);
    println!(
        "Last record: {:?}",
        fixed
            .get(FixedKey::Max)?
            .map(|v| String::from_utf8_lossy(&v).into_owned())
    );

    // The same map-style surface over every engine
    println!("\nMap view of the fixed database:");
    fixed.for_each(|key, value| {
        println!(
            "  {} => {}",
            String::from_utf8_lossy(key),
            String::from_utf8_lossy(value)
        );
        Ok(true)
    })?;

    println!("\n{}", hash.stats().format());

    hash.close()?;
    tree.close()?;
    fixed.close()?;
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
