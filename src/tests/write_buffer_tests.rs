use crate::stats::Statistics;
use crate::storage::write_buffer::WriteBuffer;
use std::sync::Arc;

#[test]
fn test_write_buffer_creation() {
    let stats = Arc::new(Statistics::new());
    let wb = WriteBuffer::new(stats);

    assert!(wb.is_empty());
    assert!(!wb.is_full());
    assert_eq!(wb.len(), 0);
}

#[test]
fn test_drain_preserves_arrival_order() {
    let stats = Arc::new(Statistics::new());
    let mut wb = WriteBuffer::new(stats.clone());

    wb.add_write(b"a", b"1");
    wb.add_write(b"b", b"2");
    wb.add_write(b"a", b"3");

    let batch = wb.drain();
    let pairs: Vec<(&[u8], &[u8])> = batch
        .iter()
        .map(|e| (e.key.as_slice(), e.value.as_slice()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (&b"a"[..], &b"1"[..]),
            (&b"b"[..], &b"2"[..]),
            (&b"a"[..], &b"3"[..])
        ]
    );
    assert!(wb.is_empty());

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.writes_buffered, 3);
    assert_eq!(snapshot.writes_flushed, 3);
    assert_eq!(snapshot.flush_count, 1);
}

#[test]
fn test_full_by_entry_count() {
    let stats = Arc::new(Statistics::new());
    let mut wb = WriteBuffer::with_limits(3, usize::MAX, stats);

    assert!(!wb.add_write(b"k1", b"v"));
    assert!(!wb.add_write(b"k2", b"v"));
    assert!(wb.add_write(b"k3", b"v"));
}

#[test]
fn test_full_by_size() {
    let stats = Arc::new(Statistics::new());
    let mut wb = WriteBuffer::with_limits(1000, 100, stats);

    assert!(!wb.add_write(b"key", &[0u8; 50]));
    assert!(wb.add_write(b"key", &[0u8; 50]));

    // Draining resets the size
    wb.drain();
    assert!(!wb.add_write(b"key", &[0u8; 50]));
}

#[test]
fn test_restore_puts_pending_first() {
    let stats = Arc::new(Statistics::new());
    let mut wb = WriteBuffer::new(stats);

    wb.add_write(b"old1", b"v");
    wb.add_write(b"old2", b"v");
    let pending = wb.drain();

    wb.add_write(b"new", b"v");
    wb.restore(pending);

    let keys: Vec<Vec<u8>> = wb.drain().into_iter().map(|e| e.key).collect();
    assert_eq!(
        keys,
        vec![b"old1".to_vec(), b"old2".to_vec(), b"new".to_vec()]
    );
}

#[test]
fn test_empty_drain_is_not_counted() {
    let stats = Arc::new(Statistics::new());
    let mut wb = WriteBuffer::new(stats.clone());

    assert!(wb.drain().is_empty());
    assert_eq!(stats.snapshot().flush_count, 0);
}
