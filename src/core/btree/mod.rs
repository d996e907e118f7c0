use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::thread;

use crate::stats::Statistics;

pub use self::builder::BTreeDbBuilder;
pub use self::comparator::{Comparator, CustomComparator};
pub use self::cursor::{Cursor, CursorPutMode};
pub use self::ops::{Bound, TreePut};
pub use self::tree::TreeCore;

pub mod builder;
pub mod comparator;
pub mod cursor;
pub mod meta;
pub mod node;
pub mod node_cache;
pub mod operations;
pub mod ops;
pub mod transaction;
pub mod tree;

/// Persistent B+tree database with ordered keys and duplicate values.
///
/// Keys are kept in comparator order; each key holds one or more values in
/// insertion order. The tree's pages are stored as records of a hash file
/// and cached in memory, with at most `lcnum` leaves and `ncnum` inner
/// nodes resident.
///
/// # Thread Safety
///
/// All methods take `&self` and serialize on an internal mutex. While a
/// transaction is active, calls from threads other than the one that began
/// it wait until it is committed or aborted.
///
/// # Example
///
/// ```no_run
/// use shelfdb::{BTreeDb, Bound, OpenMode};
///
/// # fn main() -> shelfdb::Result<()> {
/// let db = BTreeDb::open("casket.sbt", OpenMode::create())?;
/// db.put(b"apple", b"red")?;
/// db.putdup(b"apple", b"green")?;
/// db.put(b"banana", b"yellow")?;
///
/// assert_eq!(db.vnum(b"apple")?, 2);
/// let keys = db.range(Some(Bound { key: b"a", inclusive: true }), None, None)?;
/// assert_eq!(keys.len(), 2);
/// db.close()?;
/// # Ok(())
/// # }
/// ```
pub struct BTreeDb {
    pub(super) core: Mutex<TreeCore>,
    pub(super) tran_cv: Condvar,
    pub(super) stats: Arc<Statistics>,
}

impl BTreeDb {
    /// Locks the tree, waiting out a transaction owned by another thread.
    pub(crate) fn lock(&self) -> MutexGuard<'_, TreeCore> {
        let me = thread::current().id();
        let mut core = self.core.lock();
        while core.transaction_owner().is_some_and(|owner| owner != me) {
            self.tran_cv.wait(&mut core);
        }
        core
    }
}

impl Drop for BTreeDb {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        if let Err(e) = core.shutdown() {
            tracing::warn!(error = %e, "closing B-tree database on drop failed");
        }
    }
}
