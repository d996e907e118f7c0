use parking_lot::Mutex;
use std::sync::Arc;

use crate::stats::Statistics;

pub use self::builder::HashDbBuilder;
pub use self::engine::{HashCore, IterPos, PutMode};
pub use self::iter::HashIter;

pub mod builder;
pub mod engine;
pub mod iter;
pub mod operations;

/// Persistent hash database.
///
/// Records live in collision chains hanging off a fixed bucket array. Lookups
/// are O(1) on average; iteration follows bucket-then-chain order, which is
/// neither insertion order nor key order.
///
/// # Thread Safety
///
/// All methods take `&self`; calls on one connection serialize on an internal
/// mutex. Distinct connections to one file coordinate through the file lock.
///
/// # Example
///
/// ```no_run
/// use shelfdb::{HashDb, OpenMode};
///
/// # fn main() -> shelfdb::Result<()> {
/// let db = HashDb::builder().cache(1024).open("casket.shh", OpenMode::create())?;
/// db.put(b"foo", b"hop")?;
/// assert_eq!(db.get(b"foo")?.as_deref(), Some(&b"hop"[..]));
/// db.close()?;
/// # Ok(())
/// # }
/// ```
pub struct HashDb {
    pub(super) core: Mutex<HashCore>,
    pub(super) stats: Arc<Statistics>,
}
