use parking_lot::Mutex;
use std::sync::Arc;

use crate::stats::Statistics;

pub use self::builder::FixedDbBuilder;
pub use self::engine::{FixedCore, FixedHeader, FixedKey};
pub use self::interval::{Endpoint, IdInterval};

pub mod builder;
pub mod engine;
pub mod interval;
pub mod operations;

/// Persistent array of fixed-width records addressed by integer id.
///
/// Every id from 1 up to a limit set by `limsiz` owns a slot of `width`
/// bytes, so reads and writes are a single positioned I/O. [`FixedKey`]
/// also addresses records relative to the current smallest and largest id.
///
/// # Example
///
/// ```no_run
/// use shelfdb::{FixedDb, FixedKey, OpenMode};
///
/// # fn main() -> shelfdb::Result<()> {
/// let db = FixedDb::builder().width(32).open("casket.sfx", OpenMode::create())?;
/// db.put(FixedKey::Next, b"first")?;
/// db.put(FixedKey::Next, b"second")?;
/// assert_eq!(db.get(FixedKey::Max)?.as_deref(), Some(&b"second"[..]));
/// assert_eq!(db.range("[min,max]", None)?, vec![1, 2]);
/// # Ok(())
/// # }
/// ```
pub struct FixedDb {
    pub(super) core: Mutex<FixedCore>,
    pub(super) stats: Arc<Statistics>,
}
