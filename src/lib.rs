//! # ShelfDB - Embeddable Single-File Key-Value Storage
//!
// Copyright 2025 Mehran Toosi
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! ShelfDB stores byte-string records in a single file, in one of three layouts:
//!
//! - [`HashDb`]: bucket array plus collision chains, O(1) average lookups
//! - [`BTreeDb`]: ordered keys with duplicate values, range queries, cursors
//!   and transactions
//! - [`FixedDb`]: an array of fixed-width slots addressed by integer id
//!
//! Every engine also implements [`MapAdapter`], a map-style view over the
//! primitive operations.
//!
//! ## Quick Start
//!
//! ### Hash Database
//! ```no_run
//! use shelfdb::{HashDb, OpenMode};
//!
//! # fn main() -> shelfdb::Result<()> {
//! let db = HashDb::open("casket.shh", OpenMode::create())?;
//!
//! db.put(b"foo", b"hop")?;
//! db.put(b"bar", b"step")?;
//! assert!(!db.putkeep(b"foo", b"skip")?);
//! db.putcat(b"bar", b"!")?;
//!
//! assert_eq!(db.get(b"bar")?.as_deref(), Some(&b"step!"[..]));
//! for record in db.iter() {
//!     let (key, value) = record?;
//!     println!("{:?} => {:?}", key, value);
//! }
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ### B+tree Database
//! ```no_run
//! use shelfdb::{BTreeDb, Bound, OpenMode};
//!
//! # fn main() -> shelfdb::Result<()> {
//! let db = BTreeDb::open("casket.sbt", OpenMode::create())?;
//! db.put(b"user:001", b"alice")?;
//! db.put(b"user:002", b"bob")?;
//! db.putdup(b"user:002", b"robert")?;
//!
//! let keys = db.range(
//!     Some(Bound { key: b"user:", inclusive: true }),
//!     Some(Bound { key: b"user:~", inclusive: false }),
//!     None,
//! )?;
//! assert_eq!(keys.len(), 2);
//!
//! let mut cur = db.cursor();
//! cur.jump(b"user:002")?;
//! assert_eq!(cur.val()?.as_ref(), b"bob");
//! cur.next()?;
//! assert_eq!(cur.val()?.as_ref(), b"robert");
//! # Ok(())
//! # }
//! ```
//!
//! ### Transactions
//!
//! A B-tree transaction covers every change made by the thread that began
//! it. Aborting restores the tree as it was at `tran_begin`; closing the
//! database with a transaction still open aborts it.
//!
//! ```no_run
//! use shelfdb::{BTreeDb, OpenMode};
//!
//! # fn main() -> shelfdb::Result<()> {
//! let db = BTreeDb::open("casket.sbt", OpenMode::create())?;
//! db.tran_begin()?;
//! db.put(b"balance", b"100")?;
//! db.tran_abort()?;
//! assert!(db.get(b"balance")?.is_none());
//! # Ok(())
//! # }
//! ```
//!
//! ### Fixed-Length Database
//! ```no_run
//! use shelfdb::{FixedDb, FixedKey, OpenMode};
//!
//! # fn main() -> shelfdb::Result<()> {
//! let db = FixedDb::builder().width(64).open("casket.sfx", OpenMode::create())?;
//! db.put(1, b"one")?;
//! db.put(FixedKey::Next, b"two")?;
//! assert_eq!(db.range("[1,max]", None)?, vec![1, 2]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Durability
//!
//! Writes go straight to the file; `sync` forces them to stable storage. A
//! writer marks the header dirty before its first change and clears the mark
//! on a clean close. Opening a file that is still marked dirty rebuilds the
//! record count and free pool from a scan of the data area.
//!
//! ## Concurrency
//!
//! Each handle serializes its own calls on an internal mutex, so it can be
//! shared across threads behind an `Arc`. Handles on the same file, in this
//! process or another, coordinate through a file lock: one writer or any
//! number of readers.
//!
//! ## Errors
//!
//! Every fallible call returns [`Result`]. [`ShelfError::code`] maps an error
//! onto the numeric taxonomy in [`ErrorCode`], and [`errmsg`] renders a code
//! as text.

pub mod constants;
pub mod core;
pub mod error;
pub mod stats;
pub mod storage;
pub mod utils;

pub use crate::constants::VERSION;
pub use crate::core::adapter::MapAdapter;
pub use crate::core::btree::{
    BTreeDb, BTreeDbBuilder, Bound, Comparator, Cursor, CursorPutMode, CustomComparator,
};
pub use crate::core::fixed::{FixedDb, FixedDbBuilder, FixedKey, IdInterval};
pub use crate::core::hash::{HashDb, HashDbBuilder, HashIter};
pub use crate::core::options::{
    Access, BTreeRetune, BTreeTuning, Compression, CreatePolicy, FixedTuning, HashRetune,
    HashTuning, LockPolicy, OpenMode, TuningOptions,
};
pub use crate::error::{errmsg, ErrorCode, Result, ShelfError};
pub use crate::stats::{Statistics, StatsSnapshot};

#[cfg(test)]
mod tests;
