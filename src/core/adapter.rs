use bytes::Bytes;

use crate::core::btree::BTreeDb;
use crate::core::fixed::{FixedDb, FixedKey};
use crate::core::hash::HashDb;
use crate::error::{Result, ShelfError};

/// Map-style view shared by every engine.
///
/// Fixed-length databases take decimal ids (or `min`, `max`, `prev`,
/// `next`) as keys and report their keys as decimal ids. B-tree databases
/// visit every duplicate as its own record.
///
/// Iteration takes the connection lock once per record, so the callback may
/// call back into the database; records changed during a pass may or may not
/// be seen.
///
/// # Example
///
/// ```no_run
/// use shelfdb::{HashDb, MapAdapter, OpenMode};
///
/// # fn main() -> shelfdb::Result<()> {
/// let db = HashDb::open("casket.shh", OpenMode::create())?;
/// db.store(b"a", b"1")?;
/// assert_eq!(db.fetch(b"b", b"none")?.as_ref(), b"none");
/// assert_eq!(db.key_for_value(b"1")?.as_deref(), Some(&b"a"[..]));
/// # Ok(())
/// # }
/// ```
pub trait MapAdapter {
    /// Stores a record, overwriting the value.
    fn store(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Value of a record.
    fn lookup(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Removes a record; `NoRecord` when it does not exist.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Removes every record.
    fn clear(&self) -> Result<()>;

    /// Number of records.
    fn len(&self) -> u64;

    /// Calls `f` with each record until it returns false.
    fn for_each<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>;

    /// Value of a record, or `default` when it does not exist.
    fn fetch(&self, key: &[u8], default: &[u8]) -> Result<Bytes> {
        Ok(self
            .lookup(key)?
            .unwrap_or_else(|| Bytes::copy_from_slice(default)))
    }

    fn contains_key(&self, key: &[u8]) -> Result<bool> {
        Ok(self.lookup(key)?.is_some())
    }

    fn contains_value(&self, value: &[u8]) -> Result<bool> {
        Ok(self.key_for_value(value)?.is_some())
    }

    /// Key of the first record visited whose value equals `value`.
    fn key_for_value(&self, value: &[u8]) -> Result<Option<Bytes>> {
        let mut found = None;
        self.for_each(|k, v| {
            if v == value {
                found = Some(Bytes::copy_from_slice(k));
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(found)
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn each_key<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        self.for_each(|k, _| f(k))
    }

    fn each_value<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        self.for_each(|_, v| f(v))
    }

    fn keys(&self) -> Result<Vec<Bytes>> {
        let mut keys = Vec::new();
        self.for_each(|k, _| {
            keys.push(Bytes::copy_from_slice(k));
            Ok(true)
        })?;
        Ok(keys)
    }

    fn values(&self) -> Result<Vec<Bytes>> {
        let mut values = Vec::new();
        self.for_each(|_, v| {
            values.push(Bytes::copy_from_slice(v));
            Ok(true)
        })?;
        Ok(values)
    }
}

impl MapAdapter for HashDb {
    fn store(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put(key, value)
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.get(key)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.out(key)
    }

    fn clear(&self) -> Result<()> {
        self.vanish()
    }

    fn len(&self) -> u64 {
        self.rnum()
    }

    fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>,
    {
        for record in self.iter() {
            let (key, value) = record?;
            if !f(&key, &value)? {
                break;
            }
        }
        Ok(())
    }
}

impl MapAdapter for BTreeDb {
    fn store(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put(key, value)
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.get(key)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.out(key)
    }

    fn clear(&self) -> Result<()> {
        self.vanish()
    }

    fn len(&self) -> u64 {
        self.rnum()
    }

    fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>,
    {
        let mut cursor = self.cursor();
        let mut more = cursor.first()?;
        while more {
            let (key, value) = cursor.record()?;
            if !f(&key, &value)? {
                break;
            }
            more = cursor.next()?;
        }
        Ok(())
    }
}

impl MapAdapter for FixedDb {
    fn store(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put(FixedKey::parse(key)?, value)
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<Bytes>> {
        match FixedKey::parse(key) {
            Ok(key) => self.get(key),
            Err(_) => Ok(None),
        }
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        match FixedKey::parse(key) {
            Ok(key) => self.out(key),
            Err(_) => Err(ShelfError::NoRecord),
        }
    }

    fn clear(&self) -> Result<()> {
        self.vanish()
    }

    fn len(&self) -> u64 {
        self.rnum()
    }

    fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool>,
    {
        for id in self.range_ids(1, u64::MAX, None) {
            if let Some(value) = self.get(id)? {
                if !f(id.to_string().as_bytes(), &value)? {
                    break;
                }
            }
        }
        Ok(())
    }
}
