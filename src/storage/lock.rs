use parking_lot::{const_mutex, Mutex};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::core::options::LockPolicy;
use crate::error::{IoOp, Result, ShelfError};

/// Open connections per canonical path inside this process.
#[derive(Debug, Default, Clone, Copy)]
struct PathUse {
    readers: usize,
    writer: bool,
}

static OPEN_PATHS: Mutex<BTreeMap<PathBuf, PathUse>> = const_mutex(BTreeMap::new());

/// File-scoped lock held for the lifetime of a connection.
///
/// Distinct processes are coordinated with `flock`. Connections inside one
/// process are also tracked in a registry so that an incompatible second open
/// fails immediately instead of waiting on a lock its own process holds.
#[derive(Debug)]
pub struct FileLock {
    key: Option<PathBuf>,
    exclusive: bool,
}

impl FileLock {
    pub fn acquire(file: &File, path: &Path, exclusive: bool, policy: LockPolicy) -> Result<Self> {
        if policy == LockPolicy::NoLock {
            return Ok(Self {
                key: None,
                exclusive,
            });
        }

        let key = path
            .canonicalize()
            .map_err(|e| ShelfError::io(IoOp::Stat, e))?;

        {
            let mut paths = OPEN_PATHS.lock();
            let entry = paths.entry(key.clone()).or_default();
            if entry.writer || (exclusive && entry.readers > 0) {
                return Err(ShelfError::Lock("database is already open in this process"));
            }
            if exclusive {
                entry.writer = true;
            } else {
                entry.readers += 1;
            }
        }

        let lock = Self {
            key: Some(key),
            exclusive,
        };
        os_lock(file, exclusive, policy == LockPolicy::NonBlocking)?;
        Ok(lock)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let mut paths = OPEN_PATHS.lock();
            let remove = match paths.get_mut(&key) {
                Some(entry) => {
                    if self.exclusive {
                        entry.writer = false;
                    } else {
                        entry.readers = entry.readers.saturating_sub(1);
                    }
                    !entry.writer && entry.readers == 0
                }
                None => false,
            };
            if remove {
                paths.remove(&key);
            }
        }
    }
}

#[cfg(unix)]
fn os_lock(file: &File, exclusive: bool, nonblocking: bool) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let mut op = if exclusive {
        libc::LOCK_EX
    } else {
        libc::LOCK_SH
    };
    if nonblocking {
        op |= libc::LOCK_NB;
    }

    loop {
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.kind() {
            std::io::ErrorKind::Interrupted => continue,
            std::io::ErrorKind::WouldBlock => {
                return Err(ShelfError::Lock("database file is locked by another process"))
            }
            _ => return Err(ShelfError::Lock("flock failed")),
        }
    }
}

#[cfg(not(unix))]
fn os_lock(_file: &File, _exclusive: bool, _nonblocking: bool) -> Result<()> {
    tracing::warn!("file locking is not supported on this platform; relying on in-process registry");
    Ok(())
}
