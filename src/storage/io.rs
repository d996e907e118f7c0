use std::fs::File;
use std::sync::Arc;

use crate::error::{IoOp, Result, ShelfError};
use crate::stats::Statistics;

/// Positioned reads and writes over the database file.
pub struct DiskIO {
    file: File,
    stats: Arc<Statistics>,
}

impl DiskIO {
    pub fn new(file: File, stats: Arc<Statistics>) -> Self {
        Self { file, stats }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.read_into(offset, &mut buffer)?;
        Ok(buffer)
    }

    pub fn read_into(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file
                .read_exact_at(buffer, offset)
                .map_err(|e| ShelfError::io(IoOp::Read, e))?;
        }

        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            let mut done = 0;
            while done < buffer.len() {
                let n = self
                    .file
                    .seek_read(&mut buffer[done..], offset + done as u64)
                    .map_err(|e| ShelfError::io(IoOp::Read, e))?;
                if n == 0 {
                    return Err(ShelfError::io(
                        IoOp::Read,
                        std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read"),
                    ));
                }
                done += n;
            }
        }

        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = self
                .file
                .try_clone()
                .map_err(|e| ShelfError::io(IoOp::Read, e))?;
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| ShelfError::io(IoOp::Seek, e))?;
            file.read_exact(buffer)
                .map_err(|e| ShelfError::io(IoOp::Read, e))?;
        }

        self.stats.record_disk_read(buffer.len() as u64);
        Ok(())
    }

    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file
                .write_all_at(data, offset)
                .map_err(|e| ShelfError::io(IoOp::Write, e))?;
        }

        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            let mut done = 0;
            while done < data.len() {
                let n = self
                    .file
                    .seek_write(&data[done..], offset + done as u64)
                    .map_err(|e| ShelfError::io(IoOp::Write, e))?;
                if n == 0 {
                    return Err(ShelfError::io(
                        IoOp::Write,
                        std::io::Error::new(std::io::ErrorKind::WriteZero, "partial write"),
                    ));
                }
                done += n;
            }
        }

        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Seek, SeekFrom, Write};
            let mut file = self
                .file
                .try_clone()
                .map_err(|e| ShelfError::io(IoOp::Write, e))?;
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| ShelfError::io(IoOp::Seek, e))?;
            file.write_all(data)
                .map_err(|e| ShelfError::io(IoOp::Write, e))?;
        }

        self.stats.record_disk_write(data.len() as u64);
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| ShelfError::io(IoOp::Sync, e))
    }

    pub fn file_len(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| ShelfError::io(IoOp::Stat, e))
    }

    pub fn set_len(&self, len: u64) -> Result<()> {
        self.file
            .set_len(len)
            .map_err(|e| ShelfError::io(IoOp::Truncate, e))
    }
}
