use std::io;
use thiserror::Error;

/// Numeric error taxonomy shared by every engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success,
    Thread,
    Invalid,
    NoFile,
    NoPerm,
    Meta,
    RecordHeader,
    Open,
    Close,
    Truncate,
    Sync,
    Stat,
    Seek,
    Read,
    Write,
    Mmap,
    Lock,
    Unlink,
    Rename,
    Mkdir,
    Rmdir,
    Keep,
    NoRecord,
    Misc,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::Thread => 1,
            ErrorCode::Invalid => 2,
            ErrorCode::NoFile => 3,
            ErrorCode::NoPerm => 4,
            ErrorCode::Meta => 5,
            ErrorCode::RecordHeader => 6,
            ErrorCode::Open => 7,
            ErrorCode::Close => 8,
            ErrorCode::Truncate => 9,
            ErrorCode::Sync => 10,
            ErrorCode::Stat => 11,
            ErrorCode::Seek => 12,
            ErrorCode::Read => 13,
            ErrorCode::Write => 14,
            ErrorCode::Mmap => 15,
            ErrorCode::Lock => 16,
            ErrorCode::Unlink => 17,
            ErrorCode::Rename => 18,
            ErrorCode::Mkdir => 19,
            ErrorCode::Rmdir => 20,
            ErrorCode::Keep => 21,
            ErrorCode::NoRecord => 22,
            ErrorCode::Misc => 9999,
        }
    }

    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => ErrorCode::Success,
            1 => ErrorCode::Thread,
            2 => ErrorCode::Invalid,
            3 => ErrorCode::NoFile,
            4 => ErrorCode::NoPerm,
            5 => ErrorCode::Meta,
            6 => ErrorCode::RecordHeader,
            7 => ErrorCode::Open,
            8 => ErrorCode::Close,
            9 => ErrorCode::Truncate,
            10 => ErrorCode::Sync,
            11 => ErrorCode::Stat,
            12 => ErrorCode::Seek,
            13 => ErrorCode::Read,
            14 => ErrorCode::Write,
            15 => ErrorCode::Mmap,
            16 => ErrorCode::Lock,
            17 => ErrorCode::Unlink,
            18 => ErrorCode::Rename,
            19 => ErrorCode::Mkdir,
            20 => ErrorCode::Rmdir,
            21 => ErrorCode::Keep,
            22 => ErrorCode::NoRecord,
            _ => ErrorCode::Misc,
        }
    }

    /// Human readable message for an error code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::Thread => "threading error",
            ErrorCode::Invalid => "invalid operation",
            ErrorCode::NoFile => "file not found",
            ErrorCode::NoPerm => "no permission",
            ErrorCode::Meta => "invalid meta data",
            ErrorCode::RecordHeader => "invalid record header",
            ErrorCode::Open => "open error",
            ErrorCode::Close => "close error",
            ErrorCode::Truncate => "trunc error",
            ErrorCode::Sync => "sync error",
            ErrorCode::Stat => "stat error",
            ErrorCode::Seek => "seek error",
            ErrorCode::Read => "read error",
            ErrorCode::Write => "write error",
            ErrorCode::Mmap => "mmap error",
            ErrorCode::Lock => "lock error",
            ErrorCode::Unlink => "unlink error",
            ErrorCode::Rename => "rename error",
            ErrorCode::Mkdir => "mkdir error",
            ErrorCode::Rmdir => "rmdir error",
            ErrorCode::Keep => "existing record",
            ErrorCode::NoRecord => "no record found",
            ErrorCode::Misc => "miscellaneous error",
        }
    }
}

/// Message for a numeric error code.
pub fn errmsg(code: i32) -> &'static str {
    ErrorCode::from_i32(code).message()
}

/// I/O primitive that failed; selects the taxonomy entry for an `io::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Open,
    Close,
    Truncate,
    Sync,
    Stat,
    Seek,
    Read,
    Write,
    Unlink,
    Rename,
}

#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("threading error: {0}")]
    Thread(&'static str),

    #[error("invalid operation: {0}")]
    Invalid(&'static str),

    #[error("file not found: {0}")]
    NoFile(String),

    #[error("permission denied: {0}")]
    NoPerm(String),

    #[error("invalid meta data: {0}")]
    Meta(&'static str),

    #[error("invalid record header at offset {offset}")]
    RecordHeader { offset: u64 },

    #[error("{op:?} failed: {source}")]
    Io {
        op: IoOp,
        #[source]
        source: io::Error,
    },

    #[error("lock error: {0}")]
    Lock(&'static str),

    #[error("existing record")]
    Keep,

    #[error("no record found")]
    NoRecord,

    #[error("miscellaneous error: {0}")]
    Misc(String),
}

pub type Result<T> = std::result::Result<T, ShelfError>;

impl ShelfError {
    /// Wraps an `io::Error` raised by the given primitive.
    pub fn io(op: IoOp, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound if op == IoOp::Open => ShelfError::NoFile(source.to_string()),
            io::ErrorKind::PermissionDenied if op == IoOp::Open => {
                ShelfError::NoPerm(source.to_string())
            }
            _ => ShelfError::Io { op, source },
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ShelfError::Thread(_) => ErrorCode::Thread,
            ShelfError::Invalid(_) => ErrorCode::Invalid,
            ShelfError::NoFile(_) => ErrorCode::NoFile,
            ShelfError::NoPerm(_) => ErrorCode::NoPerm,
            ShelfError::Meta(_) => ErrorCode::Meta,
            ShelfError::RecordHeader { .. } => ErrorCode::RecordHeader,
            ShelfError::Io { op, .. } => match op {
                IoOp::Open => ErrorCode::Open,
                IoOp::Close => ErrorCode::Close,
                IoOp::Truncate => ErrorCode::Truncate,
                IoOp::Sync => ErrorCode::Sync,
                IoOp::Stat => ErrorCode::Stat,
                IoOp::Seek => ErrorCode::Seek,
                IoOp::Read => ErrorCode::Read,
                IoOp::Write => ErrorCode::Write,
                IoOp::Unlink => ErrorCode::Unlink,
                IoOp::Rename => ErrorCode::Rename,
            },
            ShelfError::Lock(_) => ErrorCode::Lock,
            ShelfError::Keep => ErrorCode::Keep,
            ShelfError::NoRecord => ErrorCode::NoRecord,
            ShelfError::Misc(_) => ErrorCode::Misc,
        }
    }
}
