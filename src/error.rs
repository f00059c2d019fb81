use std::str::Utf8Error;

/// Errors produced while opening a database or running a lookup against it.
#[derive(Debug, thiserror::Error)]
pub enum MmdbError {
    #[error("database is structurally invalid: {0}")]
    InvalidDatabase(&'static str),

    #[error("lookup attempted on a closed database")]
    ClosedDatabase,

    #[error("IO error encountered while reading database")]
    Io(#[from] std::io::Error),

    #[error("non-UTF-8 bytes inside a string value")]
    BadUtf8(#[from] Utf8Error),

    #[error("wrong database type (e.g. querying an IPv6 address against an IPv4-only database)")]
    WrongDatabaseType,

    #[error("caller contract violated: {0}")]
    CallerContract(&'static str),
}

pub type MmdbResult<T> = Result<T, MmdbError>;
