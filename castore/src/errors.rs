use cid::Cid;
use thiserror::Error;
use tokio::task::JoinError;

/// Errors returned by the block store, the resolver, the importer, the pin
/// manager and the collector.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum Error {
    #[error("block {0} not found")]
    NotFound(Cid),

    #[error("unsupported format: {0:#x}")]
    UnsupportedFormat(u64),

    #[error("malformed node: {0}")]
    MalformedNode(String),

    #[error("unable to encode node: {0}")]
    EncodeError(String),

    /// `remainder_path` starts with the first segment that could not be
    /// matched below `cid`.
    #[error("no link named {remainder_path:?} under {cid}")]
    PathNotFound { cid: Cid, remainder_path: String },

    #[error("dag rooted at {root} is incomplete, block {missing} is missing")]
    IncompleteDag { root: Cid, missing: Cid },

    #[error("{0} is not pinned")]
    NotPinned(Cid),

    #[error("{0} is pinned recursively")]
    PinnedRecursively(Cid),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out")]
    TimedOut,

    #[error("sharding limit exceeded: {0}")]
    ShardingLimitExceeded(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal storage error: {0}")]
    StorageError(String),
}

impl From<JoinError> for Error {
    fn from(value: JoinError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<cid::Error> for Error {
    fn from(value: cid::Error) -> Self {
        Error::InvalidRequest(value.to_string())
    }
}

impl From<redb::Error> for Error {
    fn from(value: redb::Error) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(value: redb::DatabaseError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<redb::TableError> for Error {
    fn from(value: redb::TableError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(value: redb::TransactionError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<redb::StorageError> for Error {
    fn from(value: redb::StorageError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<redb::CommitError> for Error {
    fn from(value: redb::CommitError) -> Self {
        Error::StorageError(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        if value.kind() == std::io::ErrorKind::InvalidInput {
            Error::InvalidRequest(value.to_string())
        } else {
            Error::StorageError(value.to_string())
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::InvalidRequest(msg) => Self::new(std::io::ErrorKind::InvalidInput, msg),
            Error::NotFound(cid) => Self::new(std::io::ErrorKind::NotFound, cid.to_string()),
            Error::Cancelled => Self::new(std::io::ErrorKind::Interrupted, "operation cancelled"),
            Error::TimedOut => Self::new(std::io::ErrorKind::TimedOut, "operation timed out"),
            e => Self::new(std::io::ErrorKind::Other, e.to_string()),
        }
    }
}
