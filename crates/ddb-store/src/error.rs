/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The namespace does not exist.
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    /// The bucket does not exist in its namespace.
    #[error("bucket not found: {namespace}/{bucket}")]
    BucketNotFound { namespace: String, bucket: String },

    /// The transaction was already committed or rolled back.
    #[error("transaction is closed")]
    TransactionClosed,

    /// A thread panicked while holding a store lock.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// Error from the SQLite backend.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store configuration is invalid.
    #[error("invalid store configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub(crate) fn namespace_not_found(namespace: &[u8]) -> Self {
        Self::NamespaceNotFound(String::from_utf8_lossy(namespace).into_owned())
    }

    pub(crate) fn bucket_not_found(namespace: &[u8], bucket: &[u8]) -> Self {
        Self::BucketNotFound {
            namespace: String::from_utf8_lossy(namespace).into_owned(),
            bucket: String::from_utf8_lossy(bucket).into_owned(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
