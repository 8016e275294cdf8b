/// Errors from structural hashing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    /// The value contains structure that has no canonical form, such as a
    /// map keyed by a compound type, or its `Serialize` impl failed.
    #[error("value cannot be hashed: {0}")]
    Unsupported(String),
}
