use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// No valid caller identity
    #[error("unauthenticated")]
    Unauthenticated,

    /// The caller may not act on the target record
    #[error("not authorized: {0}")]
    NotAuthorized(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A uniqueness race at the store; resolved by retrying as a lookup
    #[error("conflict: {0}")]
    Conflict(&'static str),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl SyncError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
