use crate::models::PersistKey;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The transaction could not be acquired or committed
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Persisted roles already exist for {0}")]
    Conflict(PersistKey),

    #[error("No persisted roles exist for {0}")]
    NotFound(PersistKey),

    #[error("Refusing to persist an empty role set for {0}")]
    EmptyRoleSet(PersistKey),
}

impl StoreError {
    /// Sequencing errors mean the cache and store have diverged
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StoreError::Unavailable(_))
    }
}

impl From<db::ClientError> for StoreError {
    fn from(err: db::ClientError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<db::pg::Error> for StoreError {
    fn from(err: db::pg::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Role grant denied: {0}")]
    GrantDenied(String),

    #[error("Platform unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Platform(#[from] PlatformError),
}

impl Error {
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Store(err) => err.is_fatal(),
            Error::Platform(_) => false,
        }
    }

    /// Whether trying the same operation again later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Store(StoreError::Unavailable(_)))
    }
}
