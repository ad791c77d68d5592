use db::ClientError as DbError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid Event: {0}")]
    InvalidEvent(String),

    #[error("Database Error: {0}")]
    DbError(#[from] DbError),
}

impl From<db::pg::Error> for Error {
    fn from(err: db::pg::Error) -> Error {
        Error::DbError(err.into())
    }
}
