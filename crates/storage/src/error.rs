use shared::domain::EventId;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("event {0} not found")]
    EventNotFound(EventId),
    #[error("{kind} {id} not found")]
    ItemNotFound { kind: &'static str, id: i64 },
    #[error("event {0} is already live")]
    AlreadyLive(EventId),
    /// SQLite refused the transaction because another writer got there first.
    #[error("transaction conflict: {0}")]
    Conflict(#[source] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if is_busy(&err) {
            StorageError::Conflict(err)
        } else {
            StorageError::Database(err)
        }
    }
}

// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes such as
// SQLITE_BUSY_SNAPSHOT.
fn is_busy(err: &sqlx::Error) -> bool {
    let Some(db_err) = err.as_database_error() else {
        return false;
    };
    db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, 5 | 6))
}
