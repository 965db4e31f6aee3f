use sqlx::error::ErrorKind;

use crate::application::repos::RepoError;

/// SQLSTATE for a statement cancelled by `statement_timeout` or a client request.
const QUERY_CANCELED: &str = "57014";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation => RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            ErrorKind::ForeignKeyViolation | ErrorKind::NotNullViolation => {
                RepoError::InvalidInput {
                    message: db.message().to_string(),
                }
            }
            ErrorKind::CheckViolation => RepoError::Integrity {
                message: db.message().to_string(),
            },
            _ if db.code().as_deref() == Some(QUERY_CANCELED) => RepoError::Timeout,
            _ => RepoError::from_persistence(db.message()),
        },
        other => RepoError::from_persistence(other),
    }
}

/// Offsets are unsigned in the domain and `BIGINT` in storage.
pub(crate) fn offset_to_db(offset: u64) -> Result<i64, RepoError> {
    i64::try_from(offset).map_err(|_| RepoError::InvalidInput {
        message: format!("offset {offset} exceeds the supported range"),
    })
}

pub(crate) fn offset_from_db(offset: i64) -> Result<u64, RepoError> {
    u64::try_from(offset).map_err(|_| RepoError::Integrity {
        message: format!("stored offset {offset} is negative"),
    })
}
