use sqlx::error::ErrorKind;

use crate::application::repos::RepoError;

/// `invalid_text_representation`, raised when a malformed uuid reaches a cast.
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
/// `query_canceled`, raised by `statement_timeout`.
const QUERY_CANCELED: &str = "57014";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation => RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            ErrorKind::CheckViolation => RepoError::InvalidInput {
                message: db.message().to_string(),
            },
            _ => {
                let code = db.code().map(|code| code.into_owned());
                match code.as_deref() {
                    Some(INVALID_TEXT_REPRESENTATION) => RepoError::InvalidInput {
                        message: db.message().to_string(),
                    },
                    Some(QUERY_CANCELED) => RepoError::Timeout,
                    _ => RepoError::from_persistence(sqlx::Error::Database(db)),
                }
            }
        },
        other => RepoError::from_persistence(other),
    }
}
