use thiserror::Error;

/// Postgres SQLSTATE for "undefined column", raised when a write references a
/// column the deployed schema does not have.
const UNDEFINED_COLUMN_SQLSTATE: &str = "42703";

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// A statement referenced a column the deployed schema lacks. The story
    /// store reacts to this with a reduced-field fallback write.
    #[error("Undefined column: {message}")]
    UndefinedColumn {
        column: Option<String>,
        message: String,
    },

    /// Could not reach the database (connect, pool, or TLS failures)
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some(UNDEFINED_COLUMN_SQLSTATE) {
                    DbError::UndefinedColumn {
                        column: extract_undefined_column(db_err.message()),
                        message: db_err.message().to_string(),
                    }
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => DbError::Connection {
                message: err.to_string(),
            },
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Extract the offending column name from a Postgres "undefined column" message.
/// Messages typically look like: `column "genre" of relation "stories" does not exist`
fn extract_undefined_column(message: &str) -> Option<String> {
    let start = message.find('"')?;
    let rest = &message[start + 1..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
