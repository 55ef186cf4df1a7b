mod result_set;
mod row;

pub use result_set::ResultSet;
pub use row::Row;

use crate::error::DbSqlError;
use crate::hooks::OperationMetadata;

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecResult {
    metadata: OperationMetadata,
}

impl ExecResult {
    pub(crate) fn new(metadata: OperationMetadata) -> Self {
        Self { metadata }
    }

    /// Rows changed by the statement, as reported by the service.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn rows_affected(&self) -> i64 {
        self.metadata.rows_affected() as i64
    }

    #[must_use]
    pub fn operation_id(&self) -> &str {
        self.metadata.operation_id()
    }

    /// The service does not report generated keys.
    ///
    /// # Errors
    /// Always returns `DbSqlError::Unsupported`.
    pub fn last_insert_id(&self) -> Result<i64, DbSqlError> {
        Err(DbSqlError::Unsupported(
            "last insert id is not supported".to_string(),
        ))
    }
}
