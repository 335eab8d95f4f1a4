//! Mapping of database errors onto engine errors.

use domain::EngineError;

/// Partial unique index enforcing one active alert per owner.
pub const ONE_ACTIVE_ALERT_INDEX: &str = "idx_alerts_one_active_per_owner";

/// Converts a database error into an engine error.
///
/// Unique violations become `InvalidState`, foreign key violations become
/// `NotFound`; everything else is a `Storage` error.
pub fn storage_error(err: sqlx::Error) -> EngineError {
    if let sqlx::Error::Database(db_err) = &err {
        // PostgreSQL error code 23505 = unique_violation, 23503 = foreign_key_violation
        match db_err.code().as_deref() {
            Some("23505") if db_err.constraint() == Some(ONE_ACTIVE_ALERT_INDEX) => {
                return EngineError::InvalidState("Owner already has an active alert".to_string());
            }
            Some("23505") => {
                return EngineError::InvalidState("Resource already exists".to_string());
            }
            Some("23503") => {
                return EngineError::NotFound("Referenced user not found".to_string());
            }
            _ => {}
        }
    }

    tracing::error!(error = %err, "Database error");
    EngineError::Storage(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_is_storage_error() {
        assert!(matches!(
            storage_error(sqlx::Error::RowNotFound),
            EngineError::Storage(_)
        ));
    }

    #[test]
    fn test_pool_timeout_is_storage_error() {
        assert!(matches!(
            storage_error(sqlx::Error::PoolTimedOut),
            EngineError::Storage(_)
        ));
    }
}
