use jiwani_core::CoreError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

/// Maps a driver error onto the domain taxonomy. Constraint violations become
/// client errors; anything else is logged and surfaced as internal.
pub(crate) fn db_error(e: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return CoreError::conflict(constraint_message(db.as_ref(), "duplicate value")),
            Some(FOREIGN_KEY_VIOLATION) => return CoreError::conflict(constraint_message(db.as_ref(), "row is still referenced")),
            Some(CHECK_VIOLATION) => return CoreError::validation(constraint_message(db.as_ref(), "value out of range")),
            _ => {}
        }
    }
    tracing::error!("Database error: {}", e);
    CoreError::InternalError(e.to_string())
}

pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION))
}

fn constraint_message(db: &dyn sqlx::error::DatabaseError, fallback: &str) -> String {
    match db.constraint() {
        Some(name) => format!("{} ({})", fallback, name),
        None => fallback.to_string(),
    }
}
