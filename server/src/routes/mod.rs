pub mod members;
pub mod projects;
pub mod tasks;

use platform_api::{ApiError, internal_error};
use platform_db::DbError;
use serde::{Deserialize, Deserializer};

pub(crate) fn db_error(err: DbError) -> ApiError {
    match err {
        DbError::AlreadyMember => ApiError::Conflict(err.to_string()),
        other => internal_error(other),
    }
}

/// Trimmed, non-empty text field.
pub(crate) fn required_text(field: &str, value: String) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ApiError::invalid(format!("{field} must not be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Absent field stays `None`; an explicit `null` becomes `Some(None)`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
