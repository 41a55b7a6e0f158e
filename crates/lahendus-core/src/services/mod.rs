//! Request services.
//!
//! Each service function takes the connection, checks the caller's access,
//! does its work in one transaction and returns a DTO. They are synchronous;
//! the HTTP handlers call them while holding the database lock.

pub mod articles;
pub mod assessment;
pub mod courses;
pub mod executors;
pub mod exercises;
pub mod grades;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ReqError, Result};

/// Id of a created entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedId {
    /// The new id.
    pub id: String,
}

/// Checks that `value` has between `min` and `max` characters.
pub(crate) fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if (min..=max).contains(&len) {
        return Ok(());
    }
    Err(CoreError::InvalidRequest {
        message: format!("Field '{field}' must have {min}..={max} characters, got {len}"),
        code: Some(ReqError::InvalidParameterValue),
        attrs: vec![("field".to_string(), field.to_string())],
    })
}

/// Like [`check_len`], for optional fields.
pub(crate) fn check_opt_len(field: &str, value: Option<&str>, max: usize) -> Result<()> {
    value.map_or(Ok(()), |v| check_len(field, v, 0, max))
}

/// Checks a required text that must not be blank.
pub(crate) fn check_not_blank(field: &str, value: &str, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidRequest {
            message: format!("Field '{field}' must not be blank"),
            code: Some(ReqError::InvalidParameterValue),
            attrs: vec![("field".to_string(), field.to_string())],
        });
    }
    check_len(field, value, 1, max)
}
