//! Caller identification and course access checks.
//!
//! Authentication happens in front of this service. The proxy passes the
//! username and the active role in trusted headers, which [`Caller`]
//! extracts.

use std::fmt;
use std::str::FromStr;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use rusqlite::{params, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, ReqError, Result};

/// Header carrying the username.
pub const USER_HEADER: &str = "x-lahendus-user";

/// Header carrying the active role.
pub const ROLE_HEADER: &str = "x-lahendus-role";

/// Role a caller acts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Solves exercises.
    Student,
    /// Runs courses.
    Teacher,
    /// Sees everything.
    Admin,
}

impl Role {
    /// Lowercase name, as used in headers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            other => Err(CoreError::unauthorized(format!("unknown role '{other}'"))),
        }
    }
}

/// The identified caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Username.
    pub id: String,
    /// Active role.
    pub role: Role,
}

impl Caller {
    /// Creates a caller.
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// Fails with `ROLE_NOT_ALLOWED` unless the caller acts in one of `roles`.
    pub fn require_role(&self, roles: &[Role]) -> Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(CoreError::forbidden(
                format!("Role {} is not allowed here", self.role),
                Some(ReqError::RoleNotAllowed),
            ))
        }
    }

    /// Fails unless the caller is a teacher on the course or an admin.
    pub fn assert_teacher_or_admin_access(&self, tx: &Transaction<'_>, course_id: i64) -> Result<()> {
        match self.role {
            Role::Admin => assert_course_exists(tx, course_id),
            Role::Teacher if teacher_has_access(tx, &self.id, course_id)? => Ok(()),
            Role::Teacher => Err(CoreError::no_course_access(&self.id, course_id)),
            Role::Student => Err(CoreError::forbidden(
                "Students may not do this",
                Some(ReqError::RoleNotAllowed),
            )),
        }
    }

    /// Fails unless the caller is a student on the course.
    pub fn assert_student_access(&self, tx: &Transaction<'_>, course_id: i64) -> Result<()> {
        self.require_role(&[Role::Student])?;
        if student_has_access(tx, &self.id, course_id)? {
            Ok(())
        } else {
            Err(CoreError::no_course_access(&self.id, course_id))
        }
    }

    /// Fails unless the caller has any kind of access to the course.
    pub fn assert_any_access(&self, tx: &Transaction<'_>, course_id: i64) -> Result<()> {
        match self.role {
            Role::Student => self.assert_student_access(tx, course_id),
            Role::Teacher | Role::Admin => self.assert_teacher_or_admin_access(tx, course_id),
        }
    }
}

fn teacher_has_access(tx: &Transaction<'_>, teacher_id: &str, course_id: i64) -> Result<bool> {
    let found = tx
        .query_row(
            "SELECT 1 FROM teacher_course_access WHERE teacher_id = ?1 AND course_id = ?2",
            params![teacher_id, course_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn student_has_access(tx: &Transaction<'_>, student_id: &str, course_id: i64) -> Result<bool> {
    let found = tx
        .query_row(
            "SELECT 1 FROM student_course_access WHERE student_id = ?1 AND course_id = ?2",
            params![student_id, course_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn assert_course_exists(tx: &Transaction<'_>, course_id: i64) -> Result<()> {
    let found = tx
        .query_row("SELECT 1 FROM course WHERE id = ?1", params![course_id], |_| Ok(()))
        .optional()?;
    found.ok_or_else(|| CoreError::not_found(format!("Course {course_id} does not exist")))
}

/// Parses a numeric id from a path or body.
pub fn parse_id(name: &str, value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|_| CoreError::invalid_parameter(name, value))
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| CoreError::unauthorized(format!("missing header {name}")))?;
    let value = value
        .to_str()
        .map_err(|_| CoreError::unauthorized(format!("header {name} is not text")))?
        .trim();
    if value.is_empty() {
        return Err(CoreError::unauthorized(format!("header {name} is empty")));
    }
    Ok(value)
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let id = header(parts, USER_HEADER)?;
        let role = header(parts, ROLE_HEADER)?.parse()?;
        debug!(caller = id, %role, "Identified caller");
        Ok(Self::new(id, role))
    }
}
