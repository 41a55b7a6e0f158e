//! The signed-in user.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role the user is acting in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Solves exercises.
    Student,
    /// Manages courses and grades.
    Teacher,
    /// Manages everything.
    Admin,
}

impl Role {
    /// Wire name of the role.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }

    /// Returns `true` for teachers and admins.
    pub const fn is_teacher_or_admin(self) -> bool {
        matches!(self, Self::Teacher | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role name that is not one of `student`, `teacher` or `admin`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role '{0}', expected student, teacher or admin")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Who is using the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Username.
    pub user_id: String,
    /// Active role.
    pub role: Role,
}

impl Session {
    /// Creates a session.
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}
