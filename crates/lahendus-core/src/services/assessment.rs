//! Latest submissions, their grades and the status derived from them.

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Who grades an exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GraderType {
    /// Graded by automatic assessment.
    Auto,
    /// Graded by a teacher.
    Teacher,
}

impl GraderType {
    /// Name as stored and sent.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Teacher => "TEACHER",
        }
    }
}

impl fmt::Display for GraderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraderType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AUTO" => Ok(Self::Auto),
            "TEACHER" => Ok(Self::Teacher),
            other => Err(CoreError::invalid_parameter("grader_type", other)),
        }
    }
}

/// Progress of one student on one course exercise, as a teacher counts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    /// Nothing submitted.
    Unstarted,
    /// Submitted but not graded yet.
    Ungraded,
    /// Graded below the threshold.
    Started,
    /// Graded at or above the threshold.
    Completed,
}

/// Progress of the caller on an exercise, as a student sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExerciseStatus {
    /// Nothing submitted.
    Unstarted,
    /// Submitted, below the threshold or not graded yet.
    Started,
    /// Graded at or above the threshold.
    Completed,
}

impl From<SubmissionStatus> for ExerciseStatus {
    fn from(status: SubmissionStatus) -> Self {
        match status {
            SubmissionStatus::Unstarted => Self::Unstarted,
            SubmissionStatus::Ungraded | SubmissionStatus::Started => Self::Started,
            SubmissionStatus::Completed => Self::Completed,
        }
    }
}

/// The grade that counts for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    /// Points out of 100.
    pub grade: i32,
    /// Whether a teacher or the automatic assessment gave it.
    pub grader_type: GraderType,
    /// Feedback given with the grade.
    pub feedback: Option<String>,
}

/// Status derived from the latest submission's grade.
pub const fn derive_status(submitted: bool, grade: Option<i32>, threshold: i32) -> SubmissionStatus {
    match (submitted, grade) {
        (false, _) => SubmissionStatus::Unstarted,
        (true, None) => SubmissionStatus::Ungraded,
        (true, Some(g)) if g >= threshold => SubmissionStatus::Completed,
        (true, Some(_)) => SubmissionStatus::Started,
    }
}

/// Id of the student's latest submission to a course exercise.
pub fn latest_submission(
    tx: &Transaction<'_>,
    course_exercise_id: i64,
    student_id: &str,
) -> Result<Option<i64>> {
    let id = tx
        .query_row(
            "SELECT id FROM submission WHERE course_exercise_id = ?1 AND student_id = ?2
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![course_exercise_id, student_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

/// The latest teacher grade of a submission, else its latest automatic grade.
pub fn latest_grade(tx: &Transaction<'_>, submission_id: i64) -> Result<Option<Grade>> {
    let teacher = tx
        .query_row(
            "SELECT grade, feedback FROM teacher_assessment WHERE submission_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![submission_id],
            |r| {
                Ok(Grade {
                    grade: r.get(0)?,
                    grader_type: GraderType::Teacher,
                    feedback: r.get(1)?,
                })
            },
        )
        .optional()?;
    if teacher.is_some() {
        return Ok(teacher);
    }

    let auto = tx
        .query_row(
            "SELECT grade, feedback FROM automatic_assessment WHERE submission_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT 1",
            params![submission_id],
            |r| {
                Ok(Grade {
                    grade: r.get(0)?,
                    grader_type: GraderType::Auto,
                    feedback: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(auto)
}

/// Status and grade of a student on a course exercise.
pub fn student_progress(
    tx: &Transaction<'_>,
    course_exercise_id: i64,
    student_id: &str,
    threshold: i32,
) -> Result<(SubmissionStatus, Option<Grade>)> {
    let Some(submission) = latest_submission(tx, course_exercise_id, student_id)? else {
        return Ok((SubmissionStatus::Unstarted, None));
    };
    let grade = latest_grade(tx, submission)?;
    let status = derive_status(true, grade.as_ref().map(|g| g.grade), threshold);
    Ok((status, grade))
}
