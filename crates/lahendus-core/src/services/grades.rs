//! Grade table of a course.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::assessment::{latest_grade, latest_submission, GraderType};
use crate::caller::{parse_id, Caller, Role};
use crate::error::Result;

/// A student in the grade table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradesStudent {
    /// Username of the student.
    pub student_id: String,
    /// Given name.
    pub given_name: String,
    /// Family name.
    pub family_name: String,
    /// Email address.
    pub email: String,
}

/// The grade that counts for a student's latest submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentGrade {
    /// Username of the student.
    pub student_id: String,
    /// Grade, 0 to 100.
    pub grade: i32,
    /// Who grades.
    pub grader_type: GraderType,
    /// Teacher feedback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// An exercise column in the grade table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradesExercise {
    /// Course exercise id.
    pub exercise_id: String,
    /// Title alias, or the exercise title.
    pub effective_title: String,
    /// Grade needed to complete the exercise.
    pub grade_threshold: i32,
    /// Whether students see the exercise.
    pub student_visible: bool,
    /// Grades of the listed students that have one.
    pub grades: Vec<StudentGrade>,
}

/// The grade table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradesResp {
    /// Students matching the search, before paging.
    pub student_count: usize,
    /// Active students.
    pub students: Vec<GradesStudent>,
    /// Exercises ordered by position.
    pub exercises: Vec<GradesExercise>,
}

/// Paging and search over the students of the grade table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GradesQuery {
    /// Students to skip.
    #[serde(default)]
    pub offset: Option<usize>,
    /// Maximum number of students.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Case-insensitive text to look for in names, usernames and emails.
    #[serde(default)]
    pub search: Option<String>,
}

impl GradesStudent {
    fn matches(&self, needle: &str) -> bool {
        [&self.student_id, &self.given_name, &self.family_name, &self.email]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Latest grades of every student on every exercise of a course.
///
/// Teacher grades take precedence over automatic ones.
#[instrument(level = "debug", skip_all, fields(caller = %caller.id, course_id = %course_id))]
pub fn teacher_grades(
    conn: &mut Connection,
    caller: &Caller,
    course_id: &str,
    query: &GradesQuery,
) -> Result<GradesResp> {
    caller.require_role(&[Role::Teacher, Role::Admin])?;
    let course_id = parse_id("courseId", course_id)?;
    let tx = conn.transaction()?;
    caller.assert_teacher_or_admin_access(&tx, course_id)?;

    let mut students = {
        let mut stmt = tx.prepare(
            "SELECT s.id, s.given_name, s.family_name, s.email
             FROM student s JOIN student_course_access a ON a.student_id = s.id
             WHERE a.course_id = ?1
             ORDER BY s.family_name, s.given_name, s.id",
        )?;
        let rows = stmt
            .query_map(params![course_id], |r| {
                Ok(GradesStudent {
                    student_id: r.get(0)?,
                    given_name: r.get(1)?,
                    family_name: r.get(2)?,
                    email: r.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };
    if let Some(needle) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let needle = needle.to_lowercase();
        students.retain(|s| s.matches(&needle));
    }
    let student_count = students.len();
    let students: Vec<GradesStudent> = students
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    let columns = {
        let mut stmt = tx.prepare(
            "SELECT ce.id, COALESCE(ce.title_alias, ev.title), ce.grade_threshold, ce.student_visible
             FROM course_exercise ce
             JOIN exercise_ver ev ON ev.exercise_id = ce.exercise_id AND ev.valid_to IS NULL
             WHERE ce.course_id = ?1
             ORDER BY ce.order_idx, ce.id",
        )?;
        let rows = stmt
            .query_map(params![course_id], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i32>(2)?,
                    r.get::<_, bool>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let mut exercises = Vec::with_capacity(columns.len());
    for (id, title, threshold, visible) in columns {
        let mut grades = Vec::new();
        for student in &students {
            let Some(submission) = latest_submission(&tx, id, &student.student_id)? else {
                continue;
            };
            if let Some(grade) = latest_grade(&tx, submission)? {
                grades.push(StudentGrade {
                    student_id: student.student_id.clone(),
                    grade: grade.grade,
                    grader_type: grade.grader_type,
                    feedback: grade.feedback,
                });
            }
        }
        exercises.push(GradesExercise {
            exercise_id: id.to_string(),
            effective_title: title,
            grade_threshold: threshold,
            student_visible: visible,
            grades,
        });
    }
    tx.commit()?;

    debug!(student_count, exercises = exercises.len(), "Read grades");
    Ok(GradesResp {
        student_count,
        students,
        exercises,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::ReqError;

    fn demo() -> Connection {
        let mut conn = db::open_in_memory().unwrap();
        db::seed_demo_data(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_grades_prefer_teacher_assessment() {
        let mut conn = demo();
        let resp = teacher_grades(
            &mut conn,
            &Caller::new("ago", Role::Teacher),
            "1",
            &GradesQuery::default(),
        )
        .unwrap();

        assert_eq!(resp.student_count, 3);
        assert_eq!(resp.exercises.len(), 3);

        let hello = &resp.exercises[0];
        assert_eq!(hello.grades.len(), 3);
        let jaan = hello.grades.iter().find(|g| g.student_id == "jaan").unwrap();
        assert_eq!(jaan.grade, 95);
        assert_eq!(jaan.grader_type, GraderType::Teacher);

        // Submitted but ungraded, so no grade
        assert!(resp.exercises[1].grades.is_empty());
        assert!(!resp.exercises[2].student_visible);
    }

    #[test]
    fn test_grades_search_and_paging() {
        let mut conn = demo();
        let teacher = Caller::new("ago", Role::Teacher);

        let query = GradesQuery {
            search: Some("MARI".into()),
            ..GradesQuery::default()
        };
        let resp = teacher_grades(&mut conn, &teacher, "1", &query).unwrap();
        assert_eq!(resp.student_count, 1);
        assert_eq!(resp.students[0].student_id, "mari");
        assert_eq!(resp.exercises[0].grades.len(), 1);

        let query = GradesQuery {
            offset: Some(1),
            limit: Some(1),
            search: None,
        };
        let resp = teacher_grades(&mut conn, &teacher, "1", &query).unwrap();
        assert_eq!(resp.student_count, 3);
        assert_eq!(resp.students.len(), 1);
        assert_eq!(resp.students[0].family_name, "Kask");
    }

    #[test]
    fn test_grades_require_teacher_access() {
        let mut conn = demo();
        let err = teacher_grades(
            &mut conn,
            &Caller::new("ago", Role::Teacher),
            "2",
            &GradesQuery::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), Some(ReqError::NoCourseAccess));
    }
}
