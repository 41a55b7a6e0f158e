//! Exercises: course exercise lists for teachers and students, and creating
//! new exercises.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::assessment::{student_progress, ExerciseStatus, GraderType, SubmissionStatus};
use super::{check_len, check_not_blank, check_opt_len, CreatedId};
use crate::caller::{parse_id, Caller, Role};
use crate::error::{CoreError, Result};

const MAX_TITLE_LEN: usize = 100;
const MAX_TEXT_LEN: usize = 300_000;
const MAX_IMAGE_LEN: usize = 2000;
const MAX_FILE_NAME_LEN: usize = 100;
const MAX_EXECUTOR_ID_LEN: usize = 100;

// ============================================================================
// DTOs
// ============================================================================

/// An exercise on a course with student counts per status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherExercise {
    /// Course exercise id.
    pub id: String,
    /// Title alias, or the exercise title.
    pub effective_title: String,
    /// Soft deadline.
    pub soft_deadline: Option<DateTime<Utc>>,
    /// Who grades the exercise.
    pub grader_type: GraderType,
    /// Position on the course.
    pub ordering_idx: i32,
    /// Students with no submission.
    pub unstarted_count: u32,
    /// Students whose latest submission has no grade.
    pub ungraded_count: u32,
    /// Students graded below the threshold.
    pub started_count: u32,
    /// Students graded at or above the threshold.
    pub completed_count: u32,
}

/// Exercises on a course, for teachers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherExercisesResp {
    /// Exercises ordered by position.
    pub exercises: Vec<TeacherExercise>,
}

/// A visible exercise with the caller's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentExercise {
    /// Course exercise id.
    pub id: String,
    /// Title alias, or the exercise title.
    pub effective_title: String,
    /// Soft deadline.
    pub deadline: Option<DateTime<Utc>>,
    /// Progress.
    pub status: ExerciseStatus,
    /// Grade of the latest submission.
    pub grade: Option<i32>,
    /// Who gave the grade.
    pub graded_by: Option<GraderType>,
    /// Position on the course.
    pub ordering_idx: i32,
}

/// Exercises on a course, for students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentExercisesResp {
    /// Exercises ordered by position.
    pub exercises: Vec<StudentExercise>,
}

/// A file the automatic assessment needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReq {
    /// Asset file name.
    pub file_name: String,
    /// Asset contents.
    pub file_content: String,
}

/// An executor to run the automatic assessment on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorReq {
    /// Executor id.
    pub executor_id: String,
}

/// Body of the create exercise request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateExerciseReq {
    /// Title.
    pub title: String,
    /// Exercise text as HTML.
    #[serde(default)]
    pub text_html: Option<String>,
    /// AsciiDoc source, stored as given.
    #[serde(default)]
    pub text_adoc: Option<String>,
    /// Whether the content is public.
    pub public: bool,
    /// Who grades.
    pub grader_type: GraderType,
    /// Script run by the executor.
    #[serde(default)]
    pub grading_script: Option<String>,
    /// Image the grading script runs in.
    #[serde(default)]
    pub container_image: Option<String>,
    /// Time limit for grading.
    #[serde(default)]
    pub max_time_sec: Option<i32>,
    /// Memory limit for grading.
    #[serde(default)]
    pub max_mem_mb: Option<i32>,
    /// Files available to the grading script.
    #[serde(default)]
    pub assets: Option<Vec<AssetReq>>,
    /// Executors allowed to grade.
    #[serde(default)]
    pub executors: Option<Vec<ExecutorReq>>,
}

// ============================================================================
// Course exercises
// ============================================================================

struct CourseExerciseRow {
    id: i64,
    title: String,
    grader_type: GraderType,
    threshold: i32,
    soft_deadline: Option<DateTime<Utc>>,
    order_idx: i32,
}

fn select_course_exercises(
    tx: &Transaction<'_>,
    course_id: i64,
    visible_only: bool,
) -> Result<Vec<CourseExerciseRow>> {
    let mut stmt = tx.prepare(
        "SELECT ce.id, COALESCE(ce.title_alias, ev.title), ev.grader_type, ce.grade_threshold,
                ce.soft_deadline, ce.order_idx
         FROM course_exercise ce
         JOIN exercise_ver ev ON ev.exercise_id = ce.exercise_id AND ev.valid_to IS NULL
         WHERE ce.course_id = ?1 AND (ce.student_visible = 1 OR ?2 = 0)
         ORDER BY ce.order_idx, ce.id",
    )?;
    let rows = stmt
        .query_map(params![course_id, visible_only], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i32>(3)?,
                r.get::<_, Option<DateTime<Utc>>>(4)?,
                r.get::<_, i32>(5)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(id, title, grader_type, threshold, soft_deadline, order_idx)| {
            Ok(CourseExerciseRow {
                id,
                title,
                grader_type: grader_type.parse()?,
                threshold,
                soft_deadline,
                order_idx,
            })
        })
        .collect()
}

fn select_course_students(tx: &Transaction<'_>, course_id: i64) -> Result<Vec<String>> {
    let mut stmt = tx.prepare("SELECT student_id FROM student_course_access WHERE course_id = ?1")?;
    let ids = stmt
        .query_map(params![course_id], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// All exercises on a course with how far its students are.
#[instrument(level = "debug", skip_all, fields(caller = %caller.id, course_id = %course_id))]
pub fn teacher_exercises(
    conn: &mut Connection,
    caller: &Caller,
    course_id: &str,
) -> Result<TeacherExercisesResp> {
    caller.require_role(&[Role::Teacher, Role::Admin])?;
    let course_id = parse_id("courseId", course_id)?;
    let tx = conn.transaction()?;
    caller.assert_teacher_or_admin_access(&tx, course_id)?;

    let students = select_course_students(&tx, course_id)?;
    let mut exercises = Vec::new();
    for row in select_course_exercises(&tx, course_id, false)? {
        let mut ex = TeacherExercise {
            id: row.id.to_string(),
            effective_title: row.title,
            soft_deadline: row.soft_deadline,
            grader_type: row.grader_type,
            ordering_idx: row.order_idx,
            unstarted_count: 0,
            ungraded_count: 0,
            started_count: 0,
            completed_count: 0,
        };
        for student in &students {
            let (status, _) = student_progress(&tx, row.id, student, row.threshold)?;
            match status {
                SubmissionStatus::Unstarted => ex.unstarted_count += 1,
                SubmissionStatus::Ungraded => ex.ungraded_count += 1,
                SubmissionStatus::Started => ex.started_count += 1,
                SubmissionStatus::Completed => ex.completed_count += 1,
            }
        }
        exercises.push(ex);
    }
    tx.commit()?;

    debug!(count = exercises.len(), "Read teacher exercises");
    Ok(TeacherExercisesResp { exercises })
}

/// Visible exercises on a course with the calling student's progress.
#[instrument(level = "debug", skip_all, fields(caller = %caller.id, course_id = %course_id))]
pub fn student_exercises(
    conn: &mut Connection,
    caller: &Caller,
    course_id: &str,
) -> Result<StudentExercisesResp> {
    caller.require_role(&[Role::Student])?;
    let course_id = parse_id("courseId", course_id)?;
    let tx = conn.transaction()?;
    caller.assert_student_access(&tx, course_id)?;

    let exercises = select_course_exercises(&tx, course_id, true)?
        .into_iter()
        .map(|row| {
            let (status, grade) = student_progress(&tx, row.id, &caller.id, row.threshold)?;
            Ok(StudentExercise {
                id: row.id.to_string(),
                effective_title: row.title,
                deadline: row.soft_deadline,
                status: status.into(),
                grade: grade.as_ref().map(|g| g.grade),
                graded_by: grade.map(|g| g.grader_type),
                ordering_idx: row.order_idx,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    tx.commit()?;

    debug!(count = exercises.len(), "Read student exercises");
    Ok(StudentExercisesResp { exercises })
}

// ============================================================================
// Creating exercises
// ============================================================================

impl CreateExerciseReq {
    fn validate(&self) -> Result<Vec<i64>> {
        check_not_blank("title", &self.title, MAX_TITLE_LEN)?;
        check_opt_len("text_html", self.text_html.as_deref(), MAX_TEXT_LEN)?;
        check_opt_len("text_adoc", self.text_adoc.as_deref(), MAX_TEXT_LEN)?;
        check_opt_len("container_image", self.container_image.as_deref(), MAX_IMAGE_LEN)?;
        for asset in self.assets.iter().flatten() {
            check_len("file_name", &asset.file_name, 0, MAX_FILE_NAME_LEN)?;
            check_len("file_content", &asset.file_content, 0, MAX_TEXT_LEN)?;
        }
        self.executors
            .iter()
            .flatten()
            .map(|executor| {
                check_len("executor_id", &executor.executor_id, 0, MAX_EXECUTOR_ID_LEN)?;
                parse_id("executor_id", &executor.executor_id)
            })
            .collect()
    }
}

fn insert_auto_exercise(tx: &Transaction<'_>, req: &CreateExerciseReq, executor_ids: &[i64]) -> Result<i64> {
    tx.execute(
        "INSERT INTO auto_exercise (grading_script, container_image, max_time_sec, max_mem_mb)
         VALUES (?1, ?2, ?3, ?4)",
        params![req.grading_script, req.container_image, req.max_time_sec, req.max_mem_mb],
    )?;
    let auto_exercise_id = tx.last_insert_rowid();

    for asset in req.assets.iter().flatten() {
        tx.execute(
            "INSERT INTO asset (auto_exercise_id, file_name, file_content) VALUES (?1, ?2, ?3)",
            params![auto_exercise_id, asset.file_name, asset.file_content],
        )?;
    }
    for executor_id in executor_ids {
        let exists = tx
            .query_row("SELECT 1 FROM executor WHERE id = ?1", params![executor_id], |_| Ok(()))
            .optional()?;
        if exists.is_none() {
            return Err(CoreError::invalid_parameter("executor_id", executor_id.to_string()));
        }
        tx.execute(
            "INSERT OR IGNORE INTO auto_exercise_executor (auto_exercise_id, executor_id) VALUES (?1, ?2)",
            params![auto_exercise_id, executor_id],
        )?;
    }
    Ok(auto_exercise_id)
}

/// Creates an exercise with its first version.
///
/// Automatically graded exercises also get their assessment setup: script,
/// container image, limits, assets and executors.
#[instrument(level = "debug", skip_all, fields(caller = %caller.id))]
pub fn create_exercise(conn: &mut Connection, caller: &Caller, req: &CreateExerciseReq) -> Result<CreatedId> {
    caller.require_role(&[Role::Teacher, Role::Admin])?;
    debug!(title = %req.title, "Creating exercise");
    let executor_ids = req.validate()?;

    let now = Utc::now();
    let tx = conn.transaction()?;
    let auto_exercise_id = match req.grader_type {
        GraderType::Auto => Some(insert_auto_exercise(&tx, req, &executor_ids)?),
        GraderType::Teacher => None,
    };

    tx.execute(
        "INSERT INTO exercise (owner_id, public, created_at) VALUES (?1, ?2, ?3)",
        params![caller.id, req.public, now],
    )?;
    let exercise_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO exercise_ver (exercise_id, author_id, valid_from, grader_type, title, text_html, text_adoc, auto_exercise_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            exercise_id,
            caller.id,
            now,
            req.grader_type.as_str(),
            req.title,
            req.text_html,
            req.text_adoc,
            auto_exercise_id
        ],
    )?;
    tx.commit()?;

    info!(exercise_id, grader_type = %req.grader_type, "Created exercise");
    Ok(CreatedId {
        id: exercise_id.to_string(),
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

    fn new_exercise(grader_type: GraderType) -> CreateExerciseReq {
        CreateExerciseReq {
            title: "Recursion".into(),
            text_html: Some("<p>Recurse</p>".into()),
            text_adoc: None,
            public: true,
            grader_type,
            grading_script: Some("grade.py".into()),
            container_image: Some("lahendus/python:latest".into()),
            max_time_sec: Some(5),
            max_mem_mb: Some(64),
            assets: Some(vec![AssetReq {
                file_name: "tests.py".into(),
                file_content: "assert f(1) == 1".into(),
            }]),
            executors: Some(vec![ExecutorReq {
                executor_id: "1".into(),
            }]),
        }
    }

    #[test]
    fn test_teacher_exercises_counts() {
        let mut conn = demo();
        let resp = teacher_exercises(&mut conn, &Caller::new("ago", Role::Teacher), "1").unwrap();

        let ex = &resp.exercises;
        assert_eq!(ex.len(), 3);
        assert_eq!(ex[0].effective_title, "Hello");
        assert_eq!(
            (ex[0].completed_count, ex[0].started_count, ex[0].ungraded_count, ex[0].unstarted_count),
            (2, 1, 0, 0)
        );
        assert_eq!(ex[1].effective_title, "Loops and lists");
        assert_eq!(ex[1].grader_type, GraderType::Teacher);
        assert_eq!((ex[1].ungraded_count, ex[1].unstarted_count), (1, 2));
        assert_eq!(ex[2].unstarted_count, 3);
    }

    #[test]
    fn test_student_exercises_only_visible() {
        let mut conn = demo();
        let resp = student_exercises(&mut conn, &Caller::new("mari", Role::Student), "1").unwrap();

        let ex = &resp.exercises;
        assert_eq!(ex.len(), 2);
        assert_eq!(ex[0].status, ExerciseStatus::Completed);
        assert_eq!(ex[0].grade, Some(100));
        assert_eq!(ex[0].graded_by, Some(GraderType::Auto));
        assert!(ex[0].deadline.is_some());
        assert_eq!(ex[1].status, ExerciseStatus::Started);
        assert_eq!(ex[1].grade, None);
        assert_eq!(ex[1].graded_by, None);
    }

    #[test]
    fn test_exercise_lists_check_roles() {
        let mut conn = demo();
        let err = student_exercises(&mut conn, &Caller::new("ago", Role::Teacher), "1").unwrap_err();
        assert_eq!(err.code(), Some(ReqError::RoleNotAllowed));

        let err = teacher_exercises(&mut conn, &Caller::new("ago", Role::Teacher), "2").unwrap_err();
        assert_eq!(err.code(), Some(ReqError::NoCourseAccess));
    }

    #[test]
    fn test_create_auto_exercise() {
        let mut conn = demo();
        let created = create_exercise(
            &mut conn,
            &Caller::new("ago", Role::Teacher),
            &new_exercise(GraderType::Auto),
        )
        .unwrap();

        let (title, auto_id): (String, Option<i64>) = conn
            .query_row(
                "SELECT title, auto_exercise_id FROM exercise_ver WHERE exercise_id = ?1",
                params![created.id.parse::<i64>().unwrap()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(title, "Recursion");
        let executors: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM auto_exercise_executor WHERE auto_exercise_id = ?1",
                params![auto_id.unwrap()],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(executors, 1);
    }

    #[test]
    fn test_create_teacher_graded_exercise_has_no_auto_setup() {
        let mut conn = demo();
        let created = create_exercise(
            &mut conn,
            &Caller::new("admin", Role::Admin),
            &new_exercise(GraderType::Teacher),
        )
        .unwrap();

        let auto_id: Option<i64> = conn
            .query_row(
                "SELECT auto_exercise_id FROM exercise_ver WHERE exercise_id = ?1",
                params![created.id.parse::<i64>().unwrap()],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(auto_id, None);
    }

    #[test]
    fn test_create_exercise_validation() {
        let mut conn = demo();
        let teacher = Caller::new("ago", Role::Teacher);

        let mut req = new_exercise(GraderType::Auto);
        req.title = "x".repeat(101);
        assert!(create_exercise(&mut conn, &teacher, &req).is_err());

        let mut req = new_exercise(GraderType::Auto);
        req.executors = Some(vec![ExecutorReq {
            executor_id: "one".into(),
        }]);
        let err = create_exercise(&mut conn, &teacher, &req).unwrap_err();
        assert_eq!(err.code(), Some(ReqError::InvalidParameterValue));

        let mut req = new_exercise(GraderType::Auto);
        req.executors = Some(vec![ExecutorReq {
            executor_id: "42".into(),
        }]);
        assert!(create_exercise(&mut conn, &teacher, &req).is_err());
        let exercises: i64 = conn
            .query_row("SELECT COUNT(*) FROM exercise", [], |r| r.get(0))
            .unwrap();
        assert_eq!(exercises, 3);

        let err = create_exercise(
            &mut conn,
            &Caller::new("mari", Role::Student),
            &new_exercise(GraderType::Teacher),
        )
        .unwrap_err();
        assert_eq!(err.code(), Some(ReqError::RoleNotAllowed));
    }
}
