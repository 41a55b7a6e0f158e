//! Courses and their participants.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::check_not_blank;
use crate::caller::{parse_id, Caller, Role};
use crate::error::{CoreError, Result};

// ============================================================================
// DTOs
// ============================================================================

/// Basic course info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicCourseInfo {
    /// Course title.
    pub title: String,
}

/// A group on a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group id.
    pub id: String,
    /// Group name.
    pub name: String,
}

/// A student with access to a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentResp {
    /// Username.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Given name.
    pub given_name: String,
    /// Family name.
    pub family_name: String,
    /// Groups on this course.
    pub groups: Vec<Group>,
    /// Moodle username, if linked.
    pub moodle_username: Option<String>,
}

/// A teacher with access to a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherResp {
    /// Username.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Given name.
    pub given_name: String,
    /// Family name.
    pub family_name: String,
    /// Groups the teacher is restricted to.
    pub groups: Vec<Group>,
}

/// Access waiting for a student with this email to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStudentResp {
    /// Email the access is for.
    pub email: String,
    /// When the access was created or last renewed.
    pub valid_from: DateTime<Utc>,
    /// Groups the student will be put in.
    pub groups: Vec<Group>,
}

/// Access waiting for a Moodle user to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMoodleStudentResp {
    /// Moodle (university) username.
    pub ut_username: String,
    /// Email in Moodle.
    pub email: String,
    /// Groups the student will be put in.
    pub groups: Vec<Group>,
}

/// Everyone on a course.
///
/// Lists not asked for with the `role` filter are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantsResp {
    /// Moodle course the course is linked to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moodle_short_name: Option<String>,
    /// Whether students are synced from Moodle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moodle_students_synced: Option<bool>,
    /// Whether grades are synced to Moodle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moodle_grades_synced: Option<bool>,
    /// Active students.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub students: Option<Vec<StudentResp>>,
    /// Teachers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teachers: Option<Vec<TeacherResp>>,
    /// Invitations by email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub students_pending: Option<Vec<PendingStudentResp>>,
    /// Moodle students who have not registered yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub students_moodle_pending: Option<Vec<PendingMoodleStudentResp>>,
}

/// Which participants to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParticipantsFilter {
    /// Students, pending and Moodle-pending accesses.
    Student,
    /// Teachers only.
    Teacher,
    /// Everyone.
    #[default]
    All,
}

impl ParticipantsFilter {
    /// Parses the `role` query parameter. Absent means everyone.
    pub fn from_query(role: Option<&str>) -> Result<Self> {
        role.map_or(Ok(Self::All), str::parse)
    }

    const fn students(self) -> bool {
        matches!(self, Self::Student | Self::All)
    }

    const fn teachers(self) -> bool {
        matches!(self, Self::Teacher | Self::All)
    }
}

impl FromStr for ParticipantsFilter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "all" => Ok(Self::All),
            other => Err(CoreError::invalid_parameter("role", other)),
        }
    }
}

/// Reference to a group by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    /// Group id.
    pub id: String,
}

/// A student to add, by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    /// Email of a registered or future student.
    pub email: String,
    /// Groups to put the student in.
    #[serde(default)]
    pub groups: Vec<GroupRef>,
}

/// Body of the add students request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStudentsReq {
    /// Students to add.
    pub students: Vec<NewStudent>,
}

/// Outcome of adding students.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStudentsResp {
    /// Registered students given access.
    pub accesses_added: u32,
    /// Pending accesses created or renewed.
    pub pending_accesses_added_updated: u32,
}

/// An active student to remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStudentRef {
    /// Username.
    pub id: String,
}

/// A pending access to remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStudentRef {
    /// Email of the pending access.
    pub email: String,
}

/// A Moodle-pending access to remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodlePendingStudentRef {
    /// Moodle username of the pending access.
    pub ut_username: String,
}

/// Body of the remove students request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveStudentsReq {
    /// Students with access.
    #[serde(default)]
    pub active_students: Vec<ActiveStudentRef>,
    /// Pending accesses.
    #[serde(default)]
    pub pending_students: Vec<PendingStudentRef>,
    /// Moodle-pending accesses.
    #[serde(default)]
    pub moodle_pending_students: Vec<MoodlePendingStudentRef>,
}

/// Body of the set student groups request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStudentGroupsReq {
    /// Students with access.
    #[serde(default)]
    pub active_students: Vec<ActiveStudentRef>,
    /// Pending accesses.
    #[serde(default)]
    pub pending_students: Vec<PendingStudentRef>,
    /// The groups the students end up in. Empty removes them from all groups.
    #[serde(default)]
    pub groups: Vec<GroupRef>,
}

// ============================================================================
// Services
// ============================================================================

/// Title of a course the caller has access to.
#[instrument(level = "debug", skip_all, fields(caller = %caller.id, course_id = %course_id))]
pub fn basic_info(conn: &mut Connection, caller: &Caller, course_id: &str) -> Result<BasicCourseInfo> {
    let course_id = parse_id("courseId", course_id)?;
    let tx = conn.transaction()?;
    caller.assert_any_access(&tx, course_id)?;

    let title = tx
        .query_row(
            "SELECT title FROM course WHERE id = ?1",
            params![course_id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| CoreError::not_found(format!("Course {course_id} does not exist")))?;
    tx.commit()?;
    Ok(BasicCourseInfo { title })
}

/// Students, teachers and pending accesses of a course.
#[instrument(level = "debug", skip_all, fields(caller = %caller.id, course_id = %course_id))]
pub fn participants(
    conn: &mut Connection,
    caller: &Caller,
    course_id: &str,
    filter: ParticipantsFilter,
) -> Result<ParticipantsResp> {
    caller.require_role(&[Role::Teacher, Role::Admin])?;
    let course_id = parse_id("courseId", course_id)?;
    let tx = conn.transaction()?;
    caller.assert_teacher_or_admin_access(&tx, course_id)?;

    let mut resp = select_moodle_info(&tx, course_id)?;
    if filter.students() {
        resp.students = Some(select_students(&tx, course_id)?);
        resp.students_pending = Some(select_pending(&tx, course_id)?);
        resp.students_moodle_pending = Some(select_moodle_pending(&tx, course_id)?);
    }
    if filter.teachers() {
        resp.teachers = Some(select_teachers(&tx, course_id)?);
    }
    tx.commit()?;

    debug!(?filter, "Read participants");
    Ok(resp)
}

fn select_moodle_info(tx: &Transaction<'_>, course_id: i64) -> Result<ParticipantsResp> {
    let (short_name, students_synced, grades_synced): (Option<String>, bool, bool) = tx.query_row(
        "SELECT moodle_short_name, moodle_sync_students, moodle_sync_grades FROM course WHERE id = ?1",
        params![course_id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    Ok(match short_name {
        Some(name) => ParticipantsResp {
            moodle_short_name: Some(name),
            moodle_students_synced: Some(students_synced),
            moodle_grades_synced: Some(grades_synced),
            ..ParticipantsResp::default()
        },
        None => ParticipantsResp::default(),
    })
}

fn select_groups(tx: &Transaction<'_>, sql: &str, key: &dyn rusqlite::ToSql, course_id: i64) -> Result<Vec<Group>> {
    let mut stmt = tx.prepare_cached(sql)?;
    let groups = stmt
        .query_map(params![key, course_id], |r| {
            Ok(Group {
                id: r.get::<_, i64>(0)?.to_string(),
                name: r.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(groups)
}

fn select_students(tx: &Transaction<'_>, course_id: i64) -> Result<Vec<StudentResp>> {
    let mut stmt = tx.prepare(
        "SELECT s.id, s.email, s.given_name, s.family_name, s.moodle_username
         FROM student s JOIN student_course_access a ON a.student_id = s.id
         WHERE a.course_id = ?1
         ORDER BY s.family_name, s.given_name, s.id",
    )?;
    let mut students = stmt
        .query_map(params![course_id], |r| {
            Ok(StudentResp {
                id: r.get(0)?,
                email: r.get(1)?,
                given_name: r.get(2)?,
                family_name: r.get(3)?,
                groups: Vec::new(),
                moodle_username: r.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for student in &mut students {
        student.groups = select_groups(
            tx,
            "SELECT g.id, g.name FROM student_group_access sga JOIN course_group g ON g.id = sga.group_id
             WHERE sga.student_id = ?1 AND sga.course_id = ?2 ORDER BY g.name",
            &student.id,
            course_id,
        )?;
    }
    Ok(students)
}

fn select_teachers(tx: &Transaction<'_>, course_id: i64) -> Result<Vec<TeacherResp>> {
    let mut stmt = tx.prepare(
        "SELECT t.id, t.email, t.given_name, t.family_name
         FROM teacher t JOIN teacher_course_access a ON a.teacher_id = t.id
         WHERE a.course_id = ?1
         ORDER BY t.family_name, t.given_name, t.id",
    )?;
    let mut teachers = stmt
        .query_map(params![course_id], |r| {
            Ok(TeacherResp {
                id: r.get(0)?,
                email: r.get(1)?,
                given_name: r.get(2)?,
                family_name: r.get(3)?,
                groups: Vec::new(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for teacher in &mut teachers {
        teacher.groups = select_groups(
            tx,
            "SELECT g.id, g.name FROM teacher_group_access tga JOIN course_group g ON g.id = tga.group_id
             WHERE tga.teacher_id = ?1 AND tga.course_id = ?2 ORDER BY g.name",
            &teacher.id,
            course_id,
        )?;
    }
    Ok(teachers)
}

fn select_pending(tx: &Transaction<'_>, course_id: i64) -> Result<Vec<PendingStudentResp>> {
    let mut stmt = tx.prepare(
        "SELECT id, email, valid_from FROM student_pending_access WHERE course_id = ?1 ORDER BY email",
    )?;
    let rows = stmt
        .query_map(params![course_id], |r| {
            Ok((r.get::<_, i64>(0)?, r.get(1)?, r.get(2)?))
        })?
        .collect::<rusqlite::Result<Vec<(i64, String, DateTime<Utc>)>>>()?;

    rows.into_iter()
        .map(|(id, email, valid_from)| {
            let groups = select_groups(
                tx,
                "SELECT g.id, g.name FROM student_pending_group spg JOIN course_group g ON g.id = spg.group_id
                 WHERE spg.pending_access_id = ?1 AND g.course_id = ?2 ORDER BY g.name",
                &id,
                course_id,
            )?;
            Ok(PendingStudentResp {
                email,
                valid_from,
                groups,
            })
        })
        .collect()
}

fn select_moodle_pending(tx: &Transaction<'_>, course_id: i64) -> Result<Vec<PendingMoodleStudentResp>> {
    let mut stmt = tx.prepare(
        "SELECT moodle_username, email FROM student_moodle_pending_access
         WHERE course_id = ?1 ORDER BY moodle_username",
    )?;
    let pending = stmt
        .query_map(params![course_id], |r| {
            Ok(PendingMoodleStudentResp {
                ut_username: r.get(0)?,
                email: r.get(1)?,
                groups: Vec::new(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(pending)
}

/// Resolves group references, all of which must be on the course.
fn course_group_ids(tx: &Transaction<'_>, course_id: i64, groups: &[GroupRef]) -> Result<Vec<i64>> {
    groups
        .iter()
        .map(|group| {
            let id = parse_id("groups.id", &group.id)?;
            tx.query_row(
                "SELECT id FROM course_group WHERE id = ?1 AND course_id = ?2",
                params![id, course_id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| CoreError::invalid_parameter("groups.id", &group.id))
        })
        .collect()
}

/// Gives students access to a course.
///
/// Registered students get access right away. For unknown emails a pending
/// access is created, or renewed if one already exists.
#[instrument(level = "debug", skip_all, fields(caller = %caller.id, course_id = %course_id))]
pub fn add_students(
    conn: &mut Connection,
    caller: &Caller,
    course_id: &str,
    req: &AddStudentsReq,
) -> Result<AddStudentsResp> {
    caller.require_role(&[Role::Teacher, Role::Admin])?;
    let course_id = parse_id("courseId", course_id)?;
    let tx = conn.transaction()?;
    caller.assert_teacher_or_admin_access(&tx, course_id)?;

    let now = Utc::now();
    let mut resp = AddStudentsResp::default();
    for new in &req.students {
        check_not_blank("email", &new.email, 100)?;
        let email = new.email.trim().to_lowercase();
        let group_ids = course_group_ids(&tx, course_id, &new.groups)?;

        let student_id: Option<String> = tx
            .query_row(
                "SELECT id FROM student WHERE lower(email) = ?1",
                params![email],
                |r| r.get(0),
            )
            .optional()?;

        if let Some(student_id) = student_id {
            let added = tx.execute(
                "INSERT OR IGNORE INTO student_course_access (student_id, course_id) VALUES (?1, ?2)",
                params![student_id, course_id],
            )?;
            for group_id in &group_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO student_group_access (student_id, course_id, group_id) VALUES (?1, ?2, ?3)",
                    params![student_id, course_id, group_id],
                )?;
            }
            if added > 0 {
                resp.accesses_added += 1;
            }
        } else {
            tx.execute(
                "INSERT INTO student_pending_access (course_id, email, valid_from) VALUES (?1, ?2, ?3)
                 ON CONFLICT (course_id, email) DO UPDATE SET valid_from = excluded.valid_from",
                params![course_id, email, now],
            )?;
            let pending_id: i64 = tx.query_row(
                "SELECT id FROM student_pending_access WHERE course_id = ?1 AND email = ?2",
                params![course_id, email],
                |r| r.get(0),
            )?;
            tx.execute(
                "DELETE FROM student_pending_group WHERE pending_access_id = ?1",
                params![pending_id],
            )?;
            for group_id in &group_ids {
                tx.execute(
                    "INSERT INTO student_pending_group (pending_access_id, group_id) VALUES (?1, ?2)",
                    params![pending_id, group_id],
                )?;
            }
            resp.pending_accesses_added_updated += 1;
        }
    }
    tx.commit()?;

    info!(
        course_id,
        added = resp.accesses_added,
        pending = resp.pending_accesses_added_updated,
        "Added students"
    );
    Ok(resp)
}

/// Removes students and pending accesses from a course.
///
/// Ids and emails that are not on the course are ignored.
#[instrument(level = "debug", skip_all, fields(caller = %caller.id, course_id = %course_id))]
pub fn remove_students(
    conn: &mut Connection,
    caller: &Caller,
    course_id: &str,
    req: &RemoveStudentsReq,
) -> Result<()> {
    caller.require_role(&[Role::Teacher, Role::Admin])?;
    let course_id = parse_id("courseId", course_id)?;
    let tx = conn.transaction()?;
    caller.assert_teacher_or_admin_access(&tx, course_id)?;

    let mut removed = 0;
    for student in &req.active_students {
        tx.execute(
            "DELETE FROM student_group_access WHERE student_id = ?1 AND course_id = ?2",
            params![student.id, course_id],
        )?;
        removed += tx.execute(
            "DELETE FROM student_course_access WHERE student_id = ?1 AND course_id = ?2",
            params![student.id, course_id],
        )?;
    }
    for pending in &req.pending_students {
        removed += tx.execute(
            "DELETE FROM student_pending_access WHERE course_id = ?1 AND email = ?2",
            params![course_id, pending.email.trim().to_lowercase()],
        )?;
    }
    for pending in &req.moodle_pending_students {
        removed += tx.execute(
            "DELETE FROM student_moodle_pending_access WHERE course_id = ?1 AND moodle_username = ?2",
            params![course_id, pending.ut_username.trim()],
        )?;
    }
    tx.commit()?;

    info!(course_id, removed, "Removed students");
    Ok(())
}

/// Replaces the groups of students and pending accesses on a course.
///
/// Every referenced student must have access to the course and every email
/// must have a pending access, otherwise nothing is changed.
#[instrument(level = "debug", skip_all, fields(caller = %caller.id, course_id = %course_id))]
pub fn set_student_groups(
    conn: &mut Connection,
    caller: &Caller,
    course_id: &str,
    req: &SetStudentGroupsReq,
) -> Result<()> {
    caller.require_role(&[Role::Teacher, Role::Admin])?;
    let course_id = parse_id("courseId", course_id)?;
    let tx = conn.transaction()?;
    caller.assert_teacher_or_admin_access(&tx, course_id)?;
    let group_ids = course_group_ids(&tx, course_id, &req.groups)?;

    for student in &req.active_students {
        let on_course = tx
            .query_row(
                "SELECT 1 FROM student_course_access WHERE student_id = ?1 AND course_id = ?2",
                params![student.id, course_id],
                |_| Ok(()),
            )
            .optional()?;
        if on_course.is_none() {
            return Err(CoreError::invalid_parameter("active_students.id", &student.id));
        }
        tx.execute(
            "DELETE FROM student_group_access WHERE student_id = ?1 AND course_id = ?2",
            params![student.id, course_id],
        )?;
        for group_id in &group_ids {
            tx.execute(
                "INSERT INTO student_group_access (student_id, course_id, group_id) VALUES (?1, ?2, ?3)",
                params![student.id, course_id, group_id],
            )?;
        }
    }
    for pending in &req.pending_students {
        let email = pending.email.trim().to_lowercase();
        let pending_id: i64 = tx
            .query_row(
                "SELECT id FROM student_pending_access WHERE course_id = ?1 AND email = ?2",
                params![course_id, email],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| CoreError::invalid_parameter("pending_students.email", &pending.email))?;
        tx.execute(
            "DELETE FROM student_pending_group WHERE pending_access_id = ?1",
            params![pending_id],
        )?;
        for group_id in &group_ids {
            tx.execute(
                "INSERT INTO student_pending_group (pending_access_id, group_id) VALUES (?1, ?2)",
                params![pending_id, group_id],
            )?;
        }
    }
    tx.commit()?;

    debug!(
        course_id,
        students = req.active_students.len() + req.pending_students.len(),
        groups = group_ids.len(),
        "Set student groups"
    );
    Ok(())
}
