//! Typed access to the exercise management service.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use lahendus_spa::fetch::ErrorHandler;
use lahendus_spa::{values, Env, FetchError, FetchRequest, Fetcher};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::session::Session;
use crate::templates::CONTENT_CONTAINER_ID;

/// Header carrying the username.
pub const USER_HEADER: &str = "x-lahendus-user";

/// Header carrying the active role.
pub const ROLE_HEADER: &str = "x-lahendus-role";

/// Error code for a caller without access to the requested course.
pub const NO_COURSE_ACCESS: &str = "NO_COURSE_ACCESS";

// ============================================================================
// DTOs
// ============================================================================

/// Basic course info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicCourseInfo {
    /// Title.
    pub title: String,
}

/// A group within a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A student with access to a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Identifier.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Given name.
    pub given_name: String,
    /// Family name.
    pub family_name: String,
    /// Groups on the course.
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Moodle username, when linked.
    #[serde(default)]
    pub moodle_username: Option<String>,
}

/// A teacher on a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    /// Identifier.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Given name.
    pub given_name: String,
    /// Family name.
    pub family_name: String,
    /// Groups on the course.
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// Access waiting for a student with this email to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStudent {
    /// Email address.
    pub email: String,
    /// When the invitation was created or renewed.
    pub valid_from: DateTime<Utc>,
    /// Groups on the course.
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// Access waiting for a Moodle user to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMoodleStudent {
    /// University username from Moodle.
    pub ut_username: String,
    /// Email address.
    pub email: String,
    /// Groups on the course.
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// Everyone on a course.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    /// Short name of the linked Moodle course.
    #[serde(default)]
    pub moodle_short_name: Option<String>,
    /// Whether students are managed in Moodle.
    #[serde(default)]
    pub moodle_students_synced: Option<bool>,
    /// Whether grades are sent to Moodle.
    #[serde(default)]
    pub moodle_grades_synced: Option<bool>,
    /// Active students.
    #[serde(default)]
    pub students: Vec<Student>,
    /// Teachers.
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    /// Invitations by email.
    #[serde(default)]
    pub students_pending: Vec<PendingStudent>,
    /// Moodle students who have not registered yet.
    #[serde(default)]
    pub students_moodle_pending: Vec<PendingMoodleStudent>,
}

/// Who grades an exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GraderType {
    /// Automatic assessment.
    Auto,
    /// A teacher.
    Teacher,
}

/// A student's progress on an exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExerciseStatus {
    /// Nothing submitted.
    Unstarted,
    /// Submitted, not yet at the threshold.
    Started,
    /// Graded at or above the threshold.
    Completed,
}

/// A visible exercise with the caller's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentExercise {
    /// Identifier.
    pub id: String,
    /// Title alias, or the exercise title.
    pub effective_title: String,
    /// Soft deadline.
    pub deadline: Option<DateTime<Utc>>,
    /// Progress of the latest submission.
    pub status: ExerciseStatus,
    /// Grade, 0 to 100.
    pub grade: Option<i32>,
    /// Who gave the grade.
    pub graded_by: Option<GraderType>,
    /// Position on the course.
    pub ordering_idx: i32,
}

/// Exercises a student sees on a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentExercises {
    /// Exercises ordered by position.
    pub exercises: Vec<StudentExercise>,
}

/// An exercise with per-status student counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherExercise {
    /// Identifier.
    pub id: String,
    /// Title alias, or the exercise title.
    pub effective_title: String,
    /// Soft deadline.
    pub soft_deadline: Option<DateTime<Utc>>,
    /// Who grades.
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
pub struct TeacherExercises {
    /// Exercises ordered by position.
    pub exercises: Vec<TeacherExercise>,
}

/// Outcome of adding students by email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStudentsResult {
    /// Registered students given access.
    pub accesses_added: u32,
    /// Pending accesses created or renewed.
    pub pending_accesses_added_updated: u32,
}

// ============================================================================
// Error handlers
// ============================================================================

/// Paints the "no access" view over the page content.
pub fn no_course_access_page(env: &Env) -> ErrorHandler {
    let env = env.clone();
    Rc::new(move |_body| {
        debug!("No course access, showing no-access view");
        let painted = env
            .render("tm-no-access", &values([]))
            .and_then(|html| env.dom().set_inner_html(CONTENT_CONTAINER_ID, &html));
        if let Err(e) = painted {
            warn!(error = %e, "Failed to paint no-access view");
        }
    })
}

// ============================================================================
// Client
// ============================================================================

/// Client for the exercise management service.
///
/// Clones share the fetcher and the course info cache.
#[derive(Debug, Clone)]
pub struct EmsClient {
    fetcher: Fetcher,
    session: Session,
    course_info: Rc<RefCell<HashMap<String, BasicCourseInfo>>>,
}

impl EmsClient {
    /// Creates a client sending the session's identity with every request.
    pub fn new(fetcher: Fetcher, session: Session) -> Self {
        fetcher.set_default_header(USER_HEADER, session.user_id.clone());
        fetcher.set_default_header(ROLE_HEADER, session.role.as_str());
        Self {
            fetcher,
            session,
            course_info: Rc::default(),
        }
    }

    /// The underlying fetcher.
    pub const fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// The session requests are made for.
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Course title, cached after the first successful request.
    pub async fn basic_course_info(&self, course_id: &str) -> Result<BasicCourseInfo, FetchError> {
        if let Some(info) = self.course_info.borrow().get(course_id) {
            debug!(course_id, "Course info from cache");
            return Ok(info.clone());
        }
        let info: BasicCourseInfo = self
            .fetcher
            .fetch(FetchRequest::get(format!("/courses/{course_id}/basic")))
            .await?
            .parse()?;
        self.course_info
            .borrow_mut()
            .insert(course_id.to_string(), info.clone());
        Ok(info)
    }

    /// Everyone on a course.
    pub async fn participants(
        &self,
        course_id: &str,
        on_no_access: ErrorHandler,
    ) -> Result<Participants, FetchError> {
        self.fetcher
            .fetch(
                FetchRequest::get(format!("/courses/{course_id}/participants"))
                    .on_error(NO_COURSE_ACCESS, on_no_access),
            )
            .await?
            .parse()
    }

    /// Gives students access to a course by email.
    pub async fn add_students(
        &self,
        course_id: &str,
        emails: &[String],
    ) -> Result<AddStudentsResult, FetchError> {
        let students: Vec<_> = emails
            .iter()
            .map(|email| json!({ "email": email, "groups": [] }))
            .collect();
        self.fetcher
            .fetch(
                FetchRequest::post(format!("/courses/{course_id}/students"))
                    .json(json!({ "students": students })),
            )
            .await?
            .parse()
    }

    /// Removes active students by id, pending accesses by email and
    /// Moodle-pending accesses by Moodle username.
    pub async fn remove_students(
        &self,
        course_id: &str,
        student_ids: &[String],
        pending_emails: &[String],
        moodle_usernames: &[String],
    ) -> Result<(), FetchError> {
        let active: Vec<_> = student_ids.iter().map(|id| json!({ "id": id })).collect();
        let pending: Vec<_> = pending_emails
            .iter()
            .map(|email| json!({ "email": email }))
            .collect();
        let moodle_pending: Vec<_> = moodle_usernames
            .iter()
            .map(|username| json!({ "ut_username": username }))
            .collect();
        self.fetcher
            .fetch(
                FetchRequest::delete(format!("/courses/{course_id}/students")).json(json!({
                    "active_students": active,
                    "pending_students": pending,
                    "moodle_pending_students": moodle_pending,
                })),
            )
            .await?;
        Ok(())
    }

    /// Puts students and pending accesses into exactly the given groups.
    pub async fn set_student_groups(
        &self,
        course_id: &str,
        student_ids: &[String],
        pending_emails: &[String],
        group_ids: &[String],
    ) -> Result<(), FetchError> {
        let active: Vec<_> = student_ids.iter().map(|id| json!({ "id": id })).collect();
        let pending: Vec<_> = pending_emails
            .iter()
            .map(|email| json!({ "email": email }))
            .collect();
        let groups: Vec<_> = group_ids.iter().map(|id| json!({ "id": id })).collect();
        self.fetcher
            .fetch(
                FetchRequest::put(format!("/courses/{course_id}/students/groups")).json(json!({
                    "active_students": active,
                    "pending_students": pending,
                    "groups": groups,
                })),
            )
            .await?;
        Ok(())
    }

    /// Exercises on a course with per-status student counts.
    pub async fn teacher_exercises(
        &self,
        course_id: &str,
        on_no_access: ErrorHandler,
    ) -> Result<TeacherExercises, FetchError> {
        self.fetcher
            .fetch(
                FetchRequest::get(format!("/teacher/courses/{course_id}/exercises"))
                    .on_error(NO_COURSE_ACCESS, on_no_access),
            )
            .await?
            .parse()
    }

    /// The caller's exercises on a course.
    pub async fn student_exercises(
        &self,
        course_id: &str,
        on_no_access: ErrorHandler,
    ) -> Result<StudentExercises, FetchError> {
        self.fetcher
            .fetch(
                FetchRequest::get(format!("/student/courses/{course_id}/exercises"))
                    .on_error(NO_COURSE_ACCESS, on_no_access),
            )
            .await?
            .parse()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::cell::Cell;

    use lahendus_spa::{async_trait, Request, Response, Transport};
    use serde_json::json;

    use super::*;
    use crate::session::Role;

    struct CountingTransport {
        sent: RefCell<Vec<Request>>,
        calls: Cell<usize>,
    }

    #[async_trait(?Send)]
    impl Transport for CountingTransport {
        async fn send(&self, request: Request) -> Result<Response, String> {
            self.calls.set(self.calls.get() + 1);
            self.sent.borrow_mut().push(request);
            Ok(Response {
                status: 200,
                body: json!({ "title": "Programming" }),
            })
        }
    }

    #[tokio::test]
    async fn test_course_info_is_cached_and_identity_sent() {
        let transport = Rc::new(CountingTransport {
            sent: RefCell::new(Vec::new()),
            calls: Cell::new(0),
        });
        let client = EmsClient::new(
            Fetcher::new(transport.clone()),
            Session::new("ago", Role::Teacher),
        );

        let first = client.basic_course_info("1").await.unwrap();
        let second = client.clone().basic_course_info("1").await.unwrap();

        assert_eq!(first.title, "Programming");
        assert_eq!(first, second);
        assert_eq!(transport.calls.get(), 1);
        let sent = transport.sent.borrow();
        assert!(sent[0]
            .headers
            .contains(&(USER_HEADER.to_string(), "ago".to_string())));
        assert!(sent[0]
            .headers
            .contains(&(ROLE_HEADER.to_string(), "teacher".to_string())));
    }

    #[test]
    fn test_participants_tolerate_missing_lists() {
        let parsed: Participants =
            serde_json::from_value(json!({ "teachers": [], "moodle_short_name": null })).unwrap();
        assert!(parsed.students.is_empty());
        assert!(parsed.students_pending.is_empty());
        assert_eq!(parsed.moodle_students_synced, None);
    }
}
