//! Exercises of a course, as a student or a teacher sees them.

use chrono::{DateTime, Utc};
use lahendus_spa::{
    async_trait, paint, values, Env, Page, PageContext, PathSchema, Result, Slot, SpaError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{render_crumbs, Crumb};
use crate::api::{
    no_course_access_page, EmsClient, ExerciseStatus, GraderType, StudentExercise,
    TeacherExercise,
};
use crate::session::Role;
use crate::shares::{calculate_student_shares, StudentCounts};
use crate::templates::CONTENT_CONTAINER_ID;
use crate::title::{Title, TitleSpec};

/// History state: the painted list for one course and role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct State {
    course_id: String,
    role: Role,
    exercises_html: String,
}

fn crumbs(course_title: &str) -> [Crumb; 2] {
    [Crumb::link("My courses", "/courses"), Crumb::current(course_title)]
}

fn format_deadline(deadline: DateTime<Utc>) -> String {
    deadline.format("%d.%m.%Y").to_string()
}

fn exercise_href(course_id: &str, exercise_id: &str) -> String {
    format!("/courses/{course_id}/exercises/{exercise_id}/summary")
}

fn student_row(course_id: &str, ex: &StudentExercise) -> Result<Value> {
    let points = match (ex.graded_by, ex.grade) {
        (Some(_), Some(grade)) => Some(grade.to_string()),
        (Some(_), None) => {
            return Err(SpaError::Page(format!(
                "Exercise {} has a grader type but no grade",
                ex.id
            )))
        }
        (None, _) => None,
    };
    Ok(json!({
        "href": exercise_href(course_id, &ex.id),
        "title": ex.effective_title,
        "deadline": ex.deadline.map(format_deadline),
        "unstarted": ex.status == ExerciseStatus::Unstarted,
        "started": ex.status == ExerciseStatus::Started && ex.graded_by.is_some(),
        "completed": ex.status == ExerciseStatus::Completed,
        "evalAuto": ex.graded_by == Some(GraderType::Auto),
        "evalTeacher": ex.graded_by == Some(GraderType::Teacher),
        "evalMissing": ex.graded_by.is_none() && ex.status != ExerciseStatus::Unstarted,
        "points": points,
    }))
}

fn teacher_row(course_id: &str, ex: &TeacherExercise) -> Value {
    let counts = StudentCounts {
        completed: ex.completed_count,
        started: ex.started_count,
        ungraded: ex.ungraded_count,
        unstarted: ex.unstarted_count,
    };
    let shares = calculate_student_shares(counts);
    json!({
        "href": exercise_href(course_id, &ex.id),
        "title": ex.effective_title,
        "deadline": ex.soft_deadline.map(format_deadline),
        "studentsExist": counts.total() != 0,
        "noBb": shares.is_empty(),
        "completedPc": shares.completed * 100.0,
        "startedPc": shares.started * 100.0,
        "ungradedPc": shares.ungraded * 100.0,
        "unstartedPc": shares.unstarted * 100.0,
        "completedCount": ex.completed_count,
        "startedCount": ex.started_count,
        "ungradedCount": ex.ungraded_count,
        "unstartedCount": ex.unstarted_count,
    })
}

/// The exercise list of a course.
///
/// Students see their own progress and grades, teachers and admins see how
/// the whole course is doing. The painted list is kept in history state and
/// reused when returning to the same course in the same role.
pub struct CourseExercisesPage {
    schema: PathSchema,
    api: EmsClient,
    title: Title,
}

impl CourseExercisesPage {
    /// Creates the page.
    pub fn new(api: EmsClient, title: Title) -> Result<Self> {
        Ok(Self {
            schema: PathSchema::new("/courses/{courseId}/exercises")?,
            api,
            title,
        })
    }

    /// Path of the exercises page of a course.
    pub fn link(&self, course_id: &str) -> String {
        self.schema.link(&[("courseId", course_id)])
    }

    fn set_course_title(&self, env: &Env, course_title: &str) {
        self.title.replace(
            env,
            TitleSpec {
                page_title: None,
                parent_page_title: Some(course_title.to_string()),
            },
        );
    }

    async fn build_student(&self, env: &Env, course_id: &str) -> Result<String> {
        let (exercises, info) = futures::try_join!(
            self.api.student_exercises(course_id, no_course_access_page(env)),
            self.api.basic_course_info(course_id),
        )?;
        self.set_course_title(env, &info.title);

        let mut exercises = exercises.exercises;
        exercises.sort_by_key(|ex| ex.ordering_idx);
        let rows = exercises
            .iter()
            .map(|ex| student_row(course_id, ex))
            .collect::<Result<Vec<_>>>()?;

        env.render(
            "t-c-stud-course-exercises",
            &values([
                ("crumbsHtml", render_crumbs(env, &crumbs(&info.title))?.into()),
                ("courseTitle", info.title.into()),
                ("exercises", rows.into()),
            ]),
        )
    }

    async fn build_teacher(&self, env: &Env, course_id: &str) -> Result<String> {
        let (exercises, info) = futures::try_join!(
            self.api.teacher_exercises(course_id, no_course_access_page(env)),
            self.api.basic_course_info(course_id),
        )?;
        self.set_course_title(env, &info.title);

        let mut exercises = exercises.exercises;
        exercises.sort_by_key(|ex| ex.ordering_idx);
        let rows: Vec<Value> = exercises.iter().map(|ex| teacher_row(course_id, ex)).collect();

        env.render(
            "t-c-teach-course-exercises",
            &values([
                ("crumbsHtml", render_crumbs(env, &crumbs(&info.title))?.into()),
                ("courseTitle", info.title.into()),
                ("gradesHref", format!("/courses/{course_id}/grades").into()),
                ("exercises", rows.into()),
            ]),
        )
    }
}

#[async_trait(?Send)]
impl Page for CourseExercisesPage {
    fn name(&self) -> &str {
        "course-exercises"
    }

    fn path_schema(&self) -> &PathSchema {
        &self.schema
    }

    async fn build(&mut self, env: &Env, ctx: PageContext) -> Result<Option<String>> {
        let course_id = ctx.param("courseId")?.to_string();
        let role = self.api.session().role;
        let container = Slot::root(CONTENT_CONTAINER_ID);

        if let Some(raw) = ctx.state.as_deref() {
            let state: State = serde_json::from_str(raw)?;
            if state.course_id == course_id && state.role == role {
                debug!(%course_id, "Exercises from page state");
                paint(&container, env, &state.exercises_html)?;
                return Ok(None);
            }
        }

        info!(%course_id, %role, "Building course exercises");
        let exercises_html = match role {
            Role::Student => self.build_student(env, &course_id).await?,
            Role::Teacher | Role::Admin => self.build_teacher(env, &course_id).await?,
        };
        paint(&container, env, &exercises_html)?;

        let state = State {
            course_id,
            role,
            exercises_html,
        };
        Ok(Some(serde_json::to_string(&state)?))
    }
}
