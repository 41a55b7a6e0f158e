//! Course participants: teachers, students and pending accesses.

mod add_students;
mod students_list;

use lahendus_spa::{
    async_trait, create_and_build, values, Component, Env, Page, PageContext, PathSchema, Result,
    Slot,
};
use serde_json::json;
use tracing::{debug, info};

pub use add_students::AddStudentsComp;
pub use students_list::{StudentProps, StudentsListComp};

use super::{course_crumbs, render_crumbs, Crumb};
use crate::api::{no_course_access_page, EmsClient, Participants, Teacher};
use crate::templates::CONTENT_CONTAINER_ID;
use crate::title::{Title, TitleSpec};

struct Loaded {
    course_title: String,
    participants: Participants,
}

/// Root component of the participants page.
struct ParticipantsRootComp {
    slot: Slot,
    course_id: String,
    api: EmsClient,
    title: Title,
    loaded: Option<Loaded>,
    add_students: Option<AddStudentsComp>,
    students: Option<StudentsListComp>,
}

impl ParticipantsRootComp {
    fn new(slot: Slot, course_id: String, api: EmsClient, title: Title) -> Self {
        Self {
            slot,
            course_id,
            api,
            title,
            loaded: None,
            add_students: None,
            students: None,
        }
    }
}

fn teacher_row(teacher: &Teacher) -> serde_json::Value {
    let groups: Vec<&str> = teacher.groups.iter().map(|g| g.name.as_str()).collect();
    json!({
        "name": format!("{} {}", teacher.given_name, teacher.family_name),
        "username": teacher.id,
        "email": teacher.email,
        "groups": groups.join(", "),
    })
}

#[async_trait(?Send)]
impl Component for ParticipantsRootComp {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Component> {
        let mut children: Vec<&mut dyn Component> = Vec::new();
        if let Some(add) = self.add_students.as_mut() {
            children.push(add);
        }
        if let Some(students) = self.students.as_mut() {
            children.push(students);
        }
        children
    }

    async fn create(&mut self, env: &Env) -> Result<()> {
        let (participants, info) = futures::try_join!(
            self.api
                .participants(&self.course_id, no_course_access_page(env)),
            self.api.basic_course_info(&self.course_id),
        )?;
        debug!(
            course_id = %self.course_id,
            students = participants.students.len(),
            pending = participants.students_pending.len(),
            "Participants loaded"
        );

        self.title.replace(
            env,
            TitleSpec {
                page_title: Some("Participants".to_string()),
                parent_page_title: Some(info.title.clone()),
            },
        );

        let editable = !participants.moodle_students_synced.unwrap_or(false);
        self.add_students = editable.then(|| {
            AddStudentsComp::new(&self.slot, env, self.course_id.clone(), self.api.clone())
        });
        self.students = Some(StudentsListComp::new(
            &self.slot,
            env,
            &self.course_id,
            &participants,
            editable,
            self.api.clone(),
        ));
        self.loaded = Some(Loaded {
            course_title: info.title,
            participants,
        });
        Ok(())
    }

    fn render(&self, env: &Env) -> Result<String> {
        let Some(loaded) = &self.loaded else {
            return Ok(String::new());
        };
        let p = &loaded.participants;

        let mut crumbs = course_crumbs(&self.course_id, &loaded.course_title);
        crumbs.push(Crumb::current("Participants"));
        let teachers: Vec<_> = p.teachers.iter().map(teacher_row).collect();

        env.render(
            "t-c-participants",
            &values([
                ("crumbsHtml", render_crumbs(env, &crumbs)?.into()),
                ("courseTitle", loaded.course_title.clone().into()),
                ("moodleSynced", p.moodle_short_name.is_some().into()),
                ("moodleShortName", p.moodle_short_name.clone().into()),
                ("studentsSynced", p.moodle_students_synced.unwrap_or(false).into()),
                ("teachers", teachers.into()),
                (
                    "addStudentsId",
                    self.add_students.as_ref().map(|c| c.slot().id().to_string()).into(),
                ),
                (
                    "studentsId",
                    self.students
                        .as_ref()
                        .map_or_else(String::new, |c| c.slot().id().to_string())
                        .into(),
                ),
            ]),
        )
    }
}

/// Lists a course's teachers and students and manages student access.
///
/// Teachers and admins only.
pub struct ParticipantsPage {
    schema: PathSchema,
    api: EmsClient,
    title: Title,
    root: Option<ParticipantsRootComp>,
}

impl ParticipantsPage {
    /// Creates the page.
    pub fn new(api: EmsClient, title: Title) -> Result<Self> {
        Ok(Self {
            schema: PathSchema::new("/courses/{courseId}/participants")?,
            api,
            title,
            root: None,
        })
    }
}

#[async_trait(?Send)]
impl Page for ParticipantsPage {
    fn name(&self) -> &str {
        "participants"
    }

    fn path_schema(&self) -> &PathSchema {
        &self.schema
    }

    async fn build(&mut self, env: &Env, ctx: PageContext) -> Result<Option<String>> {
        if !self.api.session().role.is_teacher_or_admin() {
            info!(role = %self.api.session().role, "Participants page denied for role");
            let html = env.render("tm-no-access", &values([]))?;
            env.dom().set_inner_html(CONTENT_CONTAINER_ID, &html)?;
            return Ok(None);
        }

        let course_id = ctx.param("courseId")?.to_string();
        let slot = Slot::root_with(CONTENT_CONTAINER_ID, ctx.rebuild_handle().callback());
        let mut root = ParticipantsRootComp::new(slot, course_id, self.api.clone(), self.title.clone());
        let built = create_and_build(&mut root, env).await;
        self.root = Some(root);
        built.map(|()| None)
    }

    fn clear(&mut self, _env: &Env) -> Result<()> {
        self.root = None;
        Ok(())
    }
}
