//! Pages served by the UI.

mod course_exercises;
mod participants;

pub use course_exercises::CourseExercisesPage;
pub use participants::{AddStudentsComp, ParticipantsPage, StudentProps, StudentsListComp};

use lahendus_spa::{Env, Result};
use serde_json::json;

/// A breadcrumb. The last crumb of a trail has no link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crumb {
    /// Shown text.
    pub label: String,
    /// Link target.
    pub href: Option<String>,
}

impl Crumb {
    /// A crumb linking to `href`.
    pub fn link(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: Some(href.into()),
        }
    }

    /// The crumb of the current page.
    pub fn current(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: None,
        }
    }
}

/// Crumbs from the course list down to a course.
pub fn course_crumbs(course_id: &str, course_title: &str) -> Vec<Crumb> {
    vec![
        Crumb::link("My courses", "/courses"),
        Crumb::link(course_title, format!("/courses/{course_id}/exercises")),
    ]
}

/// Renders a breadcrumb trail.
pub fn render_crumbs(env: &Env, crumbs: &[Crumb]) -> Result<String> {
    let crumbs: Vec<_> = crumbs
        .iter()
        .map(|c| json!({ "label": c.label, "href": c.href }))
        .collect();
    env.render("t-c-breadcrumbs", &json!({ "crumbs": crumbs }))
}
