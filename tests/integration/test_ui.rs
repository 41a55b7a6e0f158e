//! End-to-end tests of the web UI against the real API
//!
//! Pages and components run on a [`MemoryDom`] and reach the demo course
//! through the in-process router transport.

use std::rc::Rc;

use axum::Router;
use lahendus_cli::{render_page, Headless, RouterTransport};
use lahendus_core::{create_router, AppState, Config};
use lahendus_spa::{
    create_and_build, Component, Dom, Env, Fetcher, MemoryDom, PageOutcome, Slot, ROOT_ID,
};
use lahendus_wui::api::{no_course_access_page, Participants};
use lahendus_wui::pages::{AddStudentsComp, StudentsListComp};
use lahendus_wui::{EmsClient, Role, Session, Templates};

fn demo_router() -> Router {
    create_router(AppState::open(Config::in_memory_demo()).expect("Failed to open demo database"))
}

/// A document and API client for the teacher of the demo course.
fn teacher_env(router: Router) -> (Rc<MemoryDom>, Env, EmsClient) {
    let dom = Rc::new(MemoryDom::new());
    let env = Env::new(dom.clone(), Rc::new(Templates::new()));
    let api = EmsClient::new(
        Fetcher::new(Rc::new(RouterTransport::new(router))),
        Session::new("ago", Role::Teacher),
    );
    (dom, env, api)
}

async fn participants(api: &EmsClient, env: &Env) -> Participants {
    api.participants("1", no_course_access_page(env))
        .await
        .expect("Failed to load participants")
}

/// Builds an editable students list of the demo course into the document root.
async fn students_list(
    dom: &MemoryDom,
    env: &Env,
    api: &EmsClient,
    participants: &Participants,
) -> StudentsListComp {
    let root = Slot::root(ROOT_ID);
    let mut list = StudentsListComp::new(&root, env, "1", participants, true, api.clone());
    dom.set_inner_html(ROOT_ID, &format!(r#"<div id="{}"></div>"#, list.slot().id()))
        .expect("Failed to paint root");
    create_and_build(&mut list, env)
        .await
        .expect("Failed to build list");
    list
}

/// Tests that a teacher sees students, pending invitations and teachers.
#[tokio::test]
async fn test_participants_page_for_teacher() {
    let page = render_page(
        demo_router(),
        Session::new("ago", Role::Teacher),
        "Lahendus",
        "/courses/1/participants",
    )
    .await
    .expect("Failed to render");

    assert_eq!(page.outcome, PageOutcome::Built);
    assert_eq!(page.title, "Participants - Programming - Lahendus");
    assert!(page.html.contains("Mari Maasikas"));
    assert!(page.html.contains("(Invitation pending)"));
    assert!(page.html.contains("Ago Tamm"));
    assert!(page.html.contains("Remove from course"));
}

/// Tests that students get the no-access view instead of participants.
#[tokio::test]
async fn test_participants_page_denied_for_student() {
    let page = render_page(
        demo_router(),
        Session::new("mari", Role::Student),
        "Lahendus",
        "/courses/1/participants",
    )
    .await
    .expect("Failed to render");

    assert!(page.html.contains("You do not have access to this course."));
    assert!(!page.html.contains("Jaan"));
}

/// Tests the exercise list in both roles.
#[tokio::test]
async fn test_course_exercises_by_role() {
    let mut teacher = Headless::new(demo_router(), Session::new("ago", Role::Teacher), "Lahendus")
        .expect("Failed to start");
    let outcome = teacher
        .navigate("/courses/1/exercises")
        .await
        .expect("Failed to navigate");
    assert_eq!(outcome, PageOutcome::Built);
    let html = teacher.html();
    assert!(html.contains("Loops and lists"));
    assert!(html.contains("Exam"));
    assert!(html.contains("/courses/1/grades"));

    let page = render_page(
        demo_router(),
        Session::new("jaan", Role::Student),
        "Lahendus",
        "/courses/1/exercises",
    )
    .await
    .expect("Failed to render");
    assert_eq!(page.outcome, PageOutcome::Built);
    assert!(page.html.contains("Hello"));
    assert!(page.html.contains("95"));
    assert!(!page.html.contains("Exam"));
}

/// Tests that unknown paths paint the not-found view.
#[tokio::test]
async fn test_unknown_path() {
    let page = render_page(
        demo_router(),
        Session::new("ago", Role::Teacher),
        "Lahendus",
        "/nowhere",
    )
    .await
    .expect("Failed to render");

    assert_eq!(page.outcome, PageOutcome::NotFound);
    assert!(page.html.contains("Page not found"));
    assert_eq!(page.title, "Lahendus");
}

/// Tests removing a student through the confirmation dialog.
#[tokio::test]
async fn test_remove_student_through_modal() {
    let (dom, env, api) = teacher_env(demo_router());
    let before = participants(&api, &env).await;
    assert_eq!(before.students.len(), 3);

    let list = students_list(&dom, &env, &api, &before).await;
    let coll = list.coll().expect("No collection");
    let modal = list.modal().expect("No modal");
    let (mari, _) = coll
        .visible_items()
        .into_iter()
        .find(|(_, item)| item.title == "Mari Maasikas")
        .expect("Mari not listed");

    let confirm = async {
        assert!(modal.is_open());
        dom.click(&modal.primary_id()).await.expect("Confirm failed");
    };
    let action = coll.action_id(mari, 0);
    let (clicked, ()) = futures::join!(dom.click(&action), confirm);
    clicked.expect("Remove failed");

    let after = participants(&api, &env).await;
    let ids: Vec<&str> = after.students.iter().map(|s| s.id.as_str()).collect();
    assert!(!ids.contains(&"mari"));
    assert_eq!(ids.len(), 2);
    let listed = before.students.len()
        + before.students_pending.len()
        + before.students_moodle_pending.len();
    assert_eq!(coll.total_count(), listed - 1);
}

/// Tests that removing a Moodle-pending student removes their access.
#[tokio::test]
async fn test_remove_moodle_pending_student() {
    let (dom, env, api) = teacher_env(demo_router());
    let before = participants(&api, &env).await;
    assert_eq!(before.students_moodle_pending[0].email, "peeter@example.com");

    let list = students_list(&dom, &env, &api, &before).await;
    let coll = list.coll().expect("No collection");
    let modal = list.modal().expect("No modal");
    let (peeter, _) = coll
        .visible_items()
        .into_iter()
        .find(|(_, item)| item.props.email == "peeter@example.com")
        .expect("Peeter not listed");

    let action = coll.action_id(peeter, 0);
    let confirm = async {
        dom.click(&modal.primary_id()).await.expect("Confirm failed");
    };
    let (clicked, ()) = futures::join!(dom.click(&action), confirm);
    clicked.expect("Remove failed");

    let after = participants(&api, &env).await;
    assert!(after.students_moodle_pending.is_empty());
    assert_eq!(after.students_pending.len(), before.students_pending.len());
    assert_eq!(after.students.len(), before.students.len());
}

/// Tests moving a student between groups from the groups attribute.
#[tokio::test]
async fn test_change_student_group() {
    let (dom, env, api) = teacher_env(demo_router());
    let before = participants(&api, &env).await;

    let list = students_list(&dom, &env, &api, &before).await;
    let coll = list.coll().expect("No collection");
    let (kati, _) = coll
        .visible_items()
        .into_iter()
        .find(|(_, item)| item.props.username.as_deref() == Some("kati"))
        .expect("Kati not listed");

    dom.click(&coll.top_attr_id(kati))
        .await
        .expect("Group click failed");

    let after = participants(&api, &env).await;
    let kati = after
        .students
        .iter()
        .find(|s| s.id == "kati")
        .expect("Kati removed");
    let names: Vec<&str> = kati.groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["A"]);
}

/// Tests inviting an unregistered student by email.
#[tokio::test]
async fn test_add_student_by_email() {
    let (dom, env, api) = teacher_env(demo_router());

    let root = Slot::root(ROOT_ID);
    let mut add = AddStudentsComp::new(&root, &env, "1".to_string(), api.clone());
    dom.set_inner_html(ROOT_ID, &format!(r#"<div id="{}"></div>"#, add.slot().id()))
        .expect("Failed to paint root");
    create_and_build(&mut add, &env).await.expect("Failed to build");
    let input = add.input_id().expect("No input").to_string();

    dom.input(&input, "New.Student@example.com").expect("Input failed");
    dom.click(add.button_id()).await.expect("Click failed");

    let after = participants(&api, &env).await;
    let pending: Vec<&str> = after
        .students_pending
        .iter()
        .map(|p| p.email.as_str())
        .collect();
    assert!(pending.contains(&"new.student@example.com"));
    assert_eq!(after.students.len(), 3);
}
