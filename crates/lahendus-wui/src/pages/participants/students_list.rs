use std::cmp::Ordering;
use std::rc::Rc;

use lahendus_spa::{async_trait, values, Component, Env, Result, Slot};
use tracing::{debug, warn};

use crate::api::{EmsClient, Group, Participants};
use crate::coll::{
    Action, ActionResult, EzColl, Filter, FilterGroup, Item, ListAttr, MassAction, SimpleAttr,
    Sorter, Strings, TitleStatus,
};
use crate::modal::{ConfirmationModal, ModalHandle};
use crate::notify::{show_message_or_log, MessageKind};

/// How many group memberships take part in sorting.
const SORTED_GROUPS: usize = 5;

/// Index of the group change among an item's actions.
const GROUPS_ACTION: usize = 1;

/// A student, or an access waiting for one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProps {
    /// First name, unknown for pending accesses.
    pub given_name: Option<String>,
    /// Last name, unknown for pending accesses.
    pub family_name: Option<String>,
    /// Email address.
    pub email: String,
    /// Username of a registered student.
    pub username: Option<String>,
    /// University username from Moodle.
    pub moodle_username: Option<String>,
    /// `false` for pending accesses.
    pub is_active: bool,
    /// Names of the groups the student belongs to.
    pub groups: Vec<String>,
}

impl StudentProps {
    /// All students of a course: active first, then pending, then Moodle pending.
    pub fn from_participants(participants: &Participants) -> Vec<Self> {
        let active = participants.students.iter().map(|s| Self {
            given_name: Some(s.given_name.clone()),
            family_name: Some(s.family_name.clone()),
            email: s.email.clone(),
            username: Some(s.id.clone()),
            moodle_username: s.moodle_username.clone(),
            is_active: true,
            groups: group_names(&s.groups),
        });
        let pending = participants.students_pending.iter().map(|s| Self {
            given_name: None,
            family_name: None,
            email: s.email.clone(),
            username: None,
            moodle_username: None,
            is_active: false,
            groups: group_names(&s.groups),
        });
        let moodle_pending = participants.students_moodle_pending.iter().map(|s| Self {
            given_name: None,
            family_name: None,
            email: s.email.clone(),
            username: None,
            moodle_username: Some(s.ut_username.clone()),
            is_active: false,
            groups: group_names(&s.groups),
        });

        active.chain(pending).chain(moodle_pending).collect()
    }

    fn title(&self) -> String {
        if self.is_active {
            format!(
                "{} {}",
                self.given_name.as_deref().unwrap_or_default(),
                self.family_name.as_deref().unwrap_or_default()
            )
        } else {
            "(Invitation pending)".to_string()
        }
    }

    fn last_name_key(&self) -> String {
        self.family_name
            .as_deref()
            .unwrap_or(&self.email)
            .to_lowercase()
    }

    fn first_name_key(&self) -> Option<String> {
        self.given_name.as_deref().map(str::to_lowercase)
    }
}

fn group_names(groups: &[Group]) -> Vec<String> {
    groups.iter().map(|g| g.name.clone()).collect()
}

/// Groups that have members on the course, ordered by name.
fn course_groups(participants: &Participants) -> Vec<Group> {
    let mut groups: Vec<Group> = participants
        .students
        .iter()
        .flat_map(|s| &s.groups)
        .chain(participants.students_pending.iter().flat_map(|s| &s.groups))
        .chain(participants.students_moodle_pending.iter().flat_map(|s| &s.groups))
        .cloned()
        .collect();
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    groups.dedup_by(|a, b| a.id == b.id);
    groups
}

/// The group after the last one a student is in, or none after the last
/// group. Students without a group go to the first one.
fn next_group<'a>(groups: &'a [Group], current: &[String]) -> Option<&'a Group> {
    match current.last() {
        None => groups.first(),
        Some(last) => {
            let at = groups.iter().position(|g| &g.name == last)?;
            groups.get(at + 1)
        }
    }
}

fn by_name(a: &Item<StudentProps>, b: &Item<StudentProps>) -> Ordering {
    a.props
        .last_name_key()
        .cmp(&b.props.last_name_key())
        .then_with(|| a.props.first_name_key().cmp(&b.props.first_name_key()))
}

fn by_group_and_name(a: &Item<StudentProps>, b: &Item<StudentProps>) -> Ordering {
    (0..SORTED_GROUPS)
        .map(|i| a.props.groups.get(i).cmp(&b.props.groups.get(i)))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
        .then_with(|| by_name(a, b))
}

/// Removes students after the user confirms in the modal.
#[derive(Clone)]
struct Remover {
    api: EmsClient,
    course_id: Rc<str>,
    modal: ModalHandle,
    env: Env,
}

impl Remover {
    async fn remove(self, items: Vec<Item<StudentProps>>) -> ActionResult<StudentProps> {
        debug!(titles = ?items.iter().map(|i| &i.title).collect::<Vec<_>>(), "Removing students");

        let text = match items.as_slice() {
            [single] if single.props.is_active => {
                format!("Remove {} from the course?", single.title)
            }
            [single] => format!("Remove the invitation for {}?", single.props.email),
            _ => format!("Remove {} students from the course?", items.len()),
        };
        self.modal.set_text(text);

        let ids: Rc<[String]> = items
            .iter()
            .filter_map(|i| i.props.username.clone())
            .collect();
        let pending = items.iter().filter(|i| !i.props.is_active);
        let emails: Rc<[String]> = pending
            .clone()
            .filter(|i| i.props.moodle_username.is_none())
            .map(|i| i.props.email.clone())
            .collect();
        let moodle_usernames: Rc<[String]> = pending
            .filter_map(|i| i.props.moodle_username.clone())
            .collect();
        let count = items.len();

        let Self {
            api,
            course_id,
            modal,
            env,
        } = self;
        let action_env = env.clone();
        modal.set_primary_action(move || {
            let (api, course_id, env) = (api.clone(), Rc::clone(&course_id), action_env.clone());
            let (ids, emails) = (Rc::clone(&ids), Rc::clone(&emails));
            let moodle_usernames = Rc::clone(&moodle_usernames);
            async move {
                match api
                    .remove_students(&course_id, &ids, &emails, &moodle_usernames)
                    .await
                {
                    Ok(()) => {
                        let noun = if count == 1 { "student" } else { "students" };
                        show_message_or_log(
                            &env,
                            MessageKind::Success,
                            &format!("Removed {count} {noun}"),
                        );
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "Removing students failed");
                        false
                    }
                }
            }
        });

        if modal.open_with_close(&env).await {
            ActionResult::removed()
        } else {
            ActionResult::Unmodified
        }
    }
}

/// Moves a student to the next group of the course.
#[derive(Clone)]
struct GroupChanger {
    api: EmsClient,
    course_id: Rc<str>,
    groups: Rc<[Group]>,
}

impl GroupChanger {
    async fn change(self, mut item: Item<StudentProps>) -> ActionResult<StudentProps> {
        let next = next_group(&self.groups, &item.props.groups);
        let group_ids: Vec<String> = next.iter().map(|g| g.id.clone()).collect();
        let (ids, emails) = match &item.props.username {
            Some(username) => (vec![username.clone()], Vec::new()),
            None => (Vec::new(), vec![item.props.email.clone()]),
        };

        if let Err(e) = self
            .api
            .set_student_groups(&self.course_id, &ids, &emails, &group_ids)
            .await
        {
            warn!(error = %e, "Changing groups failed");
            return ActionResult::Unmodified;
        }

        debug!(title = %item.title, group = ?next.map(|g| &g.name), "Changed groups");
        item.props.groups = next.iter().map(|g| g.name.clone()).collect();
        if let Some(attr) = item.top_attr.as_mut() {
            attr.items.clone_from(&item.props.groups);
        }
        ActionResult::Modified(vec![item])
    }
}

/// The students of a course, with removal and group changes when the list
/// is editable.
pub struct StudentsListComp {
    slot: Slot,
    course_id: Rc<str>,
    students: Vec<StudentProps>,
    groups: Rc<[Group]>,
    editable: bool,
    api: EmsClient,
    coll: Option<EzColl<StudentProps>>,
    modal: Option<ConfirmationModal>,
}

impl StudentsListComp {
    /// Creates the list as a child of `parent`.
    pub fn new(
        parent: &Slot,
        env: &Env,
        course_id: &str,
        participants: &Participants,
        editable: bool,
        api: EmsClient,
    ) -> Self {
        Self {
            slot: Slot::child(parent, env),
            course_id: course_id.into(),
            students: StudentProps::from_participants(participants),
            groups: course_groups(participants).into(),
            editable,
            api,
            coll: None,
            modal: None,
        }
    }

    /// The collection, once created.
    pub const fn coll(&self) -> Option<&EzColl<StudentProps>> {
        self.coll.as_ref()
    }

    /// The removal dialog, once created.
    pub fn modal(&self) -> Option<ModalHandle> {
        self.modal.as_ref().map(ConfirmationModal::handle)
    }

    fn item(
        &self,
        props: StudentProps,
        remover: &Remover,
        changer: &GroupChanger,
    ) -> Item<StudentProps> {
        let has_groups = !self.groups.is_empty();
        let moodle_pending = !props.is_active && props.moodle_username.is_some();
        // Moodle-pending accesses carry no editable groups
        let groups_editable = self.editable && has_groups && !moodle_pending;

        let mut item = Item::new(props.clone(), props.title());
        item.type_icon = if props.is_active { "user" } else { "pending" }.to_string();
        item.title_status = if props.is_active {
            TitleStatus::Normal
        } else {
            TitleStatus::Inactive
        };
        item.top_attr = has_groups.then(|| ListAttr {
            key: "Groups".to_string(),
            items: props.groups.clone(),
            icon: "groups".to_string(),
            on_click: groups_editable.then_some(GROUPS_ACTION),
        });
        item.bottom_attrs.push(SimpleAttr {
            key: "Email".to_string(),
            value: props.email.clone(),
            icon: "email".to_string(),
        });
        if let Some(username) = &props.username {
            item.bottom_attrs.push(SimpleAttr {
                key: "Username".to_string(),
                value: username.clone(),
                icon: "user".to_string(),
            });
        }
        if let Some(moodle) = &props.moodle_username {
            item.bottom_attrs.push(SimpleAttr {
                key: "UT username".to_string(),
                value: moodle.clone(),
                icon: "ut-user".to_string(),
            });
        }
        item.is_selectable = self.editable;
        if self.editable {
            let remover = remover.clone();
            item.actions.push(Action::new(
                "remove-participant",
                "Remove from course",
                move |item| remover.clone().remove(vec![item]),
            ));
        }
        if groups_editable {
            let changer = changer.clone();
            item.actions.push(Action::new("groups", "Groups...", move |item| {
                changer.clone().change(item)
            }));
        }
        item
    }
}

#[async_trait(?Send)]
impl Component for StudentsListComp {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Component> {
        let mut children: Vec<&mut dyn Component> = Vec::new();
        if let Some(coll) = self.coll.as_mut() {
            children.push(coll);
        }
        if let Some(modal) = self.modal.as_mut() {
            children.push(modal);
        }
        children
    }

    async fn create(&mut self, env: &Env) -> Result<()> {
        let modal = ConfirmationModal::new(&self.slot, env, "Remove students", "Remove");
        let remover = Remover {
            api: self.api.clone(),
            course_id: Rc::clone(&self.course_id),
            modal: modal.handle(),
            env: env.clone(),
        };
        let changer = GroupChanger {
            api: self.api.clone(),
            course_id: Rc::clone(&self.course_id),
            groups: Rc::clone(&self.groups),
        };
        let has_groups = !self.groups.is_empty();

        let items = self
            .students
            .iter()
            .map(|p| self.item(p.clone(), &remover, &changer))
            .collect();

        let mut builder = EzColl::builder(Strings::new("student", "students")).items(items);
        if self.editable {
            let remover = remover.clone();
            builder = builder.mass_action(MassAction::new(
                "remove-participant",
                "Remove from course",
                move |items| remover.clone().remove(items),
            ));
        }
        builder = builder.filter_group(FilterGroup::new(
            "Status",
            vec![
                Filter::new("Active", |i: &Item<StudentProps>| i.props.is_active),
                Filter::new("Pending", |i: &Item<StudentProps>| !i.props.is_active),
            ],
        ));
        if has_groups {
            let filters = self
                .groups
                .iter()
                .map(|group| {
                    let name = group.name.clone();
                    Filter::new(group.name.clone(), move |i: &Item<StudentProps>| {
                        i.props.groups.contains(&name)
                    })
                })
                .collect();
            builder = builder
                .filter_group(FilterGroup::new("Group", filters))
                .sorter(Sorter::new("By group and name", by_group_and_name));
        }
        builder = builder.sorter(Sorter::new("By name", by_name));

        self.coll = Some(builder.build(&self.slot, env));
        self.modal = Some(modal);
        Ok(())
    }

    fn render(&self, env: &Env) -> Result<String> {
        let ids: Vec<&str> = self
            .coll
            .as_ref()
            .map(|c| c.slot().id())
            .into_iter()
            .chain(self.modal.as_ref().map(|m| m.slot().id()))
            .collect();
        env.render("t-c-slots", &values([("ids", ids.into())]))
    }

    fn render_loading(&self, env: &Env) -> Result<Option<String>> {
        env.render("t-c-loading", &values([("text", "Loading students...".into())]))
            .map(Some)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::cell::RefCell;

    use chrono::{TimeZone, Utc};
    use lahendus_spa::{
        create_and_build, Dom, Fetcher, MemoryDom, Method, Request, Response, Transport, ROOT_ID,
    };
    use serde_json::{json, Value};

    use super::*;
    use crate::api::{PendingMoodleStudent, PendingStudent, Student};
    use crate::session::{Role, Session};
    use crate::templates::Templates;

    #[derive(Default)]
    struct RecordingTransport {
        sent: RefCell<Vec<Request>>,
    }

    #[async_trait(?Send)]
    impl Transport for RecordingTransport {
        async fn send(&self, request: Request) -> std::result::Result<Response, String> {
            self.sent.borrow_mut().push(request);
            Ok(Response {
                status: 200,
                body: Value::Null,
            })
        }
    }

    fn group(name: &str) -> Group {
        Group {
            id: name.to_lowercase(),
            name: name.to_string(),
        }
    }

    fn participants() -> Participants {
        Participants {
            students: vec![
                Student {
                    id: "mari".to_string(),
                    email: "mari@example.com".to_string(),
                    given_name: "Mari".to_string(),
                    family_name: "Maasikas".to_string(),
                    groups: vec![group("B")],
                    moodle_username: None,
                },
                Student {
                    id: "jaan".to_string(),
                    email: "jaan@example.com".to_string(),
                    given_name: "Jaan".to_string(),
                    family_name: "Tamm".to_string(),
                    groups: vec![group("A")],
                    moodle_username: None,
                },
            ],
            students_pending: vec![PendingStudent {
                email: "uus@example.com".to_string(),
                valid_from: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                groups: vec![],
            }],
            ..Participants::default()
        }
    }

    async fn build(
        editable: bool,
    ) -> (Rc<MemoryDom>, Env, Rc<RecordingTransport>, StudentsListComp) {
        build_with(&participants(), editable).await
    }

    async fn build_with(
        participants: &Participants,
        editable: bool,
    ) -> (Rc<MemoryDom>, Env, Rc<RecordingTransport>, StudentsListComp) {
        let dom = Rc::new(MemoryDom::new());
        let env = Env::new(dom.clone(), Rc::new(Templates::new()));
        let transport = Rc::new(RecordingTransport::default());
        let api = EmsClient::new(
            Fetcher::new(transport.clone()),
            Session::new("ago", Role::Teacher),
        );
        let root = Slot::root(ROOT_ID);
        let mut list = StudentsListComp::new(&root, &env, "1", participants, editable, api);
        dom.set_inner_html(ROOT_ID, &format!(r#"<div id="{}"></div>"#, list.slot().id()))
            .unwrap();
        create_and_build(&mut list, &env).await.unwrap();
        (dom, env, transport, list)
    }

    #[tokio::test]
    async fn test_lists_active_then_pending_sorted_by_group() {
        let (dom, _env, _transport, list) = build(true).await;
        let coll = list.coll().unwrap();

        let titles: Vec<String> = coll
            .visible_items()
            .into_iter()
            .map(|(_, item)| item.title)
            .collect();
        assert_eq!(titles, ["(Invitation pending)", "Jaan Tamm", "Mari Maasikas"]);
        assert_eq!(coll.count_label(), "3 students");
        assert!(dom.document_html().contains("Remove from course"));
    }

    #[tokio::test]
    async fn test_remove_confirmed_in_modal() {
        let (dom, _env, transport, list) = build(true).await;
        let coll = list.coll().unwrap();
        let modal = list.modal().unwrap();
        let (mari, _) = coll
            .visible_items()
            .into_iter()
            .find(|(_, item)| item.title == "Mari Maasikas")
            .unwrap();

        let action = coll.action_id(mari, 0);
        let confirm = async {
            assert!(modal.is_open());
            dom.click(&modal.primary_id()).await.unwrap();
        };
        let (clicked, ()) = futures::join!(dom.click(&action), confirm);
        clicked.unwrap();

        assert_eq!(coll.total_count(), 2);
        assert!(!modal.is_open());
        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, "/courses/1/students");
        assert_eq!(
            sent[0].body,
            Some(json!({
                "active_students": [{ "id": "mari" }],
                "pending_students": [],
                "moodle_pending_students": [],
            }))
        );
    }

    #[tokio::test]
    async fn test_remove_moodle_pending_by_username() {
        let mut with_moodle = participants();
        with_moodle.students_moodle_pending.push(PendingMoodleStudent {
            ut_username: "peeter".to_string(),
            email: "peeter@example.com".to_string(),
            groups: vec![],
        });
        let (dom, _env, transport, list) = build_with(&with_moodle, true).await;
        let coll = list.coll().unwrap();
        let modal = list.modal().unwrap();
        let (peeter, item) = coll
            .visible_items()
            .into_iter()
            .find(|(_, item)| item.props.moodle_username.as_deref() == Some("peeter"))
            .unwrap();
        assert_eq!(item.actions.len(), 1);
        assert_eq!(item.top_attr.unwrap().on_click, None);

        let action = coll.action_id(peeter, 0);
        let confirm = async {
            dom.click(&modal.primary_id()).await.unwrap();
        };
        let (clicked, ()) = futures::join!(dom.click(&action), confirm);
        clicked.unwrap();

        assert_eq!(coll.total_count(), 3);
        let sent = transport.sent.borrow();
        assert_eq!(
            sent[0].body,
            Some(json!({
                "active_students": [],
                "pending_students": [],
                "moodle_pending_students": [{ "ut_username": "peeter" }],
            }))
        );
    }

    #[tokio::test]
    async fn test_group_click_moves_student_to_next_group() {
        let (dom, _env, transport, list) = build(true).await;
        let coll = list.coll().unwrap();
        let find = |name: &str| {
            coll.visible_items()
                .into_iter()
                .find(|(_, item)| item.props.username.as_deref() == Some(name))
                .unwrap()
        };
        let (jaan, _) = find("jaan");

        dom.click(&coll.top_attr_id(jaan)).await.unwrap();

        assert_eq!(find("jaan").1.props.groups, ["B"]);
        assert!(dom.inner_html(&coll.row_id(jaan)).unwrap().contains(">B<"));
        {
            let sent = transport.sent.borrow();
            assert_eq!(sent[0].method, Method::Put);
            assert_eq!(sent[0].path, "/courses/1/students/groups");
            assert_eq!(
                sent[0].body,
                Some(json!({
                    "active_students": [{ "id": "jaan" }],
                    "pending_students": [],
                    "groups": [{ "id": "b" }],
                }))
            );
        }

        // B is the last group, so the next step leaves no group
        let (mari, _) = find("mari");
        dom.click(&coll.action_id(mari, 1)).await.unwrap();
        assert!(find("mari").1.props.groups.is_empty());
        assert_eq!(
            transport.sent.borrow()[1].body.as_ref().unwrap()["groups"],
            json!([])
        );
        assert_eq!(coll.total_count(), 3);
    }

    #[test]
    fn test_next_group_cycles_through_course_groups() {
        let groups = vec![group("A"), group("B")];

        assert_eq!(next_group(&groups, &[]), Some(&groups[0]));
        assert_eq!(next_group(&groups, &["A".to_string()]), Some(&groups[1]));
        assert_eq!(next_group(&groups, &["A".to_string(), "B".to_string()]), None);
        assert_eq!(next_group(&groups, &["Z".to_string()]), None);
        assert_eq!(next_group(&[], &[]), None);
    }

    #[tokio::test]
    async fn test_remove_cancelled_keeps_students() {
        let (dom, _env, transport, list) = build(true).await;
        let coll = list.coll().unwrap();
        let modal = list.modal().unwrap();
        let key = coll.keys()[0];

        let action = coll.action_id(key, 0);
        let cancel = async {
            dom.click(&modal.secondary_id()).await.unwrap();
        };
        let (clicked, ()) = futures::join!(dom.click(&action), cancel);
        clicked.unwrap();

        assert_eq!(coll.total_count(), 3);
        assert!(transport.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_read_only_list_has_no_actions() {
        let (dom, _env, _transport, list) = build(false).await;
        let coll = list.coll().unwrap();

        assert!(coll.items().iter().all(|i| i.actions.is_empty() && !i.is_selectable));
        assert!(coll
            .items()
            .iter()
            .all(|i| i.top_attr.as_ref().is_some_and(|attr| attr.on_click.is_none())));
        assert!(!dom.document_html().contains("Remove from course"));
        assert!(!dom.document_html().contains("Groups..."));
    }
}
