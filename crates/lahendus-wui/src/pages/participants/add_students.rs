use lahendus_spa::{async_trait, single_click, values, Component, Env, Result, Slot};
use tracing::{debug, info, warn};

use crate::api::EmsClient;
use crate::form::{FieldHandle, StringConstraints, StringField};
use crate::notify::{show_message_or_log, MessageKind};

const HELP: &str = "Enter student email addresses on separate lines or separated by spaces. \
     Students who have not registered yet get access when they register.";

/// Email field and button for giving students access to a course.
///
/// A successful add notifies the parent of a state change so the page is
/// rebuilt with the new participants.
pub struct AddStudentsComp {
    slot: Slot,
    course_id: String,
    api: EmsClient,
    button_id: String,
    field: Option<StringField>,
}

impl AddStudentsComp {
    /// Creates the component as a child of `parent`.
    pub fn new(parent: &Slot, env: &Env, course_id: String, api: EmsClient) -> Self {
        let slot = Slot::child(parent, env);
        Self {
            button_id: format!("{}-add", slot.id()),
            slot,
            course_id,
            api,
            field: None,
        }
    }

    /// Id of the add button.
    pub fn button_id(&self) -> &str {
        &self.button_id
    }

    /// Id of the email input, once created.
    pub fn input_id(&self) -> Option<&str> {
        self.field.as_ref().map(StringField::input_id)
    }
}

async fn add_students(env: Env, slot: Slot, field: FieldHandle, api: EmsClient, course_id: String) {
    match field.validate(&env) {
        Ok(true) => {}
        Ok(false) => {
            debug!("Not adding students, emails are invalid");
            return;
        }
        Err(e) => {
            warn!(error = %e, "Failed to validate emails");
            return;
        }
    }
    let emails: Vec<String> = match field.value(&env) {
        Ok(value) => value.split_whitespace().map(str::to_string).collect(),
        Err(e) => {
            warn!(error = %e, "Failed to read emails");
            return;
        }
    };

    info!(%course_id, count = emails.len(), "Adding students");
    match api.add_students(&course_id, &emails).await {
        Ok(result) => {
            let added = result.accesses_added + result.pending_accesses_added_updated;
            let noun = if added == 1 { "student" } else { "students" };
            show_message_or_log(&env, MessageKind::Success, &format!("Added {added} {noun}"));
            slot.notify_state_changed();
        }
        Err(e) => warn!(error = %e, "Adding students failed"),
    }
}

#[async_trait(?Send)]
impl Component for AddStudentsComp {
    fn slot(&self) -> &Slot {
        &self.slot
    }

    fn children_mut(&mut self) -> Vec<&mut dyn Component> {
        self.field
            .as_mut()
            .map(|f| f as &mut dyn Component)
            .into_iter()
            .collect()
    }

    async fn create(&mut self, env: &Env) -> Result<()> {
        self.field = Some(
            StringField::builder("Student emails")
                .required(true)
                .paint_required_on_input(false)
                .constraint(StringConstraints::EmailList)
                .build(&self.slot, env),
        );
        Ok(())
    }

    fn render(&self, env: &Env) -> Result<String> {
        let field_id = self
            .field
            .as_ref()
            .map_or_else(String::new, |f| f.slot().id().to_string());
        env.render(
            "t-c-add-students",
            &values([
                ("help", HELP.into()),
                ("fieldId", field_id.into()),
                ("buttonId", self.button_id.clone().into()),
                ("buttonLabel", "Add".into()),
            ]),
        )
    }

    fn post_render(&mut self, env: &Env) -> Result<()> {
        let Some(field) = self.field.as_ref().map(StringField::handle) else {
            return Ok(());
        };
        let (handler_env, slot, api, course_id) = (
            env.clone(),
            self.slot.clone(),
            self.api.clone(),
            self.course_id.clone(),
        );
        env.dom().on_click(
            &self.button_id,
            single_click(move || {
                add_students(
                    handler_env.clone(),
                    slot.clone(),
                    field.clone(),
                    api.clone(),
                    course_id.clone(),
                )
            }),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use lahendus_spa::{
        create_and_build, Dom, Fetcher, MemoryDom, Request, Response, Transport, ROOT_ID,
    };
    use serde_json::json;

    use super::*;
    use crate::session::{Role, Session};
    use crate::templates::Templates;

    #[derive(Default)]
    struct AddTransport {
        sent: RefCell<Vec<Request>>,
    }

    #[async_trait(?Send)]
    impl Transport for AddTransport {
        async fn send(&self, request: Request) -> std::result::Result<Response, String> {
            self.sent.borrow_mut().push(request);
            Ok(Response {
                status: 200,
                body: json!({ "accesses_added": 1, "pending_accesses_added_updated": 1 }),
            })
        }
    }

    struct Built {
        dom: Rc<MemoryDom>,
        transport: Rc<AddTransport>,
        changes: Rc<Cell<usize>>,
        comp: AddStudentsComp,
        _root: Slot,
    }

    async fn build() -> Built {
        let dom = Rc::new(MemoryDom::new());
        let env = Env::new(dom.clone(), Rc::new(Templates::new()));
        let transport = Rc::new(AddTransport::default());
        let api = EmsClient::new(
            Fetcher::new(transport.clone()),
            Session::new("ago", Role::Teacher),
        );
        let changes = Rc::new(Cell::new(0));
        let counter = Rc::clone(&changes);
        let root = Slot::root_with(ROOT_ID, Rc::new(move || counter.set(counter.get() + 1)));
        let mut comp = AddStudentsComp::new(&root, &env, "1".to_string(), api);
        dom.set_inner_html(ROOT_ID, &format!(r#"<div id="{}"></div>"#, comp.slot().id()))
            .unwrap();
        create_and_build(&mut comp, &env).await.unwrap();
        Built {
            dom,
            transport,
            changes,
            comp,
            _root: root,
        }
    }

    #[tokio::test]
    async fn test_valid_emails_are_posted_and_parent_notified() {
        let Built {
            dom,
            transport,
            changes,
            comp,
            _root,
        } = build().await;
        let input = comp.input_id().unwrap().to_string();

        dom.input(&input, "mari@example.com \n uus@example.com").unwrap();
        dom.click(comp.button_id()).await.unwrap();

        let sent = transport.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].body,
            Some(json!({ "students": [
                { "email": "mari@example.com", "groups": [] },
                { "email": "uus@example.com", "groups": [] },
            ]}))
        );
        assert_eq!(changes.get(), 1);
    }

    #[tokio::test]
    async fn test_invalid_emails_are_not_posted() {
        let Built {
            dom,
            transport,
            changes,
            comp,
            _root,
        } = build().await;
        let input = comp.input_id().unwrap().to_string();

        dom.input(&input, "mari@example.com nope").unwrap();
        dom.click(comp.button_id()).await.unwrap();

        assert!(transport.sent.borrow().is_empty());
        assert_eq!(changes.get(), 0);
        assert!(dom.document_html().contains("helper-text error"));
    }
}
