//! Confirmation dialog.
//!
//! [`ConfirmationModal`] is a component painting a dialog that stays in the
//! document while closed. Callers drive it through a [`ModalHandle`]:
//! [`ModalHandle::open_with_close`] opens the dialog and resolves once the
//! user either confirms or dismisses it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use lahendus_spa::{async_trait, paint, single_click, values, Component, Env, Result, Slot};
use tracing::{debug, warn};

type PrimaryAction = Rc<dyn Fn() -> LocalBoxFuture<'static, bool>>;

struct ModalState {
    slot: Slot,
    title: String,
    primary_label: String,
    secondary_label: String,
    wait_label: String,
    text: RefCell<String>,
    primary_action: RefCell<Option<PrimaryAction>>,
    open: Cell<bool>,
    waiting: Cell<bool>,
    pending: RefCell<Option<oneshot::Sender<bool>>>,
}

impl ModalState {
    fn primary_id(&self) -> String {
        format!("{}-primary", self.slot.id())
    }

    fn secondary_id(&self) -> String {
        format!("{}-secondary", self.slot.id())
    }

    fn render(&self, env: &Env) -> Result<String> {
        env.render(
            "t-c-modal",
            &values([
                ("dialogId", format!("{}-dialog", self.slot.id()).into()),
                ("title", self.title.clone().into()),
                ("text", self.text.borrow().clone().into()),
                ("primaryId", self.primary_id().into()),
                ("primaryLabel", self.primary_label.clone().into()),
                ("secondaryId", self.secondary_id().into()),
                ("secondaryLabel", self.secondary_label.clone().into()),
                ("waitLabel", self.wait_label.clone().into()),
                ("open", self.open.get().into()),
                ("waiting", self.waiting.get().into()),
            ]),
        )
    }
}

fn refresh(state: &Rc<ModalState>, env: &Env) -> Result<()> {
    let html = state.render(env)?;
    paint(&state.slot, env, &html)?;
    wire(state, env)
}

fn wire(state: &Rc<ModalState>, env: &Env) -> Result<()> {
    let dom = env.dom();
    {
        let (state, env) = (Rc::clone(state), env.clone());
        dom.on_click(
            &state.primary_id(),
            single_click(move || {
                let (state, env) = (Rc::clone(&state), env.clone());
                async move { confirm(&state, &env).await }
            }),
        )?;
    }
    let (state, env) = (Rc::clone(state), env.clone());
    dom.on_click(
        &state.secondary_id(),
        single_click(move || {
            let (state, env) = (Rc::clone(&state), env.clone());
            async move { resolve(&state, &env, false) }
        }),
    )
}

async fn confirm(state: &Rc<ModalState>, env: &Env) {
    let action = state.primary_action.borrow().clone();
    state.waiting.set(true);
    if let Err(e) = refresh(state, env) {
        warn!(error = %e, "Failed to repaint modal");
    }
    let confirmed = match action {
        Some(action) => action().await,
        None => true,
    };
    state.waiting.set(false);
    if confirmed {
        resolve(state, env, true);
    } else {
        debug!(modal = %state.slot.id(), "Primary action declined, keeping modal open");
        if let Err(e) = refresh(state, env) {
            warn!(error = %e, "Failed to repaint modal");
        }
    }
}

fn resolve(state: &Rc<ModalState>, env: &Env, result: bool) {
    state.open.set(false);
    if let Err(e) = refresh(state, env) {
        warn!(error = %e, "Failed to repaint modal");
    }
    if let Some(sender) = state.pending.borrow_mut().take() {
        // The receiver may be gone if the opener stopped waiting
        let _ = sender.send(result);
    }
}

/// A dialog asking the user to confirm an action.
pub struct ConfirmationModal {
    state: Rc<ModalState>,
}

impl fmt::Debug for ConfirmationModal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationModal")
            .field("slot", &self.state.slot)
            .field("open", &self.state.open.get())
            .finish_non_exhaustive()
    }
}

impl ConfirmationModal {
    /// Creates a closed modal as a child of `parent`.
    pub fn new(
        parent: &Slot,
        env: &Env,
        title: impl Into<String>,
        primary_label: impl Into<String>,
    ) -> Self {
        Self {
            state: Rc::new(ModalState {
                slot: Slot::child(parent, env),
                title: title.into(),
                primary_label: primary_label.into(),
                secondary_label: "Cancel".to_string(),
                wait_label: "Working...".to_string(),
                text: RefCell::new(String::new()),
                primary_action: RefCell::new(None),
                open: Cell::new(false),
                waiting: Cell::new(false),
                pending: RefCell::new(None),
            }),
        }
    }

    /// A handle for opening the modal after it is built.
    pub fn handle(&self) -> ModalHandle {
        ModalHandle(Rc::clone(&self.state))
    }
}

#[async_trait(?Send)]
impl Component for ConfirmationModal {
    fn slot(&self) -> &Slot {
        &self.state.slot
    }

    fn render(&self, env: &Env) -> Result<String> {
        self.state.render(env)
    }

    fn post_render(&mut self, env: &Env) -> Result<()> {
        wire(&self.state, env)
    }
}

/// Cloneable control of a [`ConfirmationModal`].
#[derive(Clone)]
pub struct ModalHandle(Rc<ModalState>);

impl fmt::Debug for ModalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModalHandle").field(&self.0.slot.id()).finish()
    }
}

impl ModalHandle {
    /// Sets the question shown in the dialog.
    pub fn set_text(&self, text: impl Into<String>) {
        *self.0.text.borrow_mut() = text.into();
    }

    /// Sets the action run when the user confirms.
    ///
    /// The dialog closes only if the action returns `true`.
    pub fn set_primary_action<F, Fut>(&self, action: F)
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = bool> + 'static,
    {
        *self.0.primary_action.borrow_mut() = Some(Rc::new(move || action().boxed_local()));
    }

    /// Returns `true` while the dialog is open.
    pub fn is_open(&self) -> bool {
        self.0.open.get()
    }

    /// Id of the confirm button.
    pub fn primary_id(&self) -> String {
        self.0.primary_id()
    }

    /// Id of the cancel button.
    pub fn secondary_id(&self) -> String {
        self.0.secondary_id()
    }

    /// Opens the dialog and waits until it is closed.
    ///
    /// Resolves `true` if the user confirmed and the primary action
    /// succeeded, `false` if the dialog was dismissed, reopened or failed to
    /// paint.
    pub async fn open_with_close(&self, env: &Env) -> bool {
        let (tx, rx) = oneshot::channel();
        if let Some(previous) = self.0.pending.borrow_mut().replace(tx) {
            let _ = previous.send(false);
        }
        self.0.open.set(true);
        if let Err(e) = refresh(&self.0, env) {
            warn!(error = %e, "Failed to open modal");
            self.0.open.set(false);
            self.0.pending.borrow_mut().take();
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Closes the dialog as if dismissed.
    pub fn close(&self, env: &Env) {
        resolve(&self.0, env, false);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use lahendus_spa::{create_and_build, Dom, MemoryDom, ROOT_ID};

    use super::*;
    use crate::templates::Templates;

    async fn build() -> (Rc<MemoryDom>, Env, ModalHandle) {
        let dom = Rc::new(MemoryDom::new());
        let env = Env::new(dom.clone(), Rc::new(Templates::new()));
        let root = Slot::root(ROOT_ID);
        let mut modal = ConfirmationModal::new(&root, &env, "Remove students", "Remove");
        dom.set_inner_html(ROOT_ID, &format!(r#"<div id="{}"></div>"#, modal.slot().id()))
            .unwrap();
        create_and_build(&mut modal, &env).await.unwrap();
        let handle = modal.handle();
        (dom, env, handle)
    }

    #[tokio::test]
    async fn test_confirm_runs_action_and_resolves_true() {
        let (dom, env, modal) = build().await;
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        modal.set_text("Remove Mari from the course?");
        modal.set_primary_action(move || {
            let flag = Rc::clone(&flag);
            async move {
                flag.set(true);
                true
            }
        });

        let opened = modal.open_with_close(&env);
        futures::pin_mut!(opened);
        assert!(futures::poll!(opened.as_mut()).is_pending());
        assert!(modal.is_open());
        assert!(dom.document_html().contains("Remove Mari from the course?"));

        dom.click(&modal.primary_id()).await.unwrap();

        assert!(opened.await);
        assert!(ran.get());
        assert!(!modal.is_open());
    }

    #[tokio::test]
    async fn test_cancel_resolves_false() {
        let (dom, env, modal) = build().await;
        let opened = modal.open_with_close(&env);
        futures::pin_mut!(opened);
        assert!(futures::poll!(opened.as_mut()).is_pending());

        dom.click(&modal.secondary_id()).await.unwrap();

        assert!(!opened.await);
        assert!(!modal.is_open());
    }

    #[tokio::test]
    async fn test_declined_primary_action_keeps_modal_open() {
        let (dom, env, modal) = build().await;
        modal.set_primary_action(|| async { false });
        let opened = modal.open_with_close(&env);
        futures::pin_mut!(opened);
        assert!(futures::poll!(opened.as_mut()).is_pending());

        dom.click(&modal.primary_id()).await.unwrap();
        assert!(modal.is_open());
        assert!(futures::poll!(opened.as_mut()).is_pending());

        modal.close(&env);
        assert!(!opened.await);
    }

    #[tokio::test]
    async fn test_reopening_resolves_previous_wait() {
        let (_dom, env, modal) = build().await;
        let first = modal.open_with_close(&env);
        futures::pin_mut!(first);
        assert!(futures::poll!(first.as_mut()).is_pending());

        let second = modal.open_with_close(&env);
        futures::pin_mut!(second);
        assert!(futures::poll!(second.as_mut()).is_pending());

        assert!(!first.await);
        assert!(modal.is_open());
    }
}
