//! Component identity and upward state notification.
//!
//! A [`Slot`] names the element a component paints into and links the
//! component to its parent. The link is weak: parents own their children,
//! children only point back up to forward state-change notifications.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::env::Env;

/// Callback invoked when a component's state changes.
pub type StateCallback = Rc<dyn Fn()>;

struct SlotInner {
    id: String,
    parent: Option<Weak<SlotInner>>,
    on_state_changed: RefCell<Option<StateCallback>>,
    built: Cell<bool>,
}

/// The destination slot and tree position of a component.
#[derive(Clone)]
pub struct Slot(Rc<SlotInner>);

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.0.id)
            .field("built", &self.0.built.get())
            .finish_non_exhaustive()
    }
}

impl Slot {
    /// Creates the slot of a root component painting into `id`.
    pub fn root(id: impl Into<String>) -> Self {
        Self::new(id.into(), None)
    }

    /// Creates the slot of a root component with an explicit state-change
    /// callback.
    pub fn root_with(id: impl Into<String>, on_state_changed: StateCallback) -> Self {
        let slot = Self::root(id);
        slot.set_on_state_changed(on_state_changed);
        slot
    }

    /// Creates a child slot with a freshly generated id.
    pub fn child(parent: &Self, env: &Env) -> Self {
        Self::child_with_id(parent, env.next_id())
    }

    /// Creates a child slot painting into a known id.
    pub fn child_with_id(parent: &Self, id: impl Into<String>) -> Self {
        Self::new(id.into(), Some(Rc::downgrade(&parent.0)))
    }

    fn new(id: String, parent: Option<Weak<SlotInner>>) -> Self {
        Self(Rc::new(SlotInner {
            id,
            parent,
            on_state_changed: RefCell::new(None),
            built: Cell::new(false),
        }))
    }

    /// Id of the element this component paints into.
    pub fn id(&self) -> &str {
        &self.0.id
    }

    /// Replaces the default bubbling behaviour with an explicit callback.
    pub fn set_on_state_changed(&self, callback: StateCallback) {
        *self.0.on_state_changed.borrow_mut() = Some(callback);
    }

    /// Reports that the component's state changed.
    ///
    /// Runs this slot's own callback if one is set, otherwise forwards to the
    /// parent. A root without a callback drops the notification.
    pub fn notify_state_changed(&self) {
        notify(&self.0);
    }

    /// Slot ids from the root down to this slot.
    pub fn ancestry(&self) -> Vec<String> {
        let mut chain = vec![self.0.id.clone()];
        let mut current = self.0.parent.as_ref().and_then(Weak::upgrade);
        while let Some(inner) = current {
            chain.push(inner.id.clone());
            current = inner.parent.as_ref().and_then(Weak::upgrade);
        }
        chain.reverse();
        chain
    }

    /// Returns `true` once the component and all its descendants have been
    /// built successfully.
    pub fn is_built(&self) -> bool {
        self.0.built.get()
    }

    pub(crate) fn set_built(&self, built: bool) {
        self.0.built.set(built);
    }
}

fn notify(inner: &SlotInner) {
    let own = inner.on_state_changed.borrow().clone();
    if let Some(callback) = own {
        callback();
        return;
    }
    match inner.parent.as_ref().and_then(Weak::upgrade) {
        Some(parent) => notify(&parent),
        None => debug!(id = %inner.id, "State change reached root without a handler"),
    }
}
