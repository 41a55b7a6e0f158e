//! Collection widget.
//!
//! [`EzColl`] shows a list of [`Item`]s that can be filtered, sorted,
//! selected and acted upon. Actions return an [`ActionResult`] which the
//! widget reconciles into its backing list before repainting.

mod comp;
mod state;

use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use lahendus_spa::SpaError;
use thiserror::Error;

pub use comp::{EzColl, EzCollBuilder};
pub use state::{Change, CollState};

/// Key identifying an item while it is in the backing list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey(pub(crate) u64);

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an item's title is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TitleStatus {
    /// Regular title.
    #[default]
    Normal,
    /// Greyed-out title, e.g. for pending participants.
    Inactive,
}

/// An attribute listing several values, shown above the bottom attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAttr {
    /// Attribute name.
    pub key: String,
    /// Listed values.
    pub items: Vec<String>,
    /// Icon name.
    pub icon: String,
    /// Index of the item action run when the attribute is clicked.
    pub on_click: Option<usize>,
}

/// A single key/value attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleAttr {
    /// Attribute name.
    pub key: String,
    /// Attribute value.
    pub value: String,
    /// Icon name.
    pub icon: String,
}

/// Result of an action.
pub enum ActionResult<P> {
    /// Nothing changed.
    Unmodified,
    /// The affected items are replaced by these items (possibly none).
    Modified(Vec<Item<P>>),
}

impl<P> ActionResult<P> {
    /// The affected items were removed.
    pub const fn removed() -> Self {
        Self::Modified(Vec::new())
    }
}

impl<P> fmt::Debug for ActionResult<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmodified => write!(f, "Unmodified"),
            Self::Modified(items) => write!(f, "Modified({} items)", items.len()),
        }
    }
}

type ItemActionFn<P> = Rc<dyn Fn(Item<P>) -> LocalBoxFuture<'static, ActionResult<P>>>;
type MassActionFn<P> = Rc<dyn Fn(Vec<Item<P>>) -> LocalBoxFuture<'static, ActionResult<P>>>;

/// An action on a single item.
pub struct Action<P> {
    /// Icon name.
    pub icon: String,
    /// Button label.
    pub label: String,
    handler: ItemActionFn<P>,
}

impl<P> Clone for Action<P> {
    fn clone(&self) -> Self {
        Self {
            icon: self.icon.clone(),
            label: self.label.clone(),
            handler: Rc::clone(&self.handler),
        }
    }
}

impl<P> fmt::Debug for Action<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("label", &self.label).finish()
    }
}

impl<P: 'static> Action<P> {
    /// Creates an action from an async closure.
    pub fn new<F, Fut>(icon: impl Into<String>, label: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Item<P>) -> Fut + 'static,
        Fut: Future<Output = ActionResult<P>> + 'static,
    {
        Self {
            icon: icon.into(),
            label: label.into(),
            handler: Rc::new(move |item| handler(item).boxed_local()),
        }
    }

    pub(crate) fn call(&self, item: Item<P>) -> LocalBoxFuture<'static, ActionResult<P>> {
        (self.handler)(item)
    }
}

/// An action on all selected items.
pub struct MassAction<P> {
    /// Icon name.
    pub icon: String,
    /// Button label.
    pub label: String,
    handler: MassActionFn<P>,
}

impl<P> Clone for MassAction<P> {
    fn clone(&self) -> Self {
        Self {
            icon: self.icon.clone(),
            label: self.label.clone(),
            handler: Rc::clone(&self.handler),
        }
    }
}

impl<P> fmt::Debug for MassAction<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MassAction").field("label", &self.label).finish()
    }
}

impl<P: 'static> MassAction<P> {
    /// Creates a mass action from an async closure.
    pub fn new<F, Fut>(icon: impl Into<String>, label: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Item<P>>) -> Fut + 'static,
        Fut: Future<Output = ActionResult<P>> + 'static,
    {
        Self {
            icon: icon.into(),
            label: label.into(),
            handler: Rc::new(move |items| handler(items).boxed_local()),
        }
    }

    pub(crate) fn call(&self, items: Vec<Item<P>>) -> LocalBoxFuture<'static, ActionResult<P>> {
        (self.handler)(items)
    }
}

/// A collection item.
pub struct Item<P> {
    /// The wrapped data.
    pub props: P,
    /// Icon naming the item's type.
    pub type_icon: String,
    /// Display title.
    pub title: String,
    /// How the title is shown.
    pub title_status: TitleStatus,
    /// Link target of the title.
    pub title_link: Option<String>,
    /// Optional list attribute, e.g. group memberships.
    pub top_attr: Option<ListAttr>,
    /// Simple attributes shown under the title.
    pub bottom_attrs: Vec<SimpleAttr>,
    /// Whether the item can be selected for mass actions.
    pub is_selectable: bool,
    /// Single-item actions.
    pub actions: Vec<Action<P>>,
}

impl<P: Clone> Clone for Item<P> {
    fn clone(&self) -> Self {
        Self {
            props: self.props.clone(),
            type_icon: self.type_icon.clone(),
            title: self.title.clone(),
            title_status: self.title_status,
            title_link: self.title_link.clone(),
            top_attr: self.top_attr.clone(),
            bottom_attrs: self.bottom_attrs.clone(),
            is_selectable: self.is_selectable,
            actions: self.actions.clone(),
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for Item<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("title", &self.title)
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

impl<P> Item<P> {
    /// Creates a selectable item with no attributes or actions.
    pub fn new(props: P, title: impl Into<String>) -> Self {
        Self {
            props,
            type_icon: String::new(),
            title: title.into(),
            title_status: TitleStatus::Normal,
            title_link: None,
            top_attr: None,
            bottom_attrs: Vec::new(),
            is_selectable: true,
            actions: Vec::new(),
        }
    }
}

/// A filter over items.
pub struct Filter<P> {
    /// Toggle label.
    pub label: String,
    predicate: Rc<dyn Fn(&Item<P>) -> bool>,
}

impl<P> Filter<P> {
    /// Creates a filter.
    pub fn new(label: impl Into<String>, predicate: impl Fn(&Item<P>) -> bool + 'static) -> Self {
        Self {
            label: label.into(),
            predicate: Rc::new(predicate),
        }
    }

    /// Returns `true` if the item passes.
    pub fn accepts(&self, item: &Item<P>) -> bool {
        (self.predicate)(item)
    }
}

impl<P> fmt::Debug for Filter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter").field("label", &self.label).finish()
    }
}

/// A named group of filters.
#[derive(Debug)]
pub struct FilterGroup<P> {
    /// Group label.
    pub label: String,
    /// Filters in the group.
    pub filters: Vec<Filter<P>>,
}

impl<P> FilterGroup<P> {
    /// Creates a filter group.
    pub fn new(label: impl Into<String>, filters: Vec<Filter<P>>) -> Self {
        Self {
            label: label.into(),
            filters,
        }
    }
}

/// A named order over items.
pub struct Sorter<P> {
    /// Sorter label.
    pub label: String,
    compare: Rc<dyn Fn(&Item<P>, &Item<P>) -> Ordering>,
}

impl<P> Sorter<P> {
    /// Creates a sorter from a comparator.
    pub fn new(
        label: impl Into<String>,
        compare: impl Fn(&Item<P>, &Item<P>) -> Ordering + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            compare: Rc::new(compare),
        }
    }

    /// Compares two items.
    pub fn compare(&self, a: &Item<P>, b: &Item<P>) -> Ordering {
        (self.compare)(a, b)
    }
}

impl<P> fmt::Debug for Sorter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sorter").field("label", &self.label).finish()
    }
}

/// Nouns used in the item count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strings {
    /// Noun for one item.
    pub singular: String,
    /// Noun for any other count.
    pub plural: String,
}

impl Strings {
    /// Creates the count nouns.
    pub fn new(singular: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            singular: singular.into(),
            plural: plural.into(),
        }
    }

    /// The noun matching `count`.
    pub fn noun(&self, count: usize) -> &str {
        if count == 1 {
            &self.singular
        } else {
            &self.plural
        }
    }
}

/// Result type for collection operations.
pub type CollResult<T> = std::result::Result<T, CollError>;

/// Errors from collection operations.
#[derive(Debug, Error)]
pub enum CollError {
    /// An action is already running on this collection.
    #[error("Another action is already in progress")]
    ActionInProgress,

    /// No item with this key.
    #[error("No item with key {0}")]
    UnknownItem(ItemKey),

    /// The item is not currently visible.
    #[error("Item {0} is not visible")]
    NotVisible(ItemKey),

    /// The item cannot be selected.
    #[error("Item {0} is not selectable")]
    NotSelectable(ItemKey),

    /// The item has no action at this index.
    #[error("Item {key} has no action {index}")]
    UnknownAction {
        /// Item key.
        key: ItemKey,
        /// Action index.
        index: usize,
    },

    /// No mass action at this index.
    #[error("No mass action {0}")]
    UnknownMassAction(usize),

    /// Mass actions need a selection.
    #[error("No items are selected")]
    EmptySelection,

    /// No filter at this position.
    #[error("No filter {filter} in group {group}")]
    UnknownFilter {
        /// Group index.
        group: usize,
        /// Filter index within the group.
        filter: usize,
    },

    /// No sorter at this index.
    #[error("No sorter {0}")]
    UnknownSorter(usize),

    /// Repainting failed.
    #[error(transparent)]
    Spa(#[from] SpaError),
}
