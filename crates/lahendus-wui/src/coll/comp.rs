use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use lahendus_spa::{async_trait, click_handler, paint, values, Component, Env, Result, Slot};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{
    Change, CollError, CollResult, CollState, FilterGroup, Item, ItemKey, MassAction, Sorter,
    Strings, TitleStatus,
};

/// Builder for [`EzColl`].
pub struct EzCollBuilder<P> {
    strings: Strings,
    items: Vec<Item<P>>,
    mass_actions: Vec<MassAction<P>>,
    filter_groups: Vec<FilterGroup<P>>,
    sorters: Vec<Sorter<P>>,
}

impl<P> fmt::Debug for EzCollBuilder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EzCollBuilder")
            .field("strings", &self.strings)
            .field("items", &self.items.len())
            .finish_non_exhaustive()
    }
}

impl<P: Clone + 'static> EzCollBuilder<P> {
    /// Sets the initial items.
    #[must_use]
    pub fn items(mut self, items: Vec<Item<P>>) -> Self {
        self.items = items;
        self
    }

    /// Adds a mass action.
    #[must_use]
    pub fn mass_action(mut self, action: MassAction<P>) -> Self {
        self.mass_actions.push(action);
        self
    }

    /// Adds a filter group.
    #[must_use]
    pub fn filter_group(mut self, group: FilterGroup<P>) -> Self {
        self.filter_groups.push(group);
        self
    }

    /// Adds a sorter. The first sorter added is the default.
    #[must_use]
    pub fn sorter(mut self, sorter: Sorter<P>) -> Self {
        self.sorters.push(sorter);
        self
    }

    /// Creates the collection as a child of `parent`.
    pub fn build(self, parent: &Slot, env: &Env) -> EzColl<P> {
        let slot = Slot::child(parent, env);
        EzColl {
            inner: Rc::new(CollInner {
                id: slot.id().to_string(),
                slot,
                state: RefCell::new(CollState::new(
                    self.items,
                    self.filter_groups,
                    self.sorters,
                )),
                mass_actions: self.mass_actions,
                strings: self.strings,
                busy: Cell::new(false),
            }),
        }
    }
}

struct CollInner<P> {
    id: String,
    slot: Slot,
    state: RefCell<CollState<P>>,
    mass_actions: Vec<MassAction<P>>,
    strings: Strings,
    busy: Cell<bool>,
}

/// Clears the busy flag when an action finishes or is dropped.
struct BusyGuard<'a>(&'a Cell<bool>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<P: Clone + 'static> CollInner<P> {
    fn begin_action(&self) -> CollResult<BusyGuard<'_>> {
        if self.busy.replace(true) {
            return Err(CollError::ActionInProgress);
        }
        Ok(BusyGuard(&self.busy))
    }

    fn row_id(&self, key: ItemKey) -> String {
        format!("{}-item-{key}", self.id)
    }

    fn toolbar_id(&self) -> String {
        format!("{}-toolbar", self.id)
    }

    fn select_id(&self, key: ItemKey) -> String {
        format!("{}-select-{key}", self.id)
    }

    fn action_id(&self, key: ItemKey, index: usize) -> String {
        format!("{}-action-{key}-{index}", self.id)
    }

    fn top_attr_id(&self, key: ItemKey) -> String {
        format!("{}-attr-{key}", self.id)
    }

    fn count_label(&self) -> String {
        let state = self.state.borrow();
        let total = state.total_count();
        let noun = self.strings.noun(total);
        if state.is_filtered() {
            format!("{} / {total} {noun}", state.visible_count())
        } else {
            format!("{total} {noun}")
        }
    }

    fn render_row(&self, env: &Env, key: ItemKey, item: &Item<P>, selected: bool) -> Result<String> {
        let actions: Vec<Value> = item
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| json!({ "id": self.action_id(key, i), "label": a.label, "icon": a.icon }))
            .collect();
        let top_attr = item.top_attr.as_ref().map_or(Value::Null, |attr| {
            let click_id = attr.on_click.map(|_| self.top_attr_id(key));
            json!({ "key": attr.key, "items": attr.items, "icon": attr.icon, "clickId": click_id })
        });
        let bottom_attrs: Vec<Value> = item
            .bottom_attrs
            .iter()
            .map(|attr| json!({ "key": attr.key, "value": attr.value, "icon": attr.icon }))
            .collect();
        env.render(
            "t-c-coll-item",
            &json!({
                "selectId": self.select_id(key),
                "selectable": item.is_selectable,
                "selected": selected,
                "typeIcon": item.type_icon,
                "title": item.title,
                "titleLink": item.title_link,
                "inactive": item.title_status == TitleStatus::Inactive,
                "topAttr": top_attr,
                "bottomAttrs": bottom_attrs,
                "actions": actions,
            }),
        )
    }

    fn render_toolbar(&self, env: &Env) -> Result<String> {
        let state = self.state.borrow();
        let filter_groups: Vec<Value> = state
            .filter_groups()
            .iter()
            .enumerate()
            .map(|(g, group)| {
                let filters: Vec<Value> = group
                    .filters
                    .iter()
                    .enumerate()
                    .map(|(f, filter)| {
                        json!({
                            "id": format!("{}-filter-{g}-{f}", self.id),
                            "label": filter.label,
                            "active": state.is_filter_active(g, f),
                        })
                    })
                    .collect();
                json!({ "label": group.label, "filters": filters })
            })
            .collect();
        let sorters: Vec<Value> = state
            .sorters()
            .iter()
            .enumerate()
            .map(|(i, sorter)| {
                json!({
                    "id": format!("{}-sorter-{i}", self.id),
                    "label": sorter.label,
                    "active": state.active_sorter() == Some(i),
                })
            })
            .collect();
        let mass_actions: Vec<Value> = self
            .mass_actions
            .iter()
            .enumerate()
            .map(|(i, a)| json!({ "id": format!("{}-mass-{i}", self.id), "label": a.label, "icon": a.icon }))
            .collect();
        let selected_count = state.selected_keys().len();
        let all_selected = state.all_visible_selected();
        drop(state);

        env.render(
            "t-c-coll-toolbar",
            &json!({
                "selectAllId": format!("{}-select-all", self.id),
                "allSelected": all_selected,
                "countLabel": self.count_label(),
                "selectedCount": selected_count,
                "massActions": mass_actions,
                "filterGroups": filter_groups,
                "sorters": sorters,
            }),
        )
    }

    fn render_all(&self, env: &Env) -> Result<String> {
        let toolbar = self.render_toolbar(env)?;
        let state = self.state.borrow();
        let rows = state
            .visible()
            .into_iter()
            .map(|(key, item)| {
                let html = self.render_row(env, key, item, state.is_selected(key))?;
                Ok(json!({ "id": self.row_id(key), "html": html }))
            })
            .collect::<Result<Vec<Value>>>()?;
        env.render(
            "t-c-coll",
            &values([
                ("id", self.id.clone().into()),
                ("toolbarId", self.toolbar_id().into()),
                ("toolbarHtml", toolbar.into()),
                ("rows", rows.into()),
            ]),
        )
    }
}

/// Wiring and reconciliation; needs an owned handle for the listeners.
fn wire_toolbar<P: Clone + 'static>(inner: &Rc<CollInner<P>>, env: &Env) -> Result<()> {
    let dom = env.dom();
    {
        let (inner, env) = (Rc::clone(inner), env.clone());
        dom.on_click(
            &format!("{}-select-all", inner.id),
            click_handler(move || {
                let (inner, env) = (Rc::clone(&inner), env.clone());
                async move {
                    let select = !inner.state.borrow().all_visible_selected();
                    log_failure(select_all_visible(&inner, &env, select));
                }
            }),
        )?;
    }
    for index in 0..inner.mass_actions.len() {
        let (inner, env) = (Rc::clone(inner), env.clone());
        dom.on_click(
            &format!("{}-mass-{index}", inner.id),
            click_handler(move || {
                let (inner, env) = (Rc::clone(&inner), env.clone());
                async move { log_failure(invoke_mass_action(&inner, &env, index).await) }
            }),
        )?;
    }
    let groups: Vec<usize> = inner
        .state
        .borrow()
        .filter_groups()
        .iter()
        .map(|g| g.filters.len())
        .collect();
    for (group, count) in groups.into_iter().enumerate() {
        for filter in 0..count {
            let (inner, env) = (Rc::clone(inner), env.clone());
            dom.on_click(
                &format!("{}-filter-{group}-{filter}", inner.id),
                click_handler(move || {
                    let (inner, env) = (Rc::clone(&inner), env.clone());
                    async move {
                        let active = !inner.state.borrow().is_filter_active(group, filter);
                        log_failure(set_filter(&inner, &env, group, filter, active));
                    }
                }),
            )?;
        }
    }
    let sorter_count = inner.state.borrow().sorters().len();
    for index in 0..sorter_count {
        let (inner, env) = (Rc::clone(inner), env.clone());
        dom.on_click(
            &format!("{}-sorter-{index}", inner.id),
            click_handler(move || {
                let (inner, env) = (Rc::clone(&inner), env.clone());
                async move { log_failure(set_sorter(&inner, &env, index)) }
            }),
        )?;
    }
    Ok(())
}

fn wire_row<P: Clone + 'static>(inner: &Rc<CollInner<P>>, env: &Env, key: ItemKey) -> Result<()> {
    let (selectable, action_count, attr_action) = match inner.state.borrow().get(key) {
        Some(item) => (
            item.is_selectable,
            item.actions.len(),
            item.top_attr.as_ref().and_then(|attr| attr.on_click),
        ),
        None => return Ok(()),
    };
    let dom = env.dom();
    if selectable {
        let (inner, env) = (Rc::clone(inner), env.clone());
        dom.on_click(
            &inner.select_id(key),
            click_handler(move || {
                let (inner, env) = (Rc::clone(&inner), env.clone());
                async move {
                    let selected = !inner.state.borrow().is_selected(key);
                    log_failure(select(&inner, &env, key, selected));
                }
            }),
        )?;
    }
    for index in 0..action_count {
        let (inner, env) = (Rc::clone(inner), env.clone());
        dom.on_click(
            &inner.action_id(key, index),
            click_handler(move || {
                let (inner, env) = (Rc::clone(&inner), env.clone());
                async move { log_failure(invoke_item_action(&inner, &env, key, index).await) }
            }),
        )?;
    }
    if let Some(index) = attr_action {
        let (inner, env) = (Rc::clone(inner), env.clone());
        dom.on_click(
            &inner.top_attr_id(key),
            click_handler(move || {
                let (inner, env) = (Rc::clone(&inner), env.clone());
                async move { log_failure(invoke_item_action(&inner, &env, key, index).await) }
            }),
        )?;
    }
    Ok(())
}

fn wire_all<P: Clone + 'static>(inner: &Rc<CollInner<P>>, env: &Env) -> Result<()> {
    wire_toolbar(inner, env)?;
    let keys = inner.state.borrow().visible_keys();
    for key in keys {
        wire_row(inner, env, key)?;
    }
    Ok(())
}

fn repaint<P: Clone + 'static>(inner: &Rc<CollInner<P>>, env: &Env, change: Change) -> Result<()> {
    match change {
        Change::None => Ok(()),
        Change::Row(key) => {
            let html = {
                let state = inner.state.borrow();
                match state.get(key) {
                    Some(item) => inner.render_row(env, key, item, state.is_selected(key))?,
                    None => return repaint(inner, env, Change::All),
                }
            };
            debug!(coll = %inner.id, %key, "Repainting row");
            env.dom().set_inner_html(&inner.row_id(key), &html)?;
            wire_row(inner, env, key)?;
            let toolbar = inner.render_toolbar(env)?;
            env.dom().set_inner_html(&inner.toolbar_id(), &toolbar)?;
            wire_toolbar(inner, env)
        }
        Change::All => {
            debug!(coll = %inner.id, "Repainting collection");
            let html = inner.render_all(env)?;
            paint(&inner.slot, env, &html)?;
            wire_all(inner, env)
        }
    }
}

fn log_failure(result: CollResult<()>) {
    match result {
        Ok(()) => {}
        Err(CollError::ActionInProgress) => debug!("Ignoring action while another is in progress"),
        Err(e) => warn!(error = %e, "Collection operation failed"),
    }
}

async fn invoke_item_action<P: Clone + 'static>(
    inner: &Rc<CollInner<P>>,
    env: &Env,
    key: ItemKey,
    index: usize,
) -> CollResult<()> {
    let _guard = inner.begin_action()?;
    let (item, action) = {
        let state = inner.state.borrow();
        let item = state.get(key).ok_or(CollError::UnknownItem(key))?;
        let action = item
            .actions
            .get(index)
            .cloned()
            .ok_or(CollError::UnknownAction { key, index })?;
        (item.clone(), action)
    };
    debug!(coll = %inner.id, %key, action = %action.label, "Invoking item action");
    let result = action.call(item).await;
    let change = inner.state.borrow_mut().apply_item_result(key, result)?;
    repaint(inner, env, change)?;
    Ok(())
}

async fn invoke_mass_action<P: Clone + 'static>(
    inner: &Rc<CollInner<P>>,
    env: &Env,
    index: usize,
) -> CollResult<()> {
    let action = inner
        .mass_actions
        .get(index)
        .cloned()
        .ok_or(CollError::UnknownMassAction(index))?;
    let keys = inner.state.borrow().selected_keys();
    if keys.is_empty() {
        return Err(CollError::EmptySelection);
    }
    let _guard = inner.begin_action()?;
    let items: Vec<Item<P>> = {
        let state = inner.state.borrow();
        keys.iter().filter_map(|key| state.get(*key).cloned()).collect()
    };
    debug!(coll = %inner.id, count = items.len(), action = %action.label, "Invoking mass action");
    let result = action.call(items).await;
    let change = inner.state.borrow_mut().apply_mass_result(&keys, result)?;
    repaint(inner, env, change)?;
    Ok(())
}

fn set_filter<P: Clone + 'static>(
    inner: &Rc<CollInner<P>>,
    env: &Env,
    group: usize,
    filter: usize,
    active: bool,
) -> CollResult<()> {
    inner.state.borrow_mut().set_filter(group, filter, active)?;
    repaint(inner, env, Change::All)?;
    Ok(())
}

fn set_sorter<P: Clone + 'static>(inner: &Rc<CollInner<P>>, env: &Env, index: usize) -> CollResult<()> {
    inner.state.borrow_mut().set_sorter(index)?;
    repaint(inner, env, Change::All)?;
    Ok(())
}

fn select<P: Clone + 'static>(
    inner: &Rc<CollInner<P>>,
    env: &Env,
    key: ItemKey,
    selected: bool,
) -> CollResult<()> {
    inner.state.borrow_mut().select(key, selected)?;
    repaint(inner, env, Change::Row(key))?;
    Ok(())
}

fn select_all_visible<P: Clone + 'static>(
    inner: &Rc<CollInner<P>>,
    env: &Env,
    selected: bool,
) -> CollResult<()> {
    inner.state.borrow_mut().select_all_visible(selected);
    repaint(inner, env, Change::All)?;
    Ok(())
}

/// A filterable, sortable, selectable list of items with actions.
///
/// Actions run one at a time. While an action is awaiting its result (for
/// example a confirmation dialog), further actions are rejected with
/// [`CollError::ActionInProgress`] and nothing is repainted.
pub struct EzColl<P> {
    inner: Rc<CollInner<P>>,
}

impl<P> fmt::Debug for EzColl<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EzColl")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<P: Clone + 'static> EzColl<P> {
    /// Starts building a collection counting its items with `strings`.
    pub fn builder(strings: Strings) -> EzCollBuilder<P> {
        EzCollBuilder {
            strings,
            items: Vec::new(),
            mass_actions: Vec::new(),
            filter_groups: Vec::new(),
            sorters: Vec::new(),
        }
    }

    /// Runs the `index`-th action of an item and reconciles its result.
    pub async fn invoke_item_action(&self, env: &Env, key: ItemKey, index: usize) -> CollResult<()> {
        invoke_item_action(&self.inner, env, key, index).await
    }

    /// Runs a mass action on the selected items and reconciles its result.
    pub async fn invoke_mass_action(&self, env: &Env, index: usize) -> CollResult<()> {
        invoke_mass_action(&self.inner, env, index).await
    }

    /// Turns a filter on or off and repaints.
    pub fn set_filter(&self, env: &Env, group: usize, filter: usize, active: bool) -> CollResult<()> {
        set_filter(&self.inner, env, group, filter, active)
    }

    /// Activates a sorter and repaints.
    pub fn set_sorter(&self, env: &Env, index: usize) -> CollResult<()> {
        set_sorter(&self.inner, env, index)
    }

    /// Selects or deselects an item and repaints its row.
    pub fn select(&self, env: &Env, key: ItemKey, selected: bool) -> CollResult<()> {
        select(&self.inner, env, key, selected)
    }

    /// Selects or deselects all visible items and repaints.
    pub fn select_all_visible(&self, env: &Env, selected: bool) -> CollResult<()> {
        select_all_visible(&self.inner, env, selected)
    }

    /// Keys of all items in backing order.
    pub fn keys(&self) -> Vec<ItemKey> {
        self.inner.state.borrow().keys()
    }

    /// All items in backing order.
    pub fn items(&self) -> Vec<Item<P>> {
        self.inner.state.borrow().items().cloned().collect()
    }

    /// Visible items in display order.
    pub fn visible_items(&self) -> Vec<(ItemKey, Item<P>)> {
        self.inner
            .state
            .borrow()
            .visible()
            .into_iter()
            .map(|(key, item)| (key, item.clone()))
            .collect()
    }

    /// Selected items in backing order.
    pub fn selected_items(&self) -> Vec<Item<P>> {
        let state = self.inner.state.borrow();
        state
            .selected_keys()
            .into_iter()
            .filter_map(|key| state.get(key).cloned())
            .collect()
    }

    /// Number of visible items.
    pub fn visible_count(&self) -> usize {
        self.inner.state.borrow().visible_count()
    }

    /// Number of items.
    pub fn total_count(&self) -> usize {
        self.inner.state.borrow().total_count()
    }

    /// Count shown in the toolbar, e.g. `3 students` or `1 / 3 students`.
    pub fn count_label(&self) -> String {
        self.inner.count_label()
    }

    /// Id of the row element of an item.
    pub fn row_id(&self, key: ItemKey) -> String {
        self.inner.row_id(key)
    }

    /// Id of the button running the `index`-th action of an item.
    pub fn action_id(&self, key: ItemKey, index: usize) -> String {
        self.inner.action_id(key, index)
    }

    /// Id of the clickable list attribute of an item.
    pub fn top_attr_id(&self, key: ItemKey) -> String {
        self.inner.top_attr_id(key)
    }

    /// Id of the selection checkbox of an item.
    pub fn select_id(&self, key: ItemKey) -> String {
        self.inner.select_id(key)
    }
}

#[async_trait(?Send)]
impl<P: Clone + 'static> Component for EzColl<P> {
    fn slot(&self) -> &Slot {
        &self.inner.slot
    }

    fn render(&self, env: &Env) -> Result<String> {
        self.inner.render_all(env)
    }

    fn post_render(&mut self, env: &Env) -> Result<()> {
        wire_all(&self.inner, env)
    }
}
