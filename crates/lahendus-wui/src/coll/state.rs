//! Backing list, filters, sorting and selection of a collection.
//!
//! Everything here is synchronous and independent of the document so the
//! reconciliation rules can be tested on their own.

use std::collections::BTreeSet;

use super::{ActionResult, CollError, CollResult, FilterGroup, Item, ItemKey, Sorter};

/// What has to be repainted after a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Nothing changed.
    None,
    /// Only this row and the toolbar changed.
    Row(ItemKey),
    /// The whole widget changed.
    All,
}

struct Entry<P> {
    key: ItemKey,
    item: Item<P>,
}

/// State of a collection.
pub struct CollState<P> {
    entries: Vec<Entry<P>>,
    next_key: u64,
    filter_groups: Vec<FilterGroup<P>>,
    active_filters: BTreeSet<(usize, usize)>,
    sorters: Vec<Sorter<P>>,
    active_sorter: Option<usize>,
    selected: BTreeSet<ItemKey>,
}

impl<P> std::fmt::Debug for CollState<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollState")
            .field("items", &self.entries.len())
            .field("active_filters", &self.active_filters)
            .field("active_sorter", &self.active_sorter)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

impl<P> CollState<P> {
    /// Creates the state. The first sorter, if any, is active.
    pub fn new(items: Vec<Item<P>>, filter_groups: Vec<FilterGroup<P>>, sorters: Vec<Sorter<P>>) -> Self {
        let active_sorter = (!sorters.is_empty()).then_some(0);
        let mut state = Self {
            entries: Vec::with_capacity(items.len()),
            next_key: 0,
            filter_groups,
            active_filters: BTreeSet::new(),
            sorters,
            active_sorter,
            selected: BTreeSet::new(),
        };
        let entries = items.into_iter().map(|item| state.entry(item)).collect();
        state.entries = entries;
        state
    }

    fn entry(&mut self, item: Item<P>) -> Entry<P> {
        let key = ItemKey(self.next_key);
        self.next_key += 1;
        Entry { key, item }
    }

    /// Items in backing order.
    pub fn items(&self) -> impl Iterator<Item = &Item<P>> {
        self.entries.iter().map(|e| &e.item)
    }

    /// Keys in backing order.
    pub fn keys(&self) -> Vec<ItemKey> {
        self.entries.iter().map(|e| e.key).collect()
    }

    /// Looks up an item.
    pub fn get(&self, key: ItemKey) -> Option<&Item<P>> {
        self.position(key).map(|i| &self.entries[i].item)
    }

    fn position(&self, key: ItemKey) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }

    /// Number of items in the backing list.
    pub fn total_count(&self) -> usize {
        self.entries.len()
    }

    /// The filter groups.
    pub fn filter_groups(&self) -> &[FilterGroup<P>] {
        &self.filter_groups
    }

    /// The sorters.
    pub fn sorters(&self) -> &[Sorter<P>] {
        &self.sorters
    }

    /// Index of the active sorter, `None` for insertion order.
    pub const fn active_sorter(&self) -> Option<usize> {
        self.active_sorter
    }

    /// Returns `true` if the filter is active.
    pub fn is_filter_active(&self, group: usize, filter: usize) -> bool {
        self.active_filters.contains(&(group, filter))
    }

    /// Returns `true` if any filter is active.
    pub fn is_filtered(&self) -> bool {
        !self.active_filters.is_empty()
    }

    fn passes(&self, item: &Item<P>) -> bool {
        self.active_filters
            .iter()
            .all(|&(g, f)| self.filter_groups[g].filters[f].accepts(item))
    }

    /// Visible items, filtered and in display order.
    ///
    /// Every active filter must accept an item, including filters in the
    /// same group. Sorting is stable.
    pub fn visible(&self) -> Vec<(ItemKey, &Item<P>)> {
        let mut visible: Vec<(ItemKey, &Item<P>)> = self
            .entries
            .iter()
            .filter(|e| self.passes(&e.item))
            .map(|e| (e.key, &e.item))
            .collect();
        if let Some(sorter) = self.active_sorter.map(|i| &self.sorters[i]) {
            visible.sort_by(|(_, a), (_, b)| sorter.compare(a, b));
        }
        visible
    }

    /// Keys of visible items in display order.
    pub fn visible_keys(&self) -> Vec<ItemKey> {
        self.visible().into_iter().map(|(key, _)| key).collect()
    }

    /// Number of visible items.
    pub fn visible_count(&self) -> usize {
        self.entries.iter().filter(|e| self.passes(&e.item)).count()
    }

    /// Turns a filter on or off.
    pub fn set_filter(&mut self, group: usize, filter: usize, active: bool) -> CollResult<()> {
        if self
            .filter_groups
            .get(group)
            .and_then(|g| g.filters.get(filter))
            .is_none()
        {
            return Err(CollError::UnknownFilter { group, filter });
        }
        if active {
            self.active_filters.insert((group, filter));
        } else {
            self.active_filters.remove(&(group, filter));
        }
        self.prune_selection();
        Ok(())
    }

    /// Activates a sorter.
    pub fn set_sorter(&mut self, index: usize) -> CollResult<()> {
        if index >= self.sorters.len() {
            return Err(CollError::UnknownSorter(index));
        }
        self.active_sorter = Some(index);
        Ok(())
    }

    /// Selects or deselects a visible, selectable item.
    pub fn select(&mut self, key: ItemKey, selected: bool) -> CollResult<()> {
        let item = self.get(key).ok_or(CollError::UnknownItem(key))?;
        if !item.is_selectable {
            return Err(CollError::NotSelectable(key));
        }
        if !self.passes(item) {
            return Err(CollError::NotVisible(key));
        }
        if selected {
            self.selected.insert(key);
        } else {
            self.selected.remove(&key);
        }
        Ok(())
    }

    /// Selects or deselects every visible, selectable item.
    pub fn select_all_visible(&mut self, selected: bool) {
        let keys: Vec<ItemKey> = self
            .visible()
            .into_iter()
            .filter(|(_, item)| item.is_selectable)
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            if selected {
                self.selected.insert(key);
            } else {
                self.selected.remove(&key);
            }
        }
    }

    /// Returns `true` if the item is selected.
    pub fn is_selected(&self, key: ItemKey) -> bool {
        self.selected.contains(&key)
    }

    /// Selected keys in backing order.
    pub fn selected_keys(&self) -> Vec<ItemKey> {
        self.entries
            .iter()
            .filter(|e| self.selected.contains(&e.key))
            .map(|e| e.key)
            .collect()
    }

    /// Returns `true` if every visible selectable item is selected and there
    /// is at least one.
    pub fn all_visible_selected(&self) -> bool {
        let mut selectable = self
            .visible()
            .into_iter()
            .filter(|(_, item)| item.is_selectable)
            .peekable();
        selectable.peek().is_some() && selectable.all(|(key, _)| self.selected.contains(&key))
    }

    fn prune_selection(&mut self) {
        let visible: BTreeSet<ItemKey> = self
            .entries
            .iter()
            .filter(|e| self.passes(&e.item))
            .map(|e| e.key)
            .collect();
        self.selected.retain(|key| visible.contains(key));
    }

    /// Reconciles the result of a single-item action.
    ///
    /// A one-for-one replacement keeps the item's key, so its row can be
    /// repainted in place if it is still visible at the same position.
    pub fn apply_item_result(&mut self, key: ItemKey, result: ActionResult<P>) -> CollResult<Change> {
        let ActionResult::Modified(replacement) = result else {
            return Ok(Change::None);
        };
        let pos = self.position(key).ok_or(CollError::UnknownItem(key))?;
        let shown_at = self.visible_keys().iter().position(|k| *k == key);

        self.selected.remove(&key);
        let in_place = replacement.len() == 1;
        let new_entries: Vec<Entry<P>> = if in_place {
            replacement
                .into_iter()
                .map(|item| Entry { key, item })
                .collect()
        } else {
            replacement.into_iter().map(|item| self.entry(item)).collect()
        };
        self.entries.splice(pos..=pos, new_entries);
        self.prune_selection();

        if in_place && shown_at.is_some() {
            let now_at = self.visible_keys().iter().position(|k| *k == key);
            if now_at == shown_at {
                return Ok(Change::Row(key));
            }
        }
        Ok(Change::All)
    }

    /// Reconciles the result of a mass action over `keys`.
    ///
    /// If the replacement has exactly as many items as were affected, item
    /// `i` replaces the `i`-th affected item in backing order. Otherwise the
    /// affected items are removed and the replacement is inserted where the
    /// first of them was. A modification clears the selection.
    pub fn apply_mass_result(
        &mut self,
        keys: &[ItemKey],
        result: ActionResult<P>,
    ) -> CollResult<Change> {
        let ActionResult::Modified(replacement) = result else {
            return Ok(Change::None);
        };
        let mut positions = keys
            .iter()
            .map(|key| self.position(*key).ok_or(CollError::UnknownItem(*key)))
            .collect::<CollResult<Vec<usize>>>()?;
        positions.sort_unstable();
        positions.dedup();

        if replacement.len() == positions.len() {
            for (pos, item) in positions.iter().zip(replacement) {
                self.entries[*pos].item = item;
            }
        } else if let Some(&first) = positions.first() {
            for pos in positions.iter().rev() {
                self.entries.remove(*pos);
            }
            let new_entries: Vec<Entry<P>> =
                replacement.into_iter().map(|item| self.entry(item)).collect();
            self.entries.splice(first..first, new_entries);
        }
        self.selected.clear();
        Ok(Change::All)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coll::{Filter, TitleStatus};

    #[derive(Debug, Clone, PartialEq)]
    struct Student {
        name: &'static str,
        active: bool,
    }

    fn item(name: &'static str, active: bool) -> Item<Student> {
        Item::new(Student { name, active }, name)
    }

    fn titles(state: &CollState<Student>) -> Vec<String> {
        state.items().map(|i| i.title.clone()).collect()
    }

    fn visible_titles(state: &CollState<Student>) -> Vec<String> {
        state.visible().into_iter().map(|(_, i)| i.title.clone()).collect()
    }

    fn abc() -> CollState<Student> {
        CollState::new(
            vec![item("A", true), item("B", false), item("C", true)],
            vec![FilterGroup::new(
                "Status",
                vec![
                    Filter::new("Active", |i: &Item<Student>| i.props.active),
                    Filter::new("Pending", |i: &Item<Student>| !i.props.active),
                ],
            )],
            Vec::new(),
        )
    }

    #[test]
    fn test_split_replacement_keeps_order() {
        let mut state = abc();
        let b = state.keys()[1];

        let change = state
            .apply_item_result(b, ActionResult::Modified(vec![item("B1", true), item("B2", true)]))
            .unwrap();

        assert_eq!(change, Change::All);
        assert_eq!(titles(&state), vec!["A", "B1", "B2", "C"]);
    }

    #[test]
    fn test_removal_drops_item_and_selection() {
        let mut state = abc();
        let b = state.keys()[1];
        state.select(b, true).unwrap();

        state.apply_item_result(b, ActionResult::removed()).unwrap();

        assert_eq!(titles(&state), vec!["A", "C"]);
        assert!(!state.is_selected(b));
        assert!(state.selected_keys().is_empty());
    }

    #[test]
    fn test_unmodified_changes_nothing() {
        let mut state = abc();
        let b = state.keys()[1];
        state.select(b, true).unwrap();

        let change = state.apply_item_result(b, ActionResult::Unmodified).unwrap();

        assert_eq!(change, Change::None);
        assert!(state.is_selected(b));
        assert_eq!(titles(&state), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_in_place_edit_repaints_single_row() {
        let mut state = abc();
        let b = state.keys()[1];
        let mut edited = item("B", false);
        edited.title_status = TitleStatus::Inactive;

        let change = state
            .apply_item_result(b, ActionResult::Modified(vec![edited]))
            .unwrap();

        assert_eq!(change, Change::Row(b));
        assert_eq!(state.keys()[1], b);
        assert_eq!(state.get(b).unwrap().title_status, TitleStatus::Inactive);
    }

    #[test]
    fn test_in_place_edit_that_moves_row_repaints_all() {
        let mut state = CollState::new(
            vec![item("A", true), item("B", true), item("C", true)],
            Vec::new(),
            vec![Sorter::new("By name", |a: &Item<Student>, b: &Item<Student>| {
                a.title.cmp(&b.title)
            })],
        );
        let a = state.keys()[0];

        let change = state
            .apply_item_result(a, ActionResult::Modified(vec![item("Z", true)]))
            .unwrap();

        assert_eq!(change, Change::All);
        assert_eq!(visible_titles(&state), vec!["B", "C", "Z"]);
    }

    #[test]
    fn test_filters_in_same_group_combine_with_and() {
        let mut state = abc();
        state.set_filter(0, 0, true).unwrap();
        assert_eq!(visible_titles(&state), vec!["A", "C"]);

        state.set_filter(0, 1, true).unwrap();
        assert!(state.visible().is_empty());
        assert_eq!(state.visible_count(), 0);
        assert_eq!(state.total_count(), 3);

        state.set_filter(0, 0, false).unwrap();
        assert_eq!(visible_titles(&state), vec!["B"]);
    }

    #[test]
    fn test_filtering_prunes_selection() {
        let mut state = abc();
        let keys = state.keys();
        let (a, b) = (keys[0], keys[1]);
        state.select(a, true).unwrap();
        state.select(b, true).unwrap();

        state.set_filter(0, 0, true).unwrap();

        assert_eq!(state.selected_keys(), vec![a]);
        assert!(matches!(state.select(b, true), Err(CollError::NotVisible(_))));
    }

    #[test]
    fn test_sorter_is_idempotent() {
        let mut state = CollState::new(
            vec![item("Tamm", true), item("Kask", true), item("Mets", true)],
            Vec::new(),
            vec![
                Sorter::new("Insertion", |_: &Item<Student>, _: &Item<Student>| {
                    std::cmp::Ordering::Equal
                }),
                Sorter::new("By last name", |a: &Item<Student>, b: &Item<Student>| {
                    a.title.cmp(&b.title)
                }),
            ],
        );
        assert_eq!(state.active_sorter(), Some(0));
        assert_eq!(visible_titles(&state), vec!["Tamm", "Kask", "Mets"]);

        state.set_sorter(1).unwrap();
        let once = visible_titles(&state);
        state.set_sorter(1).unwrap();
        assert_eq!(visible_titles(&state), once);
        assert_eq!(once, vec!["Kask", "Mets", "Tamm"]);
        assert!(matches!(state.set_sorter(5), Err(CollError::UnknownSorter(5))));
    }

    #[test]
    fn test_mass_result_pairwise_replacement() {
        let mut state = abc();
        let keys = state.keys();
        let affected = [keys[2], keys[0]];
        state.select_all_visible(true);

        let change = state
            .apply_mass_result(
                &affected,
                ActionResult::Modified(vec![item("A2", true), item("C2", true)]),
            )
            .unwrap();

        assert_eq!(change, Change::All);
        assert_eq!(titles(&state), vec!["A2", "B", "C2"]);
        assert!(state.selected_keys().is_empty());
    }

    #[test]
    fn test_mass_result_removal_and_insertion() {
        let mut state = abc();
        let keys = state.keys();

        state
            .apply_mass_result(&[keys[1], keys[2]], ActionResult::Modified(vec![item("X", true)]))
            .unwrap();
        assert_eq!(titles(&state), vec!["A", "X"]);

        let keys = state.keys();
        state
            .apply_mass_result(&keys, ActionResult::removed())
            .unwrap();
        assert_eq!(state.total_count(), 0);
    }

    #[test]
    fn test_mass_unmodified_keeps_selection() {
        let mut state = abc();
        state.select_all_visible(true);
        assert!(state.all_visible_selected());

        let keys = state.selected_keys();
        let change = state
            .apply_mass_result(&keys, ActionResult::Unmodified)
            .unwrap();

        assert_eq!(change, Change::None);
        assert_eq!(state.selected_keys(), keys);
    }

    #[test]
    fn test_unselectable_items() {
        let mut unselectable = item("Moodle", false);
        unselectable.is_selectable = false;
        let mut state = CollState::new(vec![item("A", true), unselectable], Vec::new(), Vec::new());
        let keys = state.keys();

        assert!(matches!(
            state.select(keys[1], true),
            Err(CollError::NotSelectable(_))
        ));
        state.select_all_visible(true);
        assert_eq!(state.selected_keys(), vec![keys[0]]);
        assert!(state.all_visible_selected());
    }
}
