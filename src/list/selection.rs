use std::collections::HashSet;

use crate::backend::library::{Item, ItemStore};

/// Checked item ids and drag mode. Every change raises a refresh flag that
/// the slot binder consumes to redraw slot decorations.
#[derive(Debug, Default)]
pub struct Selection {
    checked: HashSet<i64>,
    drag_mode: bool,
    needs_refresh: bool,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_checked(&mut self, id: i64, checked: bool) {
        if checked {
            self.checked.insert(id);
        } else {
            self.checked.remove(&id);
        }
        self.needs_refresh = true;
    }

    pub fn toggle(&mut self, id: i64) -> bool {
        let checked = !self.is_checked(id);
        self.set_checked(id, checked);
        checked
    }

    pub fn is_checked(&self, id: i64) -> bool {
        self.checked.contains(&id)
    }

    /// Checked items in list order. Ids no longer in the store are skipped
    /// but stay checked until [`Selection::uncheck_all`].
    pub fn checked_items(&self, store: &ItemStore) -> Vec<Item> {
        store
            .iter()
            .filter(|item| self.checked.contains(&item.id))
            .cloned()
            .collect()
    }

    pub fn uncheck_all(&mut self) {
        self.checked.clear();
        self.needs_refresh = true;
    }

    pub fn set_drag_mode(&mut self, on: bool) {
        self.drag_mode = on;
        self.needs_refresh = true;
    }

    pub fn drag_mode(&self) -> bool {
        self.drag_mode
    }

    /// Drag handles only make sense with something to reorder.
    pub fn drag_handle_visible(&self, item_count: usize) -> bool {
        self.drag_mode && item_count > 1
    }

    /// Returns whether slots need redrawing and clears the flag.
    pub fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.needs_refresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ItemStore {
        ItemStore::new((1..=6).map(|id| Item::new(id, format!("Book {}", id))).collect())
    }

    #[test]
    fn checked_items_after_uncheck() {
        let mut selection = Selection::new();
        selection.set_checked(3, true);
        selection.set_checked(5, true);
        selection.set_checked(3, false);

        let checked = selection.checked_items(&store());
        assert_eq!(checked.len(), 1);
        assert_eq!(checked[0].id, 5);
    }

    #[test]
    fn nothing_checked_is_empty() {
        assert!(Selection::new().checked_items(&store()).is_empty());
    }

    #[test]
    fn idempotent_and_unknown_ids() {
        let mut selection = Selection::new();
        selection.set_checked(2, true);
        selection.set_checked(2, true);
        assert_eq!(selection.checked_items(&store()).len(), 1);

        selection.set_checked(42, false);
        selection.set_checked(2, false);
        selection.set_checked(2, false);
        assert!(!selection.is_checked(2));
        assert!(selection.checked_items(&store()).is_empty());
    }

    #[test]
    fn missing_ids_stay_checked_until_cleared() {
        let mut selection = Selection::new();
        selection.set_checked(99, true);
        selection.set_checked(1, true);

        assert_eq!(selection.checked_items(&store()).len(), 1);
        assert!(selection.is_checked(99));

        selection.uncheck_all();
        assert!(!selection.is_checked(99));
        assert!(selection.checked_items(&store()).is_empty());
    }

    #[test]
    fn toggle_flips() {
        let mut selection = Selection::new();
        assert!(selection.toggle(4));
        assert!(!selection.toggle(4));
        assert!(!selection.is_checked(4));
    }

    #[test]
    fn drag_handle_table() {
        let cases = [
            (false, 0, false),
            (false, 1, false),
            (false, 2, false),
            (true, 0, false),
            (true, 1, false),
            (true, 2, true),
        ];
        for (drag_mode, count, expected) in cases {
            let mut selection = Selection::new();
            selection.set_drag_mode(drag_mode);
            assert_eq!(
                selection.drag_handle_visible(count),
                expected,
                "drag_mode={} count={}",
                drag_mode,
                count
            );
        }
    }

    #[test]
    fn every_mutation_requests_refresh() {
        let mut selection = Selection::new();
        assert!(!selection.take_refresh());

        selection.set_checked(1, true);
        assert!(selection.take_refresh());
        assert!(!selection.take_refresh());

        selection.set_drag_mode(true);
        assert!(selection.take_refresh());

        selection.uncheck_all();
        assert!(selection.take_refresh());
    }
}
