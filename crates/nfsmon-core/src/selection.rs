/// When a vanished selection is replaced by the first list entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Reselect {
    /// Clear and pick the first entry in the same pass.
    #[default]
    Immediate,
    /// Clear now; pick the first entry on the following pass.
    NextPass,
}

/// Operator selection tracked by value against a reconciled list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<K> {
    selected: Option<K>,
    reselect: Reselect,
}

impl<K> Default for Selection<K> {
    fn default() -> Self {
        Self::new(Reselect::default())
    }
}

impl<K> Selection<K> {
    pub fn new(reselect: Reselect) -> Self {
        Self {
            selected: None,
            reselect,
        }
    }

    pub fn selected(&self) -> Option<&K> {
        self.selected.as_ref()
    }
}

impl<K: Clone + PartialEq> Selection<K> {
    /// Selects `id` if it is currently listed. Returns whether the selection
    /// changed.
    pub fn select(&mut self, id: &K, items: &[K]) -> bool {
        if !items.contains(id) || self.selected.as_ref() == Some(id) {
            return false;
        }
        self.selected = Some(id.clone());
        true
    }

    /// Re-validates the selection against the latest list. Must run after
    /// every reconciliation, including ones that left the list untouched.
    /// Returns whether the selection changed.
    pub fn reconcile(&mut self, items: &[K]) -> bool {
        if let Some(current) = &self.selected {
            if items.contains(current) {
                return false;
            }
            self.selected = None;
            if self.reselect == Reselect::NextPass {
                return true;
            }
            self.selected = items.first().cloned();
            return true;
        }

        self.selected = items.first().cloned();
        self.selected.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn selection_survives_unrelated_removals_and_reordering() {
        let mut selection = Selection::new(Reselect::NextPass);
        let items = list(&["c1", "c2", "c3"]);
        selection.reconcile(&items);
        assert!(selection.select(&"c2".to_string(), &items));

        assert!(!selection.reconcile(&list(&["c1", "c2"])));
        assert_eq!(selection.selected().map(String::as_str), Some("c2"));

        assert!(!selection.reconcile(&list(&["c2", "c1"])));
        assert_eq!(selection.selected().map(String::as_str), Some("c2"));
    }

    #[test]
    fn next_pass_mode_clears_then_reselects_first() {
        let mut selection = Selection::new(Reselect::NextPass);
        let items = list(&["c1", "c2", "c3"]);
        selection.reconcile(&items);
        selection.select(&"c2".to_string(), &items);

        let remaining = list(&["c1", "c3"]);
        assert!(selection.reconcile(&remaining));
        assert_eq!(selection.selected(), None);

        assert!(selection.reconcile(&remaining));
        assert_eq!(selection.selected().map(String::as_str), Some("c1"));
    }

    #[test]
    fn immediate_mode_falls_back_in_one_pass() {
        let mut selection = Selection::new(Reselect::Immediate);
        let items = list(&["a", "b"]);
        selection.reconcile(&items);
        selection.select(&"b".to_string(), &items);

        assert!(selection.reconcile(&list(&["a", "c"])));
        assert_eq!(selection.selected().map(String::as_str), Some("a"));
    }

    #[test]
    fn empty_list_leaves_selection_cleared() {
        let mut selection: Selection<String> = Selection::new(Reselect::Immediate);
        assert!(!selection.reconcile(&[]));
        assert_eq!(selection.selected(), None);

        selection.reconcile(&list(&["a"]));
        assert!(selection.reconcile(&[]));
        assert_eq!(selection.selected(), None);
        assert!(!selection.reconcile(&[]));
    }

    #[test]
    fn select_ignores_unlisted_ids() {
        let mut selection = Selection::new(Reselect::Immediate);
        let items = list(&["a", "b"]);
        selection.reconcile(&items);

        assert!(!selection.select(&"z".to_string(), &items));
        assert!(!selection.select(&"a".to_string(), &items));
        assert_eq!(selection.selected().map(String::as_str), Some("a"));
    }
}
