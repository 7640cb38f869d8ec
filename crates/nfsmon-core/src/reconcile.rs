//! Folding incoming snapshots into displayed collections.
//!
//! A [`ReconciledList`] is only ever *replaced* when its membership changes.
//! Replacement bumps the list generation and swaps the backing storage;
//! every other outcome leaves both untouched so consumers holding on to
//! positions or the generation keep a valid view.

use crate::derive::state_color;
use crate::model::{Device, FsStats, OperationCount, Replica};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Incoming snapshot matched the displayed state.
    Unchanged,
    /// Same membership; existing records were updated in place.
    Patched,
    /// Membership changed; the collection was swapped wholesale.
    Replaced,
}

impl Reconciled {
    pub fn changed(self) -> bool {
        !matches!(self, Reconciled::Unchanged)
    }

    /// Combines two outcomes, keeping the stronger one.
    pub fn and(self, other: Reconciled) -> Reconciled {
        match (self, other) {
            (Reconciled::Replaced, _) | (_, Reconciled::Replaced) => Reconciled::Replaced,
            (Reconciled::Patched, _) | (_, Reconciled::Patched) => Reconciled::Patched,
            _ => Reconciled::Unchanged,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledList<T> {
    items: Vec<T>,
    generation: u64,
}

impl<T> Default for ReconciledList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReconciledList<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generation: 0,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Number of wholesale replacements so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    fn replace(&mut self, items: Vec<T>) -> Reconciled {
        self.items = items;
        self.generation += 1;
        Reconciled::Replaced
    }
}

impl<T: Ord> ReconciledList<T> {
    /// Sorts `incoming` and adopts it only if it differs from the current
    /// sequence in length or at any position.
    pub fn reconcile_sorted(&mut self, mut incoming: Vec<T>) -> Reconciled {
        incoming.sort();
        if self.items == incoming {
            Reconciled::Unchanged
        } else {
            self.replace(incoming)
        }
    }
}

/// A record with a stable key and mutable fields.
pub trait Keyed {
    type Key: PartialEq + ?Sized;

    fn key(&self) -> &Self::Key;

    /// Fills fields computed from other fields. Runs on every incoming record
    /// before it is compared or merged.
    fn derive_fields(&mut self) {}

    /// Overwrites each field that differs from `incoming`, returning whether
    /// anything was written.
    fn patch_from(&mut self, incoming: Self) -> bool
    where
        Self: Sized;
}

impl<T: Keyed> ReconciledList<T> {
    /// Merges `incoming` position by position when the key sequence is
    /// unchanged, otherwise replaces the list.
    pub fn reconcile_keyed(&mut self, mut incoming: Vec<T>) -> Reconciled {
        for record in &mut incoming {
            record.derive_fields();
        }

        let same_membership = self.items.len() == incoming.len()
            && self
                .items
                .iter()
                .zip(&incoming)
                .all(|(current, next)| current.key() == next.key());
        if !same_membership {
            return self.replace(incoming);
        }

        let mut patched = false;
        for (current, next) in self.items.iter_mut().zip(incoming) {
            patched |= current.patch_from(next);
        }
        if patched {
            Reconciled::Patched
        } else {
            Reconciled::Unchanged
        }
    }
}

/// What happens to a section once its feed reports zero entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HiddenSections {
    /// Hide while empty, show again as soon as entries return.
    #[default]
    Reshow,
    /// Once hidden, stay hidden for the lifetime of the view.
    Sticky,
}

impl HiddenSections {
    pub fn as_str(&self) -> &'static str {
        match self {
            HiddenSections::Reshow => "reshow",
            HiddenSections::Sticky => "sticky",
        }
    }
}

impl fmt::Display for HiddenSections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HiddenSections {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "reshow" | "live" => Ok(HiddenSections::Reshow),
            "sticky" => Ok(HiddenSections::Sticky),
            other => Err(format!("Unknown hidden-section policy: {other}")),
        }
    }
}

/// A keyed collection shown as its own panel.
///
/// An empty snapshot does not clear the list; it only hides the panel. The
/// hidden flag counts as an in-place patch of the section.
#[derive(Debug, Clone, PartialEq)]
pub struct Section<T> {
    list: ReconciledList<T>,
    hidden: bool,
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Self {
            list: ReconciledList::new(),
            hidden: false,
        }
    }
}

impl<T> Section<T> {
    pub fn list(&self) -> &ReconciledList<T> {
        &self.list
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }
}

impl<T: Keyed> Section<T> {
    pub fn apply(&mut self, incoming: Vec<T>, policy: HiddenSections) -> Reconciled {
        if incoming.is_empty() {
            if self.hidden {
                return Reconciled::Unchanged;
            }
            self.hidden = true;
            return Reconciled::Patched;
        }

        let mut outcome = Reconciled::Unchanged;
        if self.hidden && policy == HiddenSections::Reshow {
            self.hidden = false;
            outcome = Reconciled::Patched;
        }
        outcome.and(self.list.reconcile_keyed(incoming))
    }
}

/// Overwrites `slot` when `value` differs, reporting whether it did.
pub fn assign<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Like [`assign`], but a field the incoming record left out keeps its
/// current value.
pub fn assign_present<T: PartialEq>(slot: &mut Option<T>, incoming: Option<T>) -> bool {
    match incoming {
        Some(value) => assign(slot, Some(value)),
        None => false,
    }
}

/// Key-by-key merge of pass-through fields. Keys missing from `incoming`
/// are left in place.
pub fn assign_extra(slot: &mut HashMap<String, Value>, incoming: HashMap<String, Value>) -> bool {
    let mut changed = false;
    for (key, value) in incoming {
        match slot.get_mut(&key) {
            Some(current) => changed |= assign(current, value),
            None => {
                slot.insert(key, value);
                changed = true;
            }
        }
    }
    changed
}

impl FsStats {
    /// Field-by-field update; returns whether any field changed.
    pub fn patch_from(&mut self, incoming: FsStats) -> bool {
        let mut changed = false;
        changed |= assign(&mut self.total_space, incoming.total_space);
        changed |= assign(&mut self.free_space, incoming.free_space);
        changed |= assign(&mut self.avail_space, incoming.avail_space);
        changed |= assign(&mut self.total_files, incoming.total_files);
        changed |= assign(&mut self.free_files, incoming.free_files);
        changed |= assign(&mut self.avail_files, incoming.avail_files);
        changed |= assign(&mut self.repair_queue_size, incoming.repair_queue_size);
        changed
    }
}

impl Keyed for Device {
    type Key = str;

    fn key(&self) -> &str {
        &self.id
    }

    fn derive_fields(&mut self) {
        self.extra.remove("color");
        self.color = Some(state_color(&self.state));
    }

    fn patch_from(&mut self, incoming: Self) -> bool {
        let mut changed = false;
        changed |= assign_present(&mut self.owner, incoming.owner);
        changed |= assign_present(&mut self.addresses, incoming.addresses);
        changed |= assign(&mut self.state, incoming.state);
        changed |= assign_present(&mut self.total_space, incoming.total_space);
        changed |= assign_present(&mut self.free_space, incoming.free_space);
        changed |= assign_present(&mut self.avail_space, incoming.avail_space);
        changed |= assign_present(&mut self.priority, incoming.priority);
        changed |= assign(&mut self.color, incoming.color);
        changed |= assign_extra(&mut self.extra, incoming.extra);
        changed
    }
}

impl Keyed for Replica {
    type Key = str;

    fn key(&self) -> &str {
        &self.id
    }

    fn derive_fields(&mut self) {
        self.extra.remove("color");
        self.color = Some(state_color(&self.state));
    }

    fn patch_from(&mut self, incoming: Self) -> bool {
        let mut changed = false;
        changed |= assign_present(&mut self.addresses, incoming.addresses);
        changed |= assign(&mut self.state, incoming.state);
        changed |= assign(&mut self.color, incoming.color);
        changed |= assign_extra(&mut self.extra, incoming.extra);
        changed
    }
}

impl Keyed for OperationCount {
    type Key = str;

    fn key(&self) -> &str {
        &self.name
    }

    fn patch_from(&mut self, incoming: Self) -> bool {
        assign(&mut self.count, incoming.count)
    }
}
