// ── Subscription filter ──
//
// Decides which state updates reach the dispatcher. Selections are
// additive: every `watch_*` call widens the set, none narrows it.

use std::collections::HashSet;

use loxly_api::StateId;

use crate::catalog::StructureCatalog;

/// Set of state ids the client should report.
///
/// An empty filter matches every id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    allowed: HashSet<StateId>,
}

impl SubscriptionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add explicit ids. Returns how many were new.
    pub fn watch_ids(&mut self, ids: impl IntoIterator<Item = StateId>) -> usize {
        let before = self.allowed.len();
        self.allowed.extend(ids);
        self.allowed.len() - before
    }

    /// Add every state of every control in `room` (case-insensitive).
    pub fn watch_room(&mut self, catalog: &StructureCatalog, room: &str) -> usize {
        self.watch_ids(catalog.query_by_room(room))
    }

    /// Add every state of every control whose name contains `control`.
    pub fn watch_control(&mut self, catalog: &StructureCatalog, control: &str) -> usize {
        self.watch_ids(catalog.query_by_control(control))
    }

    /// Add every state whose key contains `state_key`.
    pub fn watch_state_key(&mut self, catalog: &StructureCatalog, state_key: &str) -> usize {
        self.watch_ids(catalog.query_by_state_key(state_key))
    }

    pub fn matches(&self, id: &StateId) -> bool {
        self.allowed.is_empty() || self.allowed.contains(id)
    }

    /// `true` when no selection has narrowed the filter.
    pub fn is_unfiltered(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}
