// ── Dispatcher ──
//
// Turns decoded updates into consumer events. Owns the last-known value of
// every state seen on this connection; only the receive loop writes to it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use loxly_api::{StateId, StateValue};

use crate::catalog::StructureCatalog;

/// A state event delivered to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StateEvent {
    /// First value seen for this state on the current connection.
    Initial {
        id: StateId,
        name: String,
        value: StateValue,
    },
    /// The value differs from the one last reported.
    Changed {
        id: StateId,
        name: String,
        old: StateValue,
        new: StateValue,
    },
}

impl StateEvent {
    pub fn id(&self) -> &StateId {
        match self {
            Self::Initial { id, .. } | Self::Changed { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Initial { name, .. } | Self::Changed { name, .. } => name,
        }
    }

    /// The value the state holds after this event.
    pub fn value(&self) -> &StateValue {
        match self {
            Self::Initial { value, .. } => value,
            Self::Changed { new, .. } => new,
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Initial { .. })
    }
}

/// Change detector over a per-state value cache.
#[derive(Debug)]
pub struct Dispatcher {
    catalog: Arc<StructureCatalog>,
    cache: HashMap<StateId, StateValue>,
}

impl Dispatcher {
    pub fn new(catalog: Arc<StructureCatalog>) -> Self {
        Self {
            catalog,
            cache: HashMap::new(),
        }
    }

    /// Record `value` for `id` and report what changed, if anything.
    ///
    /// Repeating the cached value yields `None`.
    pub fn process(&mut self, id: StateId, value: StateValue) -> Option<StateEvent> {
        match self.cache.get_mut(&id) {
            None => {
                self.cache.insert(id, value.clone());
                Some(StateEvent::Initial {
                    id,
                    name: self.catalog.display_name(&id),
                    value,
                })
            }
            Some(cached) if cached.same_as(&value) => None,
            Some(cached) => {
                let old = std::mem::replace(cached, value.clone());
                Some(StateEvent::Changed {
                    id,
                    name: self.catalog.display_name(&id),
                    old,
                    new: value,
                })
            }
        }
    }

    /// Last value seen for `id`.
    pub fn cached(&self, id: &StateId) -> Option<&StateValue> {
        self.cache.get(id)
    }

    /// Forget every cached value. The next update for each state is `Initial` again.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn catalog(&self) -> &Arc<StructureCatalog> {
        &self.catalog
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const LAMP: &str = "30000000-0000-0000-0000-000000000001";

    fn dispatcher() -> Dispatcher {
        let catalog = StructureCatalog::load(&format!(
            r#"{{
                "rooms": {{"r1": {{"name": "Office"}}}},
                "controls": {{"c1": {{"name": "Lamp", "type": "Switch", "room": "r1", "states": {{"value": "{LAMP}"}}}}}}
            }}"#
        ))
        .unwrap();
        Dispatcher::new(Arc::new(catalog))
    }

    fn lamp() -> StateId {
        StateId::parse(LAMP).unwrap()
    }

    #[test]
    fn repeated_values_are_suppressed() {
        let mut dispatcher = dispatcher();
        let events: Vec<_> = [10.0, 10.0, 12.0, 12.0]
            .into_iter()
            .filter_map(|v| dispatcher.process(lamp(), StateValue::Number(v)))
            .collect();

        assert_eq!(
            events,
            vec![
                StateEvent::Initial {
                    id: lamp(),
                    name: "Office/Lamp/value".into(),
                    value: StateValue::Number(10.0),
                },
                StateEvent::Changed {
                    id: lamp(),
                    name: "Office/Lamp/value".into(),
                    old: StateValue::Number(10.0),
                    new: StateValue::Number(12.0),
                },
            ]
        );
        assert_eq!(dispatcher.cached(&lamp()), Some(&StateValue::Number(12.0)));
    }

    #[test]
    fn unresolved_ids_are_named_by_id() {
        let mut dispatcher = dispatcher();
        let stranger = StateId::parse("30000000-0000-0000-0000-0000000000ff").unwrap();
        let event = dispatcher.process(stranger, StateValue::from("on")).unwrap();
        assert_eq!(event.name(), "30000000-0000-0000-0000-0000000000ff");
        assert!(event.is_initial());
    }

    #[test]
    fn type_switch_counts_as_change() {
        let mut dispatcher = dispatcher();
        dispatcher.process(lamp(), StateValue::Number(1.0));
        let event = dispatcher.process(lamp(), StateValue::from("1")).unwrap();
        assert!(!event.is_initial());
        assert_eq!(event.value(), &StateValue::from("1"));
    }

    #[test]
    fn nan_repeats_are_suppressed() {
        let mut dispatcher = dispatcher();
        assert!(dispatcher.process(lamp(), StateValue::Number(f64::NAN)).is_some());
        assert!(dispatcher.process(lamp(), StateValue::Number(f64::NAN)).is_none());
    }

    #[test]
    fn tiny_float_differences_are_changes() {
        let mut dispatcher = dispatcher();
        dispatcher.process(lamp(), StateValue::Number(21.5));
        assert!(dispatcher
            .process(lamp(), StateValue::Number(f64::from_bits(21.5_f64.to_bits() + 1)))
            .is_some());
    }

    #[test]
    fn clear_restarts_with_initial_events() {
        let mut dispatcher = dispatcher();
        dispatcher.process(lamp(), StateValue::Number(1.0));
        dispatcher.clear();
        let event = dispatcher.process(lamp(), StateValue::Number(1.0)).unwrap();
        assert!(event.is_initial());
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = StateEvent::Changed {
            id: lamp(),
            name: "Office/Lamp/value".into(),
            old: StateValue::Number(0.0),
            new: StateValue::Number(1.0),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "changed");
        assert_eq!(json["id"], LAMP);
        assert_eq!(json["new"], 1.0);
    }
}
