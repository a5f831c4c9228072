// ── Structure catalog ──
//
// Flattens the structure document into one lookup table from state id to
// the control that owns it. Built once per run; immutable afterwards and
// shared behind an `Arc` by the filter, the dispatcher and the client.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use loxly_api::StateId;
use loxly_api::structure::{Control, StateRef, StructureDocument};

use crate::error::CoreError;

/// Room name used when a control references a room the document lacks.
const UNKNOWN_ROOM: &str = "?";

/// What a state id means: which control, in which room, under which key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMeta {
    /// `"{control}/{state_key}"` or `"{control}/{subcontrol}/{state_key}"`.
    pub name: String,
    pub room: String,
    pub control: String,
    pub control_type: String,
    pub state_key: String,
    pub subcontrol: Option<String>,
    /// Id of the top-level control, as spelled in the document.
    pub control_id: String,
}

impl ControlMeta {
    /// `"{room}/{name}"`, the label shown to users.
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.room, self.name)
    }
}

/// A room and how many controls it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    /// Room id, as spelled in the document. Names need not be unique.
    pub id: String,
    pub name: String,
    pub controls: usize,
}

/// A top-level control, as listed by the installation map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlSummary {
    pub id: String,
    pub name: String,
    pub control_type: String,
    /// Id of the room the control is placed in, if that room exists.
    pub room_id: Option<String>,
}

/// Lookup table from [`StateId`] to [`ControlMeta`].
#[derive(Debug, Clone, Default)]
pub struct StructureCatalog {
    entries: HashMap<StateId, ControlMeta>,
    rooms: Vec<RoomSummary>,
    controls: Vec<ControlSummary>,
}

impl StructureCatalog {
    /// Parse `LoxAPP3.json` text and build the catalog.
    pub fn load(structure_json: &str) -> Result<Self, CoreError> {
        let doc = loxly_api::StructureDocument::from_json(structure_json).map_err(|e| {
            CoreError::MalformedStructure {
                message: e.to_string(),
            }
        })?;
        Self::from_document(&doc)
    }

    /// Build the catalog from an already-parsed document.
    ///
    /// Every state id is normalized on the way in; an id that is not a
    /// valid 128-bit identifier rejects the whole document.
    pub fn from_document(doc: &StructureDocument) -> Result<Self, CoreError> {
        let mut entries = HashMap::new();
        let mut room_counts: HashMap<&str, usize> = HashMap::new();
        let mut controls = Vec::with_capacity(doc.controls.len());

        for (control_id, control) in &doc.controls {
            let placed = control
                .room
                .as_deref()
                .and_then(|room_id| doc.rooms.get_key_value(room_id));
            let room = placed.map_or(UNKNOWN_ROOM, |(_, room)| room.name.as_str());
            if let Some((room_id, _)) = placed {
                *room_counts.entry(room_id.as_str()).or_default() += 1;
            }
            controls.push(ControlSummary {
                id: control_id.clone(),
                name: control.name.clone(),
                control_type: control.control_type.clone(),
                room_id: placed.map(|(room_id, _)| room_id.clone()),
            });

            register_states(&mut entries, control_id, control, room, None, &control.states)?;
            for sub in control.sub_controls.values() {
                register_states(
                    &mut entries,
                    control_id,
                    control,
                    room,
                    Some(sub.name.as_str()),
                    &sub.states,
                )?;
            }
        }

        let mut rooms: Vec<RoomSummary> = doc
            .rooms
            .iter()
            .map(|(id, room)| RoomSummary {
                id: id.clone(),
                name: room.name.clone(),
                controls: room_counts.get(id.as_str()).copied().unwrap_or_default(),
            })
            .collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        controls.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        tracing::debug!(
            states = entries.len(),
            controls = doc.controls.len(),
            "structure catalog built"
        );
        Ok(Self {
            entries,
            rooms,
            controls,
        })
    }

    pub fn resolve(&self, id: &StateId) -> Option<&ControlMeta> {
        self.entries.get(id)
    }

    /// User-facing name for `id`, falling back to the id itself.
    pub fn display_name(&self, id: &StateId) -> String {
        self.resolve(id)
            .map_or_else(|| id.to_string(), ControlMeta::display_name)
    }

    /// All states of controls in the room called `name` (case-insensitive).
    pub fn query_by_room(&self, name: &str) -> HashSet<StateId> {
        let wanted = name.to_lowercase();
        self.select(|meta| meta.room.to_lowercase() == wanted)
    }

    /// All states of controls whose name contains `substring` (case-insensitive).
    pub fn query_by_control(&self, substring: &str) -> HashSet<StateId> {
        let wanted = substring.to_lowercase();
        self.select(|meta| meta.control.to_lowercase().contains(&wanted))
    }

    /// All states whose key contains `substring` (case-insensitive).
    pub fn query_by_state_key(&self, substring: &str) -> HashSet<StateId> {
        let wanted = substring.to_lowercase();
        self.select(|meta| meta.state_key.to_lowercase().contains(&wanted))
    }

    /// Rooms sorted by name, then id, with control counts.
    pub fn rooms(&self) -> &[RoomSummary] {
        &self.rooms
    }

    /// Top-level controls sorted by name.
    pub fn controls(&self) -> &[ControlSummary] {
        &self.controls
    }

    /// Controls placed in the room with id `room_id`, sorted by name.
    pub fn controls_in(&self, room_id: &str) -> impl Iterator<Item = &ControlSummary> {
        self.controls
            .iter()
            .filter(move |c| c.room_id.as_deref() == Some(room_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateId, &ControlMeta)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn select(&self, predicate: impl Fn(&ControlMeta) -> bool) -> HashSet<StateId> {
        self.entries
            .iter()
            .filter(|(_, meta)| predicate(meta))
            .map(|(id, _)| *id)
            .collect()
    }
}

fn register_states(
    entries: &mut HashMap<StateId, ControlMeta>,
    control_id: &str,
    control: &Control,
    room: &str,
    subcontrol: Option<&str>,
    states: &BTreeMap<String, StateRef>,
) -> Result<(), CoreError> {
    for (state_key, state_ref) in states {
        let name = match subcontrol {
            Some(sub) => format!("{}/{sub}/{state_key}", control.name),
            None => format!("{}/{state_key}", control.name),
        };

        for raw_id in state_ref.ids() {
            let id = StateId::parse(raw_id).map_err(|e| CoreError::MalformedStructure {
                message: format!("control '{}' state '{state_key}': {e}", control.name),
            })?;
            entries.insert(
                id,
                ControlMeta {
                    name: name.clone(),
                    room: room.to_owned(),
                    control: control.name.clone(),
                    control_type: control.control_type.clone(),
                    state_key: state_key.clone(),
                    subcontrol: subcontrol.map(str::to_owned),
                    control_id: control_id.to_owned(),
                },
            );
        }
    }
    Ok(())
}
