//! Event types and the raw-to-domain translation rules (§4.3).

use std::collections::HashMap;

pub mod listener;


/// Which event stream an `Event` or `RawEvent` belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Service,
    Node,
}

/// What the pipeline does with an entity after an event: create/update, or remove.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Remove,
}

/// Domain event handed from C4 to C8's per-class event loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub id: String,
    pub time_nano: i64,
}

/// The shape an orchestrator adapter (C9) hands to the translation logic
/// below. Deliberately decoupled from any particular wire format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEvent {
    pub action: String,
    pub id: String,
    pub attributes: HashMap<String, String>,
    pub time_nano: i64,
}

/// Translates a raw orchestrator event into a domain `Event`, applying the
/// noise filters from §4.3. Returns `None` when the event should be dropped.
pub fn translate(kind: EntityKind, raw: &RawEvent) -> Option<Event> {
    match kind {
        EntityKind::Service => {
            if raw.attributes.contains_key("updatestate.new") {
                return None;
            }
        }
        EntityKind::Node => {
            if !raw.attributes.contains_key("name") {
                return None;
            }
        }
    }

    let event_kind = if raw.action == "remove" {
        EventKind::Remove
    } else {
        EventKind::Create
    };

    Some(Event {
        kind: event_kind,
        id: raw.id.clone(),
        time_nano: raw.time_nano,
    })
}
