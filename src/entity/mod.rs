//! Minified projections of services and nodes.
//!
//! A projection is the smallest comparable view of an entity that the rest of
//! the pipeline needs: enough to build notification parameters and to decide,
//! via equality, whether a re-observed entity actually changed.

use std::collections::{BTreeMap, BTreeSet};


/// Service deployment mode. Mirrors the orchestrator's own tagged union.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Replicated { replicas: u64 },
    Global,
}

impl Mode {
    /// A `Replicated` service with zero replicas and no `Global` counterpart
    /// is considered absent — it should never reach the notification pipeline.
    pub fn has_zero_replicas(&self) -> bool {
        matches!(self, Mode::Replicated { replicas: 0 })
    }
}

/// A `(hostname, address)` pair, used as a set member in `ServiceMini::node_info`.
pub type NodeAddr = (String, String);

/// Minified, comparable view of a service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceMini {
    pub id: String,
    pub name: String,
    /// Labels beginning with the configured prefix, ignore-key already excluded.
    pub labels: BTreeMap<String, String>,
    pub mode: Mode,
    pub node_info: Option<BTreeSet<NodeAddr>>,
}

/// Node availability, as reported by the orchestrator's swarm membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Availability {
    Active,
    Pause,
    Drain,
}

/// Node role within the swarm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Worker,
    Manager,
}

/// Node reachability state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeState {
    Ready,
    Down,
    Unknown(String),
}

/// Minified, comparable view of a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeMini {
    pub id: String,
    pub hostname: String,
    pub version_index: u64,
    pub state: NodeState,
    pub address: String,
    pub node_labels: BTreeMap<String, String>,
    pub engine_labels: BTreeMap<String, String>,
    pub role: Role,
    pub availability: Availability,
}

/// Keeps only labels beginning with `prefix`, stripped of it, excluding `ignore_key` verbatim
/// (compared before stripping, against the original label key).
pub fn filter_labels<'a>(
    labels: impl IntoIterator<Item = (&'a String, &'a String)>,
    prefix: &str,
    ignore_key: Option<&str>,
) -> BTreeMap<String, String> {
    labels
        .into_iter()
        .filter(|(k, _)| k.starts_with(prefix))
        .filter(|(k, _)| ignore_key != Some(k.as_str()))
        .map(|(k, v)| (k[prefix.len()..].to_string(), v.clone()))
        .collect()
}
