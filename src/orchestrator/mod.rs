//! Seam between the core pipeline and the orchestrator's cluster-state plane.
//!
//! Everything in this module is a trait: the pipeline (C4, C5, C8) is generic
//! over these contracts and never names a concrete client. `docker` supplies
//! the one production implementation, over the Docker Engine API.

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::entity::{Mode, NodeAddr};
use crate::event::{EntityKind, RawEvent};

pub mod docker;

/// Failure modes surfaced at the orchestrator seam. See §7 for the policy
/// each variant implies at the call sites in C5/C8.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("no such entity: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Long-lived subscription to the orchestrator's raw event bus.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Opens one subscription, filtered to `kind`. The returned stream ends
    /// (rather than erroring) when the daemon closes the connection cleanly;
    /// the listener loop (§4.3) treats both the same: resubscribe after a
    /// short delay.
    async fn subscribe(
        &self,
        kind: EntityKind,
    ) -> Result<BoxStream<'static, Result<RawEvent, OrchestratorError>>, OrchestratorError>;
}

/// Full service descriptor, as returned by an on-demand inspect/list call.
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    pub labels: std::collections::BTreeMap<String, String>,
    pub mode: Mode,
    /// Present only when the caller asked for node-info and the service
    /// carries a scrape-network label (§4.4).
    pub node_info: Option<BTreeSet<NodeAddr>>,
}

/// Full node descriptor, as returned by an on-demand inspect/list call.
#[derive(Clone, Debug)]
pub struct NodeDescriptor {
    pub id: String,
    pub hostname: String,
    pub version_index: u64,
    pub state: crate::entity::NodeState,
    pub address: String,
    pub node_labels: std::collections::BTreeMap<String, String>,
    pub engine_labels: std::collections::BTreeMap<String, String>,
    pub role: crate::entity::Role,
    pub availability: crate::entity::Availability,
}

/// On-demand service lookups, filtered by a configured label (§4.4).
#[async_trait]
pub trait ServiceInspector: Send + Sync {
    async fn inspect_service(
        &self,
        token: &tokio_util::sync::CancellationToken,
        id: &str,
        include_node_info: bool,
    ) -> Result<Option<ServiceDescriptor>, OrchestratorError>;

    async fn list_services(
        &self,
        include_node_info: bool,
    ) -> Result<Vec<ServiceDescriptor>, OrchestratorError>;
}

/// On-demand node lookups. No filter label — every node is observed.
#[async_trait]
pub trait NodeInspector: Send + Sync {
    async fn inspect_node(
        &self,
        token: &tokio_util::sync::CancellationToken,
        id: &str,
    ) -> Result<Option<NodeDescriptor>, OrchestratorError>;

    async fn list_nodes(&self) -> Result<Vec<NodeDescriptor>, OrchestratorError>;
}

/// The full capability set the swarm listener (C8) depends on. Blanket-implemented
/// for anything that already satisfies the three seams, so `DockerOrchestrator`
/// gets it for free and tests can compose fakes the same way.
pub trait Orchestrator: EventSource + ServiceInspector + NodeInspector {}
impl<T: EventSource + ServiceInspector + NodeInspector> Orchestrator for T {}
