//! Docker Engine API adapter: the one concrete implementation of the
//! `EventSource` / `ServiceInspector` / `NodeInspector` traits this crate
//! ships with.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use bollard::query_parameters::{
    EventsOptions, InspectNodeOptions, InspectServiceOptions, ListNodesOptions,
    ListServicesOptions, ListTasksOptions,
};
use bollard::secret::{EventMessageTypeEnum, TaskState};
use bollard::Docker;
use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::entity::{Availability, Mode, NodeAddr, NodeState, Role};
use crate::event::{EntityKind, RawEvent};

use super::{NodeDescriptor, NodeInspector, OrchestratorError, ServiceDescriptor, ServiceInspector};

/// Label on a service that gates observation; checked by `inspect_service`
/// and `list_services` (§4.4, "Filter mismatch" in §7).
pub const NOTIFY_LABEL_ENV: &str = "DF_NOTIFY_LABEL";

pub struct DockerOrchestrator {
    docker: Docker,
    notify_label: String,
    scrape_network_label: String,
}

impl DockerOrchestrator {
    /// Connects to the daemon at `docker_host` (or the local Unix socket when
    /// `None`). Failure here is the one fatal, process-exiting error path
    /// named in §7.
    pub fn connect(docker_host: Option<&str>, notify_label: String) -> anyhow::Result<Self> {
        let docker = match docker_host {
            Some(host) => Docker::connect_with_socket(host, 120, bollard::API_DEFAULT_VERSION)?,
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(Self {
            docker,
            notify_label,
            scrape_network_label: "com.df.scrapeNetwork".to_string(),
        })
    }

    async fn resolve_node_hostname(
        &self,
        cache: &mut HashMap<String, String>,
        node_id: &str,
    ) -> anyhow::Result<String> {
        if let Some(hostname) = cache.get(node_id) {
            return Ok(hostname.clone());
        }
        let node = self
            .docker
            .inspect_node(node_id, None::<InspectNodeOptions>)
            .await?;
        let hostname = node
            .description
            .and_then(|d| d.hostname)
            .unwrap_or_else(|| node_id.to_string());
        cache.insert(node_id.to_string(), hostname.clone());
        Ok(hostname)
    }

    /// Implements §4.4's node-info enrichment: list running tasks for the
    /// service, extract each task's address on `network`, resolve the owning
    /// node to a hostname (cached per call), return the set of pairs.
    async fn node_info_for_service(
        &self,
        service_name: &str,
        network: &str,
    ) -> anyhow::Result<Option<BTreeSet<NodeAddr>>> {
        let mut filters = HashMap::new();
        filters.insert("service".to_string(), vec![service_name.to_string()]);
        filters.insert("desired-state".to_string(), vec!["running".to_string()]);

        let tasks = self
            .docker
            .list_tasks(Some(ListTasksOptions {
                filters: Some(filters),
            }))
            .await?;

        let mut result = BTreeSet::new();
        let mut hostname_cache = HashMap::new();

        for task in tasks {
            if task.status.as_ref().and_then(|s| s.state) != Some(TaskState::RUNNING) {
                continue;
            }
            let address = task
                .network_attachments
                .iter()
                .flatten()
                .find(|attach| {
                    attach
                        .network
                        .as_ref()
                        .and_then(|n| n.spec.as_ref())
                        .and_then(|s| s.name.as_ref())
                        .map(|name| name == network)
                        .unwrap_or(false)
                })
                .and_then(|attach| attach.addresses.as_ref())
                .and_then(|addrs| addrs.first())
                .map(|addr| addr.split('/').next().unwrap_or(addr).to_string());

            let (Some(address), Some(node_id)) = (address, task.node_id.as_ref()) else {
                continue;
            };
            let hostname = self
                .resolve_node_hostname(&mut hostname_cache, node_id)
                .await?;
            result.insert((hostname, address));
        }

        if result.is_empty() {
            Ok(None)
        } else {
            Ok(Some(result))
        }
    }

    fn project_service(
        &self,
        service: bollard::secret::Service,
    ) -> Option<(String, BTreeMap<String, String>, Mode, Option<String>)> {
        let labels: BTreeMap<String, String> = service
            .spec
            .as_ref()
            .and_then(|s| s.labels.clone())
            .unwrap_or_default()
            .into_iter()
            .collect();

        if !labels.contains_key(&self.notify_label) {
            return None;
        }

        let name = service.spec.as_ref().and_then(|s| s.name.clone())?;
        let mode = service
            .spec
            .as_ref()
            .and_then(|s| s.mode.as_ref())
            .map(|m| {
                if let Some(replicated) = &m.replicated {
                    Mode::Replicated {
                        replicas: replicated.replicas.unwrap_or(0) as u64,
                    }
                } else {
                    Mode::Global
                }
            })
            .unwrap_or(Mode::Global);

        let scrape_network = labels.get(&self.scrape_network_label).cloned();
        Some((name, labels, mode, scrape_network))
    }
}

#[async_trait]
impl super::EventSource for DockerOrchestrator {
    async fn subscribe(
        &self,
        kind: EntityKind,
    ) -> Result<BoxStream<'static, Result<RawEvent, OrchestratorError>>, OrchestratorError> {
        let type_filter = match kind {
            EntityKind::Service => "service",
            EntityKind::Node => "node",
        };
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec![type_filter.to_string()]);

        let stream = self.docker.events(Some(EventsOptions {
            filters: Some(filters),
            ..Default::default()
        }));

        // A Docker event message that doesn't carry enough to build a
        // `RawEvent` (no actor id, no action — common for event types this
        // listener doesn't care about) is simply skipped, not surfaced as a
        // stream error: `event::listener` treats every `Err` as cause to
        // resubscribe, which a benign, irrelevant event must never trigger.
        let mapped = stream.filter_map(|item| async move {
            match item {
                Ok(msg) => raw_event_from_message(msg).map(Ok),
                Err(e) => Some(Err(OrchestratorError::Transport(anyhow::anyhow!(e)))),
            }
        });

        Ok(Box::pin(mapped))
    }
}

fn raw_event_from_message(msg: bollard::secret::EventMessage) -> Option<RawEvent> {
    let action = msg.action?;
    let actor = msg.actor?;
    let id = actor.id?;
    let attributes = actor.attributes.unwrap_or_default();
    let time_nano = msg.time_nano.unwrap_or(0);
    let _ = msg.typ.unwrap_or(EventMessageTypeEnum::EMPTY);
    Some(RawEvent {
        action,
        id,
        attributes,
        time_nano,
    })
}

#[async_trait]
impl ServiceInspector for DockerOrchestrator {
    async fn inspect_service(
        &self,
        token: &CancellationToken,
        id: &str,
        include_node_info: bool,
    ) -> Result<Option<ServiceDescriptor>, OrchestratorError> {
        let fetch = self.docker.inspect_service(
            id,
            Some(InspectServiceOptions {
                insert_defaults: Some(true),
            }),
        );
        let service = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(OrchestratorError::Cancelled),
            result = fetch => result.map_err(|e| {
                if e.to_string().contains("404") {
                    OrchestratorError::NotFound(id.to_string())
                } else {
                    OrchestratorError::Transport(anyhow::anyhow!(e))
                }
            })?,
        };

        let Some((name, labels, mode, scrape_network)) = self.project_service(service) else {
            return Ok(None);
        };

        let node_info = if include_node_info {
            if let Some(network) = scrape_network {
                self.node_info_for_service(&name, &network)
                    .await
                    .map_err(OrchestratorError::Transport)?
            } else {
                None
            }
        } else {
            None
        };

        Ok(Some(ServiceDescriptor {
            id: id.to_string(),
            name,
            labels,
            mode,
            node_info,
        }))
    }

    async fn list_services(
        &self,
        include_node_info: bool,
    ) -> Result<Vec<ServiceDescriptor>, OrchestratorError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![self.notify_label.clone()]);

        let services = self
            .docker
            .list_services(Some(ListServicesOptions {
                filters: Some(filters),
                status: None,
            }))
            .await
            .map_err(|e| OrchestratorError::Transport(anyhow::anyhow!(e)))?;

        let mut out = Vec::with_capacity(services.len());
        for service in services {
            let Some(id) = service.id.clone() else {
                continue;
            };
            let Some((name, labels, mode, scrape_network)) = self.project_service(service) else {
                continue;
            };
            let node_info = if include_node_info {
                match scrape_network {
                    Some(network) => self
                        .node_info_for_service(&name, &network)
                        .await
                        .map_err(OrchestratorError::Transport)?,
                    None => None,
                }
            } else {
                None
            };
            out.push(ServiceDescriptor {
                id,
                name,
                labels,
                mode,
                node_info,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl NodeInspector for DockerOrchestrator {
    async fn inspect_node(
        &self,
        token: &CancellationToken,
        id: &str,
    ) -> Result<Option<NodeDescriptor>, OrchestratorError> {
        let fetch = self.docker.inspect_node(id, None::<InspectNodeOptions>);
        let node = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(OrchestratorError::Cancelled),
            result = fetch => result.map_err(|e| {
                if e.to_string().contains("404") {
                    OrchestratorError::NotFound(id.to_string())
                } else {
                    OrchestratorError::Transport(anyhow::anyhow!(e))
                }
            })?,
        };
        Ok(project_node(node))
    }

    async fn list_nodes(&self) -> Result<Vec<NodeDescriptor>, OrchestratorError> {
        let nodes = self
            .docker
            .list_nodes(None::<ListNodesOptions>)
            .await
            .map_err(|e| OrchestratorError::Transport(anyhow::anyhow!(e)))?;
        Ok(nodes.into_iter().filter_map(project_node).collect())
    }
}

fn project_node(node: bollard::secret::Node) -> Option<NodeDescriptor> {
    let id = node.id.clone()?;
    let description = node.description.clone().unwrap_or_default();
    let hostname = description.hostname.clone().unwrap_or_else(|| id.clone());
    let status = node.status.clone().unwrap_or_default();
    let spec = node.spec.clone().unwrap_or_default();

    let state = match status.state {
        Some(bollard::secret::NodeState::READY) => NodeState::Ready,
        Some(bollard::secret::NodeState::DOWN) => NodeState::Down,
        Some(other) => NodeState::Unknown(format!("{other:?}")),
        None => NodeState::Unknown("unknown".to_string()),
    };
    let role = match spec.role {
        Some(bollard::secret::NodeSpecRole::MANAGER) => Role::Manager,
        _ => Role::Worker,
    };
    let availability = match spec.availability {
        Some(bollard::secret::NodeSpecAvailability::PAUSE) => Availability::Pause,
        Some(bollard::secret::NodeSpecAvailability::DRAIN) => Availability::Drain,
        _ => Availability::Active,
    };

    let node_labels: BTreeMap<String, String> = spec.labels.unwrap_or_default().into_iter().collect();
    let engine_labels: BTreeMap<String, String> = description
        .engine
        .and_then(|e| e.labels)
        .unwrap_or_default()
        .into_iter()
        .collect();

    Some(NodeDescriptor {
        id,
        hostname,
        version_index: node.version.and_then(|v| v.index).unwrap_or(0),
        state,
        address: status.addr.unwrap_or_default(),
        node_labels,
        engine_labels,
        role,
        availability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_event_from_message_extracts_action_id_and_attributes() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), "web".to_string());
        let msg = bollard::secret::EventMessage {
            typ: Some(EventMessageTypeEnum::SERVICE),
            action: Some("create".to_string()),
            actor: Some(bollard::secret::EventActor {
                id: Some("svc1".to_string()),
                attributes: Some(attrs),
            }),
            time: None,
            time_nano: Some(42),
            scope: None,
        };
        let raw = raw_event_from_message(msg).unwrap();
        assert_eq!(raw.action, "create");
        assert_eq!(raw.id, "svc1");
        assert_eq!(raw.time_nano, 42);
        assert_eq!(raw.attributes.get("name"), Some(&"web".to_string()));
    }

    #[test]
    fn raw_event_from_message_none_without_actor_id() {
        let msg = bollard::secret::EventMessage {
            typ: Some(EventMessageTypeEnum::SERVICE),
            action: Some("create".to_string()),
            actor: Some(bollard::secret::EventActor {
                id: None,
                attributes: None,
            }),
            time: None,
            time_nano: None,
            scope: None,
        };
        assert!(raw_event_from_message(msg).is_none());
    }
}
