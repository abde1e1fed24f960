//! Top-level wiring (C8): owns the per-class event loops, the projection
//! caches, the cache-admin views, and the startup/periodic reconciliation
//! sweep ("notify-all").

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::DedupCache;
use crate::cancel::{CancelManager, ReqSeq};
use crate::entity::{filter_labels, NodeMini, ServiceMini};
use crate::event::{self, EntityKind, Event, EventKind};
use crate::metrics::MetricsSink;
use crate::notify::{encode_query_string, params, Notification};
use crate::orchestrator::{NodeDescriptor, Orchestrator, OrchestratorError, ServiceDescriptor};


const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Read-only, cloneable views of the live caches, handed to the admin HTTP
/// surface (C11) so it never touches the single-writer caches directly.
#[derive(Clone)]
pub struct CacheViews {
    pub services: Arc<DashMap<String, ServiceMini>>,
    pub nodes: Arc<DashMap<String, NodeMini>>,
}

/// Per-entity-class state shared between the event loop and the per-event
/// fetch tasks it spawns. `cache` stays logically single-writer — the mutex
/// only serializes the brief dedup check, never the network fetch that
/// precedes it.
struct ClassState<P> {
    cache: Mutex<DedupCache<String, P>>,
    view: Arc<DashMap<String, P>>,
    fetch_cancel: CancelManager,
}

impl<P> ClassState<P> {
    fn new() -> Self {
        Self {
            cache: Mutex::new(DedupCache::new()),
            view: Arc::new(DashMap::new()),
            fetch_cancel: CancelManager::new(),
        }
    }
}

/// Wires C4 (event listener) through C2/C3 (cache, cancel manager) into C7's
/// input channels. Cheaply cloneable — every field is an `Arc`.
#[derive(Clone)]
pub struct SwarmListener {
    orchestrator: Arc<dyn Orchestrator>,
    notify_label: Arc<str>,
    include_node_info: bool,
    req_seq: Arc<ReqSeq>,
    metrics: Arc<dyn MetricsSink>,
    service_state: Arc<ClassState<ServiceMini>>,
    node_state: Arc<ClassState<NodeMini>>,
}

impl SwarmListener {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        notify_label: String,
        include_node_info: bool,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            orchestrator,
            notify_label: Arc::from(notify_label),
            include_node_info,
            req_seq: Arc::new(ReqSeq::new()),
            metrics,
            service_state: Arc::new(ClassState::new()),
            node_state: Arc::new(ClassState::new()),
        }
    }

    pub fn views(&self) -> CacheViews {
        CacheViews {
            services: Arc::clone(&self.service_state.view),
            nodes: Arc::clone(&self.node_state.view),
        }
    }

    /// Starts the event listener(s) (C4) and the per-class processing loops.
    /// A class with no configured downstream listeners gets neither — saves
    /// the subscription entirely (§4.7).
    pub fn spawn(
        &self,
        service_out: mpsc::Sender<Notification>,
        node_out: mpsc::Sender<Notification>,
        has_service_listeners: bool,
        has_node_listeners: bool,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if has_service_listeners {
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            handles.push(event::listener::spawn(
                Arc::clone(&self.orchestrator),
                EntityKind::Service,
                tx,
                Arc::clone(&self.metrics),
            ));
            handles.push(tokio::spawn(service_loop(
                Arc::clone(&self.orchestrator),
                rx,
                service_out,
                Arc::clone(&self.notify_label),
                self.include_node_info,
                Arc::clone(&self.req_seq),
                Arc::clone(&self.metrics),
                Arc::clone(&self.service_state),
            )));
        }

        if has_node_listeners {
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            handles.push(event::listener::spawn(
                Arc::clone(&self.orchestrator),
                EntityKind::Node,
                tx,
                Arc::clone(&self.metrics),
            ));
            handles.push(tokio::spawn(node_loop(
                Arc::clone(&self.orchestrator),
                rx,
                node_out,
                Arc::clone(&self.req_seq),
                Arc::clone(&self.metrics),
                Arc::clone(&self.node_state),
            )));
        }

        handles
    }

    /// `notifyAll(useCache)` (§4.7). Enumerates every entity currently known
    /// to the orchestrator and, when `use_cache` is false, force-emits a
    /// create notification regardless of what the dedup cache says — used
    /// once at startup. When `use_cache` is true the normal dedup gate
    /// applies — used by the periodic sweep.
    pub async fn notify_all(
        &self,
        use_cache: bool,
        service_out: &mpsc::Sender<Notification>,
        node_out: &mpsc::Sender<Notification>,
        has_service_listeners: bool,
        has_node_listeners: bool,
    ) {
        if has_service_listeners {
            match self.orchestrator.list_services(self.include_node_info).await {
                Ok(services) => {
                    for service in &services {
                        let seq = self.req_seq.next();
                        project_check_and_emit_service(
                            &self.service_state,
                            service,
                            &self.notify_label,
                            seq,
                            !use_cache,
                            service_out,
                        )
                        .await;
                    }
                }
                Err(e) => warn!(error = %e, "sweep: failed to list services"),
            }
        }
        if has_node_listeners {
            match self.orchestrator.list_nodes().await {
                Ok(nodes) => {
                    for node in &nodes {
                        let seq = self.req_seq.next();
                        project_check_and_emit_node(&self.node_state, node, seq, !use_cache, node_out).await;
                    }
                }
                Err(e) => warn!(error = %e, "sweep: failed to list nodes"),
            }
        }
    }

    /// Spawns the periodic `notifyAll(useCache=true)` task (§9's `DF_INTERVAL`
    /// resolution). The caller is expected to have already run the startup
    /// sweep, so the first tick is consumed without sweeping again.
    pub fn spawn_periodic_sweep(
        &self,
        interval: Duration,
        service_out: mpsc::Sender<Notification>,
        node_out: mpsc::Sender<Notification>,
        has_service_listeners: bool,
        has_node_listeners: bool,
    ) -> JoinHandle<()> {
        let listener = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                listener
                    .notify_all(true, &service_out, &node_out, has_service_listeners, has_node_listeners)
                    .await;
            }
        })
    }
}

async fn service_loop(
    orchestrator: Arc<dyn Orchestrator>,
    mut events: mpsc::Receiver<Event>,
    out: mpsc::Sender<Notification>,
    notify_label: Arc<str>,
    include_node_info: bool,
    req_seq: Arc<ReqSeq>,
    metrics: Arc<dyn MetricsSink>,
    state: Arc<ClassState<ServiceMini>>,
) {
    while let Some(event) = events.recv().await {
        let orchestrator = Arc::clone(&orchestrator);
        let out = out.clone();
        let notify_label = Arc::clone(&notify_label);
        let req_seq = Arc::clone(&req_seq);
        let metrics = Arc::clone(&metrics);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            handle_service_event(
                &orchestrator,
                &state,
                event,
                &notify_label,
                include_node_info,
                &req_seq,
                &out,
                &metrics,
            )
            .await;
        });
    }
    info!("service event channel closed, stopping event loop");
}

async fn node_loop(
    orchestrator: Arc<dyn Orchestrator>,
    mut events: mpsc::Receiver<Event>,
    out: mpsc::Sender<Notification>,
    req_seq: Arc<ReqSeq>,
    metrics: Arc<dyn MetricsSink>,
    state: Arc<ClassState<NodeMini>>,
) {
    while let Some(event) = events.recv().await {
        let orchestrator = Arc::clone(&orchestrator);
        let out = out.clone();
        let req_seq = Arc::clone(&req_seq);
        let metrics = Arc::clone(&metrics);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            handle_node_event(&orchestrator, &state, event, &req_seq, &out, &metrics).await;
        });
    }
    info!("node event channel closed, stopping event loop");
}

/// One short-lived task per received service event (§5): fetch (cancellable,
/// superseded by a newer event for the same id), project, dedup-check, emit.
async fn handle_service_event(
    orchestrator: &Arc<dyn Orchestrator>,
    state: &ClassState<ServiceMini>,
    event: Event,
    notify_label: &str,
    include_node_info: bool,
    req_seq: &ReqSeq,
    out: &mpsc::Sender<Notification>,
    metrics: &Arc<dyn MetricsSink>,
) {
    match event.kind {
        EventKind::Remove => {
            let (removed, existed) = state.cache.lock().get_and_remove(&event.id);
            if !existed {
                return;
            }
            state.view.remove(&event.id);
            let Some(mini) = removed else { return };
            let query = encode_query_string(&params::service_remove_params(&mini.name));
            let notification = Notification {
                kind: EventKind::Remove,
                id: event.id.clone(),
                parameters: query,
                req_seq: req_seq.next(),
            };
            if out.send(notification).await.is_err() {
                warn!(id = %event.id, "distributor input closed, dropping remove notification");
            }
        }
        EventKind::Create => {
            let seq = req_seq.next();
            let token = state.fetch_cancel.add(&event.id, seq);
            let result = orchestrator
                .inspect_service(&token, &event.id, include_node_info)
                .await;
            state.fetch_cancel.delete(&event.id, seq);

            let service = match result {
                Ok(Some(service)) => service,
                Ok(None) => return,
                Err(OrchestratorError::Cancelled) => {
                    info!(id = %event.id, "service inspect superseded by a newer event");
                    return;
                }
                Err(e) => {
                    warn!(id = %event.id, error = %e, "failed to inspect service");
                    metrics.record_error("swarm_inspect_service");
                    return;
                }
            };

            project_check_and_emit_service(state, &service, notify_label, seq, false, out).await;
        }
    }
}

async fn handle_node_event(
    orchestrator: &Arc<dyn Orchestrator>,
    state: &ClassState<NodeMini>,
    event: Event,
    req_seq: &ReqSeq,
    out: &mpsc::Sender<Notification>,
    metrics: &Arc<dyn MetricsSink>,
) {
    match event.kind {
        EventKind::Remove => {
            let (removed, existed) = state.cache.lock().get_and_remove(&event.id);
            if !existed {
                return;
            }
            state.view.remove(&event.id);
            let Some(mini) = removed else { return };
            let query = encode_query_string(&params::node_mini_params(&mini));
            let notification = Notification {
                kind: EventKind::Remove,
                id: event.id.clone(),
                parameters: query,
                req_seq: req_seq.next(),
            };
            if out.send(notification).await.is_err() {
                warn!(id = %event.id, "distributor input closed, dropping remove notification");
            }
        }
        EventKind::Create => {
            let seq = req_seq.next();
            let token = state.fetch_cancel.add(&event.id, seq);
            let result = orchestrator.inspect_node(&token, &event.id).await;
            state.fetch_cancel.delete(&event.id, seq);

            let node = match result {
                Ok(Some(node)) => node,
                Ok(None) => return,
                Err(OrchestratorError::Cancelled) => {
                    info!(id = %event.id, "node inspect superseded by a newer event");
                    return;
                }
                Err(e) => {
                    warn!(id = %event.id, error = %e, "failed to inspect node");
                    metrics.record_error("swarm_inspect_node");
                    return;
                }
            };

            project_check_and_emit_node(state, &node, seq, false, out).await;
        }
    }
}

fn project_service_mini(service: &ServiceDescriptor, notify_label: &str) -> ServiceMini {
    ServiceMini {
        id: service.id.clone(),
        // Short-name stripping (§6) applied here, while the raw
        // `com.docker.stack.namespace` label is still in scope — it is not
        // `com.df.`-prefixed, so it never survives into `labels` below. This
        // is the only chance to apply the rule before a later remove event
        // only has this projection to work from.
        name: params::short_service_name(service),
        labels: filter_labels(service.labels.iter(), params::DF_PREFIX, Some(notify_label)),
        mode: service.mode.clone(),
        node_info: service.node_info.clone(),
    }
}

fn project_node_mini(node: &NodeDescriptor) -> NodeMini {
    NodeMini {
        id: node.id.clone(),
        hostname: node.hostname.clone(),
        version_index: node.version_index,
        state: node.state.clone(),
        address: node.address.clone(),
        node_labels: filter_labels(node.node_labels.iter(), params::DF_PREFIX, None),
        engine_labels: filter_labels(node.engine_labels.iter(), params::DF_PREFIX, None),
        role: node.role,
        availability: node.availability,
    }
}

/// Projects, dedup-checks, and (if changed or `force`) emits a create
/// notification for a service. Shared by the event path and the sweep.
async fn project_check_and_emit_service(
    state: &ClassState<ServiceMini>,
    service: &ServiceDescriptor,
    notify_label: &str,
    seq: i64,
    force: bool,
    out: &mpsc::Sender<Notification>,
) {
    let mini = project_service_mini(service, notify_label);

    // A forced sweep (`notify_all(useCache=false)`, the startup reconciliation)
    // never writes the dedup cache — mirroring the original bypass sweep,
    // which never touched its cache either — so it can't mask a real change
    // that a later dedup-gated event would otherwise catch.
    let should_emit = if force {
        true
    } else {
        state.cache.lock().insert_and_check(service.id.clone(), mini.clone())
    };
    if !should_emit {
        return;
    }
    state.view.insert(service.id.clone(), mini);

    let Some(params_map) = params::service_create_params(service, notify_label) else {
        return;
    };
    let query = encode_query_string(&params_map);
    let notification = Notification {
        kind: EventKind::Create,
        id: service.id.clone(),
        parameters: query,
        req_seq: seq,
    };
    if out.send(notification).await.is_err() {
        warn!(id = %service.id, "distributor input closed, dropping create notification");
    }
}

async fn project_check_and_emit_node(
    state: &ClassState<NodeMini>,
    node: &NodeDescriptor,
    seq: i64,
    force: bool,
    out: &mpsc::Sender<Notification>,
) {
    let mini = project_node_mini(node);

    let should_emit = if force {
        true
    } else {
        state.cache.lock().insert_and_check(node.id.clone(), mini.clone())
    };
    if !should_emit {
        return;
    }
    state.view.insert(node.id.clone(), mini);

    let params_map = params::node_params(node);
    let query = encode_query_string(&params_map);
    let notification = Notification {
        kind: EventKind::Create,
        id: node.id.clone(),
        parameters: query,
        req_seq: seq,
    };
    if out.send(notification).await.is_err() {
        warn!(id = %node.id, "distributor input closed, dropping create notification");
    }
}
