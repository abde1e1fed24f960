//! Notify distributor (C7): shards notifications per destination host and
//! fans each class out through one dispatcher task per endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;

use crate::cancel::CancelManager;
use crate::event::EventKind;
use crate::metrics::MetricsSink;

use super::notifier::{NotifierError, NotifyType, Notifier};
use super::Notification;

const ENDPOINT_QUEUE_CAPACITY: usize = 64;

struct Endpoint {
    host: String,
    service_notifier: Option<Notifier>,
    node_notifier: Option<Notifier>,
    service_sender: Option<mpsc::Sender<Notification>>,
    service_receiver: Option<mpsc::Receiver<Notification>>,
    node_sender: Option<mpsc::Sender<Notification>>,
    node_receiver: Option<mpsc::Receiver<Notification>>,
}

/// Owns every destination host's endpoint plus the two cancel managers that
/// implement the supersession interleave described in §4.6.
pub struct NotifyDistributor {
    endpoints: Vec<Endpoint>,
    service_cancel: Arc<CancelManager>,
    node_cancel: Arc<CancelManager>,
    metrics: Arc<dyn MetricsSink>,
}

/// The four comma-separated URL lists §6 describes, already resolved through
/// the fallback-variable chain by the configuration layer.
#[derive(Clone, Debug, Default)]
pub struct EndpointUrls {
    pub service_create: Vec<String>,
    pub service_remove: Vec<String>,
    pub node_create: Vec<String>,
    pub node_remove: Vec<String>,
}

#[derive(Default)]
struct HostUrls {
    service_create: Option<String>,
    service_remove: Option<String>,
    node_create: Option<String>,
    node_remove: Option<String>,
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

impl NotifyDistributor {
    pub fn new(
        urls: EndpointUrls,
        retries: u32,
        interval: Duration,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let mut by_host: HashMap<String, HostUrls> = HashMap::new();

        for url in &urls.service_create {
            if let Some(host) = host_of(url) {
                by_host.entry(host).or_default().service_create = Some(url.clone());
            }
        }
        for url in &urls.service_remove {
            if let Some(host) = host_of(url) {
                by_host.entry(host).or_default().service_remove = Some(url.clone());
            }
        }
        for url in &urls.node_create {
            if let Some(host) = host_of(url) {
                by_host.entry(host).or_default().node_create = Some(url.clone());
            }
        }
        for url in &urls.node_remove {
            if let Some(host) = host_of(url) {
                by_host.entry(host).or_default().node_remove = Some(url.clone());
            }
        }

        let mut endpoints = Vec::new();
        for (host, hu) in by_host {
            let service_notifier = if hu.service_create.is_some() || hu.service_remove.is_some() {
                match Notifier::new(
                    hu.service_create,
                    hu.service_remove,
                    NotifyType::Service,
                    retries,
                    interval,
                ) {
                    Ok(n) => Some(n),
                    Err(e) => {
                        warn!(%host, error = %e, "omitting service endpoint: unparseable URL");
                        None
                    }
                }
            } else {
                None
            };
            let node_notifier = if hu.node_create.is_some() || hu.node_remove.is_some() {
                match Notifier::new(hu.node_create, hu.node_remove, NotifyType::Node, retries, interval) {
                    Ok(n) => Some(n),
                    Err(e) => {
                        warn!(%host, error = %e, "omitting node endpoint: unparseable URL");
                        None
                    }
                }
            } else {
                None
            };

            let (service_sender, service_receiver) = if service_notifier.is_some() {
                let (tx, rx) = mpsc::channel(ENDPOINT_QUEUE_CAPACITY);
                (Some(tx), Some(rx))
            } else {
                (None, None)
            };
            let (node_sender, node_receiver) = if node_notifier.is_some() {
                let (tx, rx) = mpsc::channel(ENDPOINT_QUEUE_CAPACITY);
                (Some(tx), Some(rx))
            } else {
                (None, None)
            };

            endpoints.push(Endpoint {
                host,
                service_notifier,
                node_notifier,
                service_sender,
                service_receiver,
                node_sender,
                node_receiver,
            });
        }

        Self {
            endpoints,
            service_cancel: Arc::new(CancelManager::new()),
            node_cancel: Arc::new(CancelManager::new()),
            metrics,
        }
    }

    pub fn has_service_listeners(&self) -> bool {
        self.endpoints.iter().any(|e| e.service_notifier.is_some())
    }

    pub fn has_node_listeners(&self) -> bool {
        self.endpoints.iter().any(|e| e.node_notifier.is_some())
    }

    /// Starts one dispatcher task per endpoint per class, plus one
    /// multiplexer task per class that copies from the global streams into
    /// every endpoint's queue (bounded-blocking send — §5 back-pressure).
    pub fn run(
        mut self,
        mut service_stream: mpsc::Receiver<Notification>,
        mut node_stream: mpsc::Receiver<Notification>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        let mut service_senders = Vec::new();
        let mut node_senders = Vec::new();

        for endpoint in self.endpoints.drain(..) {
            let Endpoint {
                host,
                service_notifier,
                node_notifier,
                service_sender,
                service_receiver,
                node_sender,
                node_receiver,
            } = endpoint;

            if let (Some(notifier), Some(sender), Some(receiver)) =
                (service_notifier, service_sender, service_receiver)
            {
                service_senders.push(sender);
                handles.push(tokio::spawn(dispatch(
                    host.clone(),
                    notifier,
                    receiver,
                    Arc::clone(&self.service_cancel),
                    Arc::clone(&self.metrics),
                )));
            }
            if let (Some(notifier), Some(sender), Some(receiver)) =
                (node_notifier, node_sender, node_receiver)
            {
                node_senders.push(sender);
                handles.push(tokio::spawn(dispatch(
                    host,
                    notifier,
                    receiver,
                    Arc::clone(&self.node_cancel),
                    Arc::clone(&self.metrics),
                )));
            }
        }

        handles.push(tokio::spawn(multiplex(service_stream, service_senders)));
        let _ = &mut node_stream;
        handles.push(tokio::spawn(multiplex(node_stream, node_senders)));

        handles
    }
}

/// Copies every notification from `source` into every endpoint sender.
/// A full endpoint queue blocks this task, which in turn blocks whatever
/// upstream producer is feeding `source` — the intended back-pressure.
async fn multiplex(mut source: mpsc::Receiver<Notification>, sinks: Vec<mpsc::Sender<Notification>>) {
    while let Some(notification) = source.recv().await {
        for sink in &sinks {
            if sink.send(notification.clone()).await.is_err() {
                warn!("endpoint queue closed, dropping notification for it");
            }
        }
    }
}

/// One endpoint's worker: applies the cancellation interleave from §4.6
/// around every notifier call.
async fn dispatch(
    host: String,
    notifier: Notifier,
    mut queue: mpsc::Receiver<Notification>,
    cancel: Arc<CancelManager>,
    metrics: Arc<dyn MetricsSink>,
) {
    while let Some(notification) = queue.recv().await {
        let token = cancel.add(&notification.id, notification.req_seq);

        let result = match notification.kind {
            EventKind::Create => {
                notifier
                    .create(&token, &notification.parameters, metrics.as_ref())
                    .await
            }
            EventKind::Remove => {
                notifier
                    .remove(&token, &notification.parameters, metrics.as_ref())
                    .await
            }
        };

        cancel.delete(&notification.id, notification.req_seq);

        match result {
            Ok(()) => {
                info!(%host, id = %notification.id, kind = ?notification.kind, "notification delivered");
            }
            Err(NotifierError::Cancelled) => {
                info!(%host, id = %notification.id, "notification superseded, cancelled");
            }
            Err(e) => {
                warn!(%host, id = %notification.id, error = %e, "notification delivery exhausted retries");
            }
        }
    }
}
