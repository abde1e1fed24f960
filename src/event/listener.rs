//! The restartable event-ingest loop (§4.3, §9 "Event-loop restart across
//! failures"): (re)subscribe, forward until error, sleep, repeat. Never
//! terminates on its own.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::metrics::MetricsSink;
use crate::orchestrator::EventSource;

use super::{translate, EntityKind, Event};

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Spawns the cooperative task described in §4.3. Returns immediately; the
/// task itself runs until `sink` is closed (the receiving half is dropped).
pub fn spawn<S>(
    source: Arc<S>,
    kind: EntityKind,
    sink: mpsc::Sender<Event>,
    metrics: Arc<dyn MetricsSink>,
) -> tokio::task::JoinHandle<()>
where
    S: EventSource + 'static,
{
    tokio::spawn(run(source, kind, sink, metrics))
}

async fn run<S>(
    source: Arc<S>,
    kind: EntityKind,
    sink: mpsc::Sender<Event>,
    metrics: Arc<dyn MetricsSink>,
) where
    S: EventSource,
{
    loop {
        let mut stream = match source.subscribe(kind).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(?kind, error = %e, "failed to subscribe to event stream, retrying");
                metrics.record_error("listener_subscribe");
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                continue;
            }
        };

        loop {
            match stream.next().await {
                Some(Ok(raw)) => {
                    if let Some(event) = translate(kind, &raw) {
                        if sink.send(event).await.is_err() {
                            info!(?kind, "event sink closed, stopping listener");
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(?kind, error = %e, "event stream error, resubscribing");
                    metrics.record_error("listener_stream");
                    break;
                }
                None => {
                    info!(?kind, "event stream ended, resubscribing");
                    break;
                }
            }
        }

        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}
