use std::sync::Arc;

use anyhow::Result;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use swarm_listener::api::{create_admin_router, AdminAppState};
use swarm_listener::config::Config;
use swarm_listener::metrics::{CountingMetrics, MetricsSink};
use swarm_listener::notify::distributor::NotifyDistributor;
use swarm_listener::orchestrator::docker::DockerOrchestrator;
use swarm_listener::orchestrator::Orchestrator;
use swarm_listener::swarm::SwarmListener;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "swarm_listener=info".into()),
        )
        .init();

    let config = Config::from_env();
    info!("docker-flow-swarm-listener starting");

    let counting_metrics = Arc::new(CountingMetrics::new());
    let metrics: Arc<dyn MetricsSink> = Arc::clone(&counting_metrics);

    let orchestrator = DockerOrchestrator::connect(config.docker_host.as_deref(), config.notify_label.clone())?;
    let orchestrator: Arc<dyn Orchestrator> = Arc::new(orchestrator);
    info!("connected to the orchestrator");

    let listener = SwarmListener::new(
        Arc::clone(&orchestrator),
        config.notify_label.clone(),
        config.include_node_ip_info,
        Arc::clone(&metrics),
    );

    let distributor = NotifyDistributor::new(
        config.endpoint_urls.clone(),
        config.notifier_defaults.retries,
        config.notifier_defaults.retry_interval,
        Arc::clone(&metrics),
    );
    let has_service_listeners = distributor.has_service_listeners();
    let has_node_listeners = distributor.has_node_listeners();

    let (service_tx, service_rx) = tokio::sync::mpsc::channel(256);
    let (node_tx, node_rx) = tokio::sync::mpsc::channel(256);

    let mut handles = listener.spawn(service_tx.clone(), node_tx.clone(), has_service_listeners, has_node_listeners);

    listener
        .notify_all(false, &service_tx, &node_tx, has_service_listeners, has_node_listeners)
        .await;
    info!("startup reconciliation sweep complete");

    if !config.sweep_interval.is_zero() {
        handles.push(listener.spawn_periodic_sweep(
            config.sweep_interval,
            service_tx,
            node_tx,
            has_service_listeners,
            has_node_listeners,
        ));
    } else {
        drop(service_tx);
        drop(node_tx);
    }

    handles.extend(distributor.run(service_rx, node_rx));

    let admin_state = AdminAppState {
        views: listener.views(),
        metrics: counting_metrics,
    };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET])
        .allow_headers([axum::http::header::CONTENT_TYPE]);
    let app = create_admin_router(admin_state).layer(cors);

    info!(addr = %config.admin_bind, "starting admin HTTP surface");
    let tcp_listener = tokio::net::TcpListener::bind(&config.admin_bind).await?;
    axum::serve(tcp_listener, app).await?;

    Ok(())
}
