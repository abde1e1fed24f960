//! Read-only admin HTTP surface (C11): liveness, the current contents of the
//! two dedup caches rendered the same query-parameter shape the notifier
//! sends downstream (§6), and the error-counter snapshot from C12. The
//! short-name rewrite (§6) is reproduced faithfully here because the swarm
//! listener bakes it into `ServiceMini::name` at observation time, while the
//! raw `com.docker.stack.namespace` label is still in scope.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;

use crate::entity::{Mode, ServiceMini};
use crate::metrics::CountingMetrics;
use crate::notify::params;
use crate::swarm::CacheViews;

#[derive(Clone)]
pub struct AdminAppState {
    pub views: CacheViews,
    pub metrics: Arc<CountingMetrics>,
}

#[derive(Serialize)]
struct EntityView {
    id: String,
    parameters: BTreeMap<String, String>,
}

pub fn create_admin_router(state: AdminAppState) -> Router {
    Router::new()
        .route("/v1/docker-flow-swarm-listener/ping", get(ping))
        .route("/v1/docker-flow-swarm-listener/services", get(list_services))
        .route("/v1/docker-flow-swarm-listener/nodes", get(list_nodes))
        .route("/v1/docker-flow-swarm-listener/metrics", get(metrics))
        .with_state(Arc::new(state))
}

async fn ping() -> &'static str {
    "OK"
}

async fn list_services(State(state): State<Arc<AdminAppState>>) -> Json<Vec<EntityView>> {
    let views = state
        .views
        .services
        .iter()
        .map(|entry| EntityView {
            id: entry.key().clone(),
            parameters: service_view_params(entry.value()),
        })
        .collect();
    Json(views)
}

async fn list_nodes(State(state): State<Arc<AdminAppState>>) -> Json<Vec<EntityView>> {
    let views = state
        .views
        .nodes
        .iter()
        .map(|entry| EntityView {
            id: entry.key().clone(),
            parameters: params::node_mini_params(entry.value()),
        })
        .collect();
    Json(views)
}

async fn metrics(State(state): State<Arc<AdminAppState>>) -> Json<std::collections::HashMap<String, u64>> {
    Json(state.metrics.snapshot())
}

fn service_view_params(mini: &ServiceMini) -> BTreeMap<String, String> {
    let mut params = mini.labels.clone();
    params.insert("serviceName".to_string(), mini.name.clone());

    if let Mode::Replicated { replicas } = mini.mode {
        params.insert("replicas".to_string(), replicas.to_string());
    }
    params
        .entry("distribute".to_string())
        .or_insert_with(|| "true".to_string());

    if let Some(node_info) = &mini.node_info {
        let pairs: Vec<[String; 2]> = node_info.iter().map(|(n, a)| [n.clone(), a.clone()]).collect();
        if let Ok(json) = serde_json::to_string(&pairs) {
            params.insert("nodeInfo".to_string(), json);
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use dashmap::DashMap;
    use tower::ServiceExt;

    fn empty_views() -> CacheViews {
        CacheViews {
            services: Arc::new(DashMap::new()),
            nodes: Arc::new(DashMap::new()),
        }
    }

    fn test_state(views: CacheViews) -> AdminAppState {
        AdminAppState {
            views,
            metrics: Arc::new(CountingMetrics::new()),
        }
    }

    #[tokio::test]
    async fn ping_returns_200() {
        let app = create_admin_router(test_state(empty_views()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/docker-flow-swarm-listener/ping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn services_reflects_cache_contents() {
        let views = empty_views();
        views.services.insert(
            "S1".to_string(),
            ServiceMini {
                id: "S1".to_string(),
                name: "web".to_string(),
                labels: BTreeMap::new(),
                mode: Mode::Replicated { replicas: 2 },
                node_info: None,
            },
        );
        let app = create_admin_router(test_state(views));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/docker-flow-swarm-listener/services")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed[0]["parameters"]["serviceName"], "web");
        assert_eq!(parsed[0]["parameters"]["replicas"], "2");
    }

    #[tokio::test]
    async fn metrics_reflects_recorded_counts() {
        let metrics = Arc::new(CountingMetrics::new());
        metrics.record_error("swarm_inspect_service");
        let app = create_admin_router(AdminAppState {
            views: empty_views(),
            metrics,
        });

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/docker-flow-swarm-listener/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["swarm_inspect_service"], 1);
    }
}
