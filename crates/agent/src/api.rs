//! HTTP API for health checks, Prometheus metrics and metadata lookups

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use metadb::{
    health::{ComponentStatus, HealthRegistry},
    Database, NodeInfo, PodInfo, PodOwner, ServiceInfo,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub db: Arc<Database>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, db: Arc<Database>) -> Self {
        Self {
            health_registry,
            db,
        }
    }
}

/// Pod as exposed over the API, with owner metadata resolved at read time
#[derive(Debug, Serialize)]
pub struct PodView {
    pub name: String,
    pub namespace: String,
    pub node_name: String,
    pub service_name: String,
    pub deployment: Option<String>,
    pub owner: Option<PodOwner>,
    pub ips: Vec<String>,
    pub container_ids: Vec<String>,
}

impl From<&PodInfo> for PodView {
    fn from(pod: &PodInfo) -> Self {
        Self {
            name: pod.name.clone(),
            namespace: pod.namespace.clone(),
            node_name: pod.node_name.clone(),
            service_name: pod.service_name(),
            deployment: pod.deployment_name(),
            owner: pod.owner.clone(),
            ips: pod.ip_info.ips.clone(),
            container_ids: pod.container_ids.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IpLookupResponse {
    pub ip: String,
    pub host_name: String,
    pub service_name: String,
    pub service_namespace: String,
    pub pod: Option<PodView>,
    pub service: Option<ServiceInfo>,
    pub node: Option<NodeInfo>,
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving lookups
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn lookup_ip(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Json<IpLookupResponse> {
    let db = &state.db;
    let (service_name, service_namespace) = db.service_name_namespace_for_ip(&ip);

    Json(IpLookupResponse {
        host_name: db.host_name_for_ip(&ip),
        service_name,
        service_namespace,
        pod: db.pod_info_for_ip(&ip).map(|pod| PodView::from(pod.as_ref())),
        service: db.service_info_for_ip(&ip).map(|svc| svc.as_ref().clone()),
        node: db.node_info_for_ip(&ip).map(|node| node.as_ref().clone()),
        ip,
    })
}

async fn owner_pod(
    State(state): State<Arc<AppState>>,
    Path(pid_namespace): Path<u32>,
) -> Result<Json<PodView>, StatusCode> {
    state
        .db
        .owner_pod_info(pid_namespace)
        .map(|pod| Json(PodView::from(pod.as_ref())))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn add_process(State(state): State<Arc<AppState>>, Path(pid): Path<u32>) -> StatusCode {
    state.db.add_process(pid);
    StatusCode::ACCEPTED
}

async fn clean_process_caches(
    State(state): State<Arc<AppState>>,
    Path(pid_namespace): Path<u32>,
) -> StatusCode {
    state.db.clean_process_caches(pid_namespace);
    StatusCode::NO_CONTENT
}

async fn delete_container(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<String>,
) -> StatusCode {
    state.db.on_deletion(&[container_id]);
    StatusCode::NO_CONTENT
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.db.stats())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/stats", get(stats))
        .route("/v1/ips/:ip", get(lookup_ip))
        .route("/v1/namespaces/:pid_namespace/owner", get(owner_pod))
        .route(
            "/v1/namespaces/:pid_namespace/clean",
            post(clean_process_caches),
        )
        .route("/v1/processes/:pid", post(add_process))
        .route("/v1/containers/:container_id", delete(delete_container))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metadb::{
        health::components, ContainerInfo, ContainerInspector, InspectError, MemoryInformer,
        OwnerKind,
    };
    use tower::ServiceExt;

    struct OneProcess;

    impl ContainerInspector for OneProcess {
        fn info_for_pid(&self, pid: u32) -> Result<ContainerInfo, InspectError> {
            if pid == 100 {
                Ok(ContainerInfo {
                    container_id: "c1".to_string(),
                    pid_namespace: 7,
                })
            } else {
                Err(InspectError::NoContainer(pid))
            }
        }
    }

    async fn setup_test_app() -> (Router, Arc<MemoryInformer>, Arc<AppState>) {
        let health_registry = HealthRegistry::new();
        health_registry.register_all(components::ALL).await;

        let informer = Arc::new(MemoryInformer::new());
        let db = Database::start(informer.clone(), Arc::new(OneProcess)).unwrap();
        health_registry.record_database_start(Ok(())).await;

        let state = Arc::new(AppState::new(health_registry, db));
        (create_router(state.clone()), informer, state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    async fn send(app: Router, method: &str, uri: &str) -> StatusCode {
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
    }

    #[tokio::test]
    async fn test_readyz_after_database_start() {
        let (app, _informer, _state) = setup_test_app().await;

        let (status, readiness) = get_json(app, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(readiness["ready"], true);
    }

    #[tokio::test]
    async fn test_healthz_returns_503_when_informer_unhealthy() {
        let (app, _informer, state) = setup_test_app().await;
        state
            .health_registry
            .set_unhealthy(components::INFORMER, "watch stream closed")
            .await;

        let (status, health) = get_json(app, "/healthz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health["status"], "unhealthy");
        assert!(health["components"]["database"].is_object());
    }

    #[tokio::test]
    async fn test_ip_lookup_precedence() {
        let (app, informer, _state) = setup_test_app().await;
        informer.apply_pod(
            PodInfo::new("web-6d4b9-x2x", "prod")
                .with_ips(["10.0.0.5"])
                .with_owner(OwnerKind::Deployment, "web")
                .with_node_name("node-a"),
        );

        let (status, body) = get_json(app.clone(), "/v1/ips/10.0.0.5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["host_name"], "web-6d4b9-x2x");
        assert_eq!(body["service_name"], "web");
        assert_eq!(body["service_namespace"], "prod");
        assert_eq!(body["pod"]["name"], "web-6d4b9-x2x");
        assert_eq!(body["pod"]["node_name"], "node-a");
        assert!(body["service"].is_null());

        informer.apply_service(ServiceInfo::new("web", "edge").with_ips(["10.0.0.5"]));
        let (_, body) = get_json(app, "/v1/ips/10.0.0.5").await;
        assert_eq!(body["host_name"], "web");
        assert_eq!(body["service_namespace"], "edge");
    }

    #[tokio::test]
    async fn test_unknown_ip_is_empty() {
        let (app, _informer, _state) = setup_test_app().await;

        let (status, body) = get_json(app, "/v1/ips/203.0.113.1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["host_name"], "");
        assert!(body["pod"].is_null());
        assert!(body["node"].is_null());
    }

    #[tokio::test]
    async fn test_process_owner_lifecycle() {
        let (app, informer, state) = setup_test_app().await;
        informer.apply_pod(PodInfo::new("web-1", "prod").with_container_ids(["c1"]));

        let (status, _) = get_json(app.clone(), "/v1/namespaces/7/owner").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert_eq!(
            send(app.clone(), "POST", "/v1/processes/100").await,
            StatusCode::ACCEPTED
        );
        let (status, pod) = get_json(app.clone(), "/v1/namespaces/7/owner").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pod["name"], "web-1");

        assert_eq!(
            send(app.clone(), "POST", "/v1/namespaces/7/clean").await,
            StatusCode::NO_CONTENT
        );
        assert_eq!(state.db.stats().owner_pods, 0);
        assert_eq!(state.db.stats().namespaces, 1);

        assert_eq!(
            send(app.clone(), "DELETE", "/v1/containers/c1").await,
            StatusCode::NO_CONTENT
        );
        let (status, _) = get_json(app, "/v1/namespaces/7/owner").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_and_metrics_endpoints() {
        let (app, informer, _state) = setup_test_app().await;
        informer.apply_node(NodeInfo::new("node-a").with_ips(["192.168.1.10"]));

        let (status, stats) = get_json(app.clone(), "/v1/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["nodes_by_ip"], 1);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("metadb_informer_events_total"));
    }
}
