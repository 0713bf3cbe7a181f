//! HTTP API: axum router wiring, shared state, and small request/response
//! glue. Route handlers live in `routers` (Router/Metric CRUD) and `scan`
//! (Scanner endpoints).

mod routers;
mod scan;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router as AxumRouter;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::registry::JobRegistry;
use crate::repository::Repository;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn Repository>,
    pub registry: JobRegistry,
    pub scheduler: Arc<Mutex<Scheduler>>,
}

pub fn build_router(state: AppState) -> AxumRouter {
    let api = AxumRouter::new()
        .route("/health", get(health))
        .route("/routers", get(routers::list).post(routers::create))
        .route(
            "/routers/:id",
            get(routers::get_one).put(routers::update).delete(routers::delete_one),
        )
        .route("/routers/:id/test-connection", post(routers::test_connection))
        .route("/routers/:id/collect-metrics", post(routers::collect_metrics))
        .route("/routers/:id/metrics", get(routers::list_metrics))
        .route("/routers/metrics/summary", get(routers::metrics_summary))
        .route(
            "/routers/metrics/config",
            get(routers::get_metrics_config).post(routers::set_metrics_config),
        )
        .route("/scanner/scan", post(scan::start_scan))
        .route("/scanner/scan/:job_id", get(scan::get_scan))
        .route("/scanner/add", post(scan::add_device))
        .route("/scanner/add-multiple", post(scan::add_multiple));

    AxumRouter::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::scheduler::{Scheduler, EVERY_5_MINUTES};

    async fn test_state() -> AppState {
        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let scheduler = Scheduler::new(repository.clone(), EVERY_5_MINUTES).await.unwrap();
        AppState { repository, registry: JobRegistry::new(), scheduler: Arc::new(Mutex::new(scheduler)) }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = build_router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn router_create_list_get_delete_round_trips() {
        let app = build_router(test_state().await);

        let create_body = json!({
            "name": "lobby-ap",
            "ipAddress": "127.0.0.1",
            "sshPort": 1,
            "username": "root",
            "password": "secret",
        });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/routers")
                    .header("content-type", "application/json")
                    .body(Body::from(create_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = body_json(response).await;
        assert_eq!(created["name"], "lobby-ap");
        assert!(created.get("credentials").is_none(), "response must not leak stored credentials");
        let id = created["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/routers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let list = body_json(response).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(Request::builder().method("DELETE").uri(format!("/api/routers/{}", id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": "router deleted" }));

        let response = app
            .oneshot(Request::builder().uri(format!("/api/routers/{}", id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_router_name_is_conflict() {
        let app = build_router(test_state().await);
        let body = |ip: &str| {
            json!({ "name": "duplicate", "ipAddress": ip, "sshPort": 1, "username": "root", "password": "secret" }).to_string()
        };

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/routers")
                    .header("content-type", "application/json")
                    .body(Body::from(body("127.0.0.1")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/routers")
                    .header("content-type", "application/json")
                    .body(Body::from(body("127.0.0.2")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    }
}
