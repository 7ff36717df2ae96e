use anyhow::{Context, Result};
use std::time::Duration;

use axum::{
    extract::State, middleware, response::IntoResponse, routing::get, Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::events::event_routes;
use super::queue_routes::queue_routes;
use super::request_routes::request_routes;
use super::{log_requests, state::ServerState};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub checker_running: bool,
    pub subscribers: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        checker_running: state.checker.status().is_running,
        subscribers: state.updates.subscriber_count(),
    };
    Json(stats)
}

pub fn make_app(state: ServerState) -> Router {
    let v1_routes: Router = Router::new()
        .nest("/queue", queue_routes())
        .nest("/requests", request_routes())
        .merge(event_routes())
        .with_state(state.clone());

    let home_router: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone());

    home_router.nest("/v1", v1_routes).layer(middleware::from_fn_with_state(
        state.config.requests_logging_level.clone(),
        log_requests,
    ))
}

/// Serve the HTTP API until `shutdown` fires.
pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_source::{
        ContentFetcher, ContentSearch, FetchRequest, FetchedFile, SearchQuery, SearchResult,
        SourceError,
    };
    use crate::download_queue::{
        DownloadRecordStore, DownloadStatus, QueueEngine, RetryPolicy, SqliteDownloadRecordStore,
    };
    use crate::notifications::{NoopNotifier, NotificationService};
    use crate::requests::{RequestChecker, RequestManager, SqliteRequestStore};
    use crate::server::ServerConfig;
    use crate::updates::UpdateBroadcaster;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use std::time::Instant;
    use tower::ServiceExt; // for `oneshot`

    struct OneHitSearch;

    #[async_trait]
    impl ContentSearch for OneHitSearch {
        async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SourceError> {
            Ok(vec![SearchResult {
                fingerprint: format!("fp{}", query.query),
                title: Some(query.query.clone()),
                authors: vec![],
                year: None,
                format: Some("epub".to_string()),
            }])
        }
    }

    struct NeverFetcher;

    #[async_trait]
    impl ContentFetcher for NeverFetcher {
        async fn fetch(
            &self,
            request: &FetchRequest,
            _cancel: CancellationToken,
        ) -> Result<FetchedFile, SourceError> {
            Err(SourceError::NotFound(request.fingerprint.clone()))
        }
    }

    fn make_state() -> (ServerState, Arc<SqliteDownloadRecordStore>) {
        let downloads = Arc::new(SqliteDownloadRecordStore::in_memory().unwrap());
        let request_store = Arc::new(SqliteRequestStore::in_memory().unwrap());
        let updates = Arc::new(UpdateBroadcaster::new(
            downloads.clone(),
            request_store.clone(),
        ));
        let notifications = Arc::new(NotificationService::new(Arc::new(NoopNotifier)));
        let queue = Arc::new(QueueEngine::new(
            downloads.clone(),
            Arc::new(NeverFetcher),
            updates.clone(),
            notifications.clone(),
            RetryPolicy::default(),
        ));
        let requests = Arc::new(RequestManager::new(request_store, updates.clone()));
        let checker = Arc::new(RequestChecker::new(
            requests.clone(),
            queue.clone(),
            Arc::new(OneHitSearch),
            notifications,
            Duration::ZERO,
        ));
        let state = ServerState {
            config: ServerConfig {
                requests_logging_level: crate::server::RequestsLoggingLevel::None,
                ..Default::default()
            },
            start_time: Instant::now(),
            queue,
            requests,
            checker,
            updates,
            hash: "test".to_string(),
        };
        (state, downloads)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 01:01:01");
    }

    #[tokio::test]
    async fn home_reports_hash() {
        let (state, _) = make_state();
        let app = make_app(state);

        let response = app.oneshot(empty_request("GET", "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["hash"], "test");
        assert_eq!(body["checker_running"], false);
    }

    #[tokio::test]
    async fn enqueue_twice_reports_position() {
        let (state, _) = make_state();
        let app = make_app(state);
        let body = serde_json::json!({
            "fingerprint": "5d41402abc4b2a76b9719d911017c592",
            "title": "Hello",
        });

        let response = app
            .clone()
            .oneshot(json_request("POST", "/v1/queue", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"status": "queued", "position": 1})
        );

        let response = app
            .oneshot(json_request("POST", "/v1/queue", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"status": "already_in_queue", "position": 1})
        );
    }

    #[tokio::test]
    async fn queue_errors_map_to_status_codes() {
        let (state, _) = make_state();
        let app = make_app(state);

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/v1/queue/missing"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/v1/queue/missing/retry"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        app.clone()
            .oneshot(json_request(
                "POST",
                "/v1/queue",
                serde_json::json!({"fingerprint": "abc"}),
            ))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(empty_request("POST", "/v1/queue/abc/retry"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("queued"));

        let response = app
            .oneshot(json_request(
                "POST",
                "/v1/queue",
                serde_json::json!({"fingerprint": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancel_and_delete_report_outcome() {
        let (state, downloads) = make_state();
        let app = make_app(state);
        app.clone()
            .oneshot(json_request(
                "POST",
                "/v1/queue",
                serde_json::json!({"fingerprint": "abc"}),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/v1/queue/abc/cancel"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["cancelled"], true);
        assert_eq!(
            downloads.get("abc").unwrap().unwrap().status,
            DownloadStatus::Cancelled
        );

        let response = app
            .clone()
            .oneshot(empty_request("POST", "/v1/queue/abc/cancel"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["cancelled"], false);

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", "/v1/queue/abc"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["deleted"], true);

        let response = app
            .oneshot(empty_request("DELETE", "/v1/queue/abc"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["deleted"], false);
    }

    #[tokio::test]
    async fn request_lifecycle_over_http() {
        let (state, downloads) = make_state();
        let app = make_app(state);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1/requests",
                serde_json::json!({"query": "Solaris"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1/requests",
                serde_json::json!({"query": "Solaris"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(empty_request("POST", &format!("/v1/requests/{}/check", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["result"], "fulfilled");
        assert_eq!(body["fingerprint"], "fpSolaris");
        assert_eq!(body["queue"]["status"], "queued");
        assert!(downloads.get("fpSolaris").unwrap().is_some());

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/v1/requests/{}", id)))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "fulfilled");

        // fulfilled is terminal
        let response = app
            .oneshot(empty_request("POST", &format!("/v1/requests/{}/cancel", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn checker_status_and_trigger() {
        let (state, _) = make_state();
        let app = make_app(state);

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/v1/requests/checker/status"))
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"is_running": false})
        );

        let response = app
            .oneshot(empty_request("POST", "/v1/requests/check"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn events_stream_is_sse() {
        let (state, _) = make_state();
        let app = make_app(state);

        let response = app
            .oneshot(empty_request("GET", "/v1/events"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );
    }
}
