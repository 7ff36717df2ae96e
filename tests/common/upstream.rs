//! Fake content source and webhook receiver
//!
//! Serves the same HTTP surface as the real upstream:
//! - `GET /search?q=...` returns `{"results": [...]}`
//! - `GET /download/{fingerprint}` returns the file body or 404
//! - `POST /notify` records the notification body

use super::constants::*;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct UpstreamData {
    search_results: HashMap<String, Vec<Value>>,
    files: HashMap<String, Vec<u8>>,
    notifications: Vec<Value>,
    search_calls: usize,
}

type SharedData = Arc<Mutex<UpstreamData>>;

#[derive(Deserialize)]
struct SearchParams {
    q: String,
}

async fn search(State(data): State<SharedData>, Query(params): Query<SearchParams>) -> Json<Value> {
    let mut data = data.lock().unwrap();
    data.search_calls += 1;
    let results = data
        .search_results
        .get(&params.q)
        .cloned()
        .unwrap_or_default();
    Json(json!({ "results": results }))
}

async fn download(
    State(data): State<SharedData>,
    Path(fingerprint): Path<String>,
) -> impl IntoResponse {
    match data.lock().unwrap().files.get(&fingerprint) {
        Some(content) => (StatusCode::OK, Bytes::from(content.clone())).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn notify(State(data): State<SharedData>, Json(body): Json<Value>) -> StatusCode {
    data.lock().unwrap().notifications.push(body);
    StatusCode::NO_CONTENT
}

/// In-process stand-in for the content source.
///
/// Seeded with BOOK_1 (searchable under MATCHING_QUERY, downloadable) and
/// BOOK_2 (downloadable only).
pub struct FakeUpstream {
    pub base_url: String,
    data: SharedData,
    shutdown: CancellationToken,
}

impl FakeUpstream {
    pub async fn spawn() -> Self {
        let mut seeded = UpstreamData::default();
        seeded.search_results.insert(
            MATCHING_QUERY.to_string(),
            vec![json!({
                "fingerprint": BOOK_1_FINGERPRINT,
                "title": BOOK_1_TITLE,
                "authors": ["Ursula K. Le Guin"],
                "year": 1974,
                "format": "epub",
            })],
        );
        seeded
            .files
            .insert(BOOK_1_FINGERPRINT.to_string(), BOOK_1_CONTENT.to_vec());
        seeded
            .files
            .insert(BOOK_2_FINGERPRINT.to_string(), b"second book".to_vec());
        let data: SharedData = Arc::new(Mutex::new(seeded));

        let app = Router::new()
            .route("/search", get(search))
            .route("/download/{fingerprint}", get(download))
            .route("/notify", post(notify))
            .with_state(data.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake upstream");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let shutdown = CancellationToken::new();
        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
                    .expect("Fake upstream failed");
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            data,
            shutdown,
        }
    }

    pub fn webhook_url(&self) -> String {
        format!("{}/notify", self.base_url)
    }

    /// Make `query` return the given results from now on
    pub fn set_search_results(&self, query: &str, results: Vec<Value>) {
        self.data
            .lock()
            .unwrap()
            .search_results
            .insert(query.to_string(), results);
    }

    pub fn search_calls(&self) -> usize {
        self.data.lock().unwrap().search_calls
    }

    /// Notifications received so far, oldest first
    pub fn notifications(&self) -> Vec<Value> {
        self.data.lock().unwrap().notifications.clone()
    }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
