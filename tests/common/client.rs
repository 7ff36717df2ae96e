//! HTTP client for end-to-end tests
//!
//! Wraps reqwest and provides methods for all shelfwatch endpoints.
//! When API routes or request formats change, update only this file.

use super::constants::*;
use axum::body::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_empty(&self, path: &str) -> Response {
        self.client
            .post(self.url(path))
            .send()
            .await
            .expect("POST request failed")
    }

    async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("POST request failed")
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE request failed")
    }

    // ========================================================================
    // Server
    // ========================================================================

    pub async fn home(&self) -> Response {
        self.get("/").await
    }

    // ========================================================================
    // Queue Endpoints
    // ========================================================================

    /// POST /v1/queue
    pub async fn enqueue(&self, fingerprint: &str, title: Option<&str>) -> Response {
        let mut body = json!({ "fingerprint": fingerprint, "format": "epub" });
        if let Some(title) = title {
            body["title"] = json!(title);
        }
        self.post_json("/v1/queue", &body).await
    }

    /// POST /v1/queue with an explicit format
    pub async fn enqueue_with_format(&self, fingerprint: &str, format: &str) -> Response {
        let body = json!({ "fingerprint": fingerprint, "format": format });
        self.post_json("/v1/queue", &body).await
    }

    /// GET /v1/queue
    pub async fn get_queue(&self) -> Response {
        self.get("/v1/queue").await
    }

    /// GET /v1/queue/{fingerprint}
    pub async fn get_download(&self, fingerprint: &str) -> Response {
        self.get(&format!("/v1/queue/{}", fingerprint)).await
    }

    /// POST /v1/queue/{fingerprint}/cancel
    pub async fn cancel_download(&self, fingerprint: &str) -> Response {
        self.post_empty(&format!("/v1/queue/{}/cancel", fingerprint))
            .await
    }

    /// POST /v1/queue/{fingerprint}/retry
    pub async fn retry_download(&self, fingerprint: &str) -> Response {
        self.post_empty(&format!("/v1/queue/{}/retry", fingerprint))
            .await
    }

    /// DELETE /v1/queue/{fingerprint}
    pub async fn delete_download(&self, fingerprint: &str) -> Response {
        self.delete(&format!("/v1/queue/{}", fingerprint)).await
    }

    /// Polls a download record until its status is one of `statuses`
    ///
    /// # Panics
    ///
    /// Panics if the record does not reach one of them within SETTLE_TIMEOUT_MS.
    pub async fn wait_for_download_status(&self, fingerprint: &str, statuses: &[&str]) -> Value {
        let start = Instant::now();
        loop {
            let response = self.get_download(fingerprint).await;
            if response.status().is_success() {
                let record: Value = response.json().await.expect("Invalid download JSON");
                if statuses.iter().any(|s| record["status"] == *s) {
                    return record;
                }
                if start.elapsed() > Duration::from_millis(SETTLE_TIMEOUT_MS) {
                    panic!(
                        "Download {} stuck in {} waiting for {:?}",
                        fingerprint, record["status"], statuses
                    );
                }
            } else if start.elapsed() > Duration::from_millis(SETTLE_TIMEOUT_MS) {
                panic!("Download {} never appeared", fingerprint);
            }
            tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
        }
    }

    // ========================================================================
    // Request Endpoints
    // ========================================================================

    /// POST /v1/requests
    pub async fn create_request(&self, query: &str) -> Response {
        self.client
            .post(self.url("/v1/requests"))
            .json(&json!({ "query": query }))
            .send()
            .await
            .expect("Create request failed")
    }

    /// GET /v1/requests
    pub async fn list_requests(&self) -> Response {
        self.get("/v1/requests").await
    }

    /// GET /v1/requests/{id}
    pub async fn get_request(&self, id: i64) -> Response {
        self.get(&format!("/v1/requests/{}", id)).await
    }

    /// POST /v1/requests/{id}/cancel
    pub async fn cancel_request(&self, id: i64) -> Response {
        self.post_empty(&format!("/v1/requests/{}/cancel", id)).await
    }

    /// POST /v1/requests/{id}/reactivate
    pub async fn reactivate_request(&self, id: i64) -> Response {
        self.post_empty(&format!("/v1/requests/{}/reactivate", id))
            .await
    }

    /// DELETE /v1/requests/{id}
    pub async fn delete_request(&self, id: i64) -> Response {
        self.delete(&format!("/v1/requests/{}", id)).await
    }

    /// POST /v1/requests/{id}/check
    pub async fn check_request(&self, id: i64) -> Response {
        self.post_empty(&format!("/v1/requests/{}/check", id)).await
    }

    /// POST /v1/requests/check
    pub async fn check_all_requests(&self) -> Response {
        self.post_empty("/v1/requests/check").await
    }

    /// GET /v1/requests/checker/status
    pub async fn checker_status(&self) -> Response {
        self.get("/v1/requests/checker/status").await
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Opens GET /v1/events as an [`EventReader`]
    pub async fn events(&self) -> EventReader {
        // The stream stays open; only the per-read timeout applies
        let client = reqwest::Client::new();
        let response = client
            .get(self.url("/v1/events"))
            .send()
            .await
            .expect("Events request failed");
        assert!(response.status().is_success());
        EventReader {
            body: response.bytes_stream().boxed(),
            buffer: String::new(),
        }
    }
}

/// One parsed server-sent event
#[derive(Debug)]
pub struct SseEvent {
    pub event: String,
    pub data: Value,
}

/// Incremental reader over a server-sent event response
pub struct EventReader {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: String,
}

impl EventReader {
    /// Reads the next complete event
    ///
    /// # Panics
    ///
    /// Panics if no event arrives within SETTLE_TIMEOUT_MS or the stream ends.
    pub async fn next_event(&mut self) -> SseEvent {
        let deadline = Duration::from_millis(SETTLE_TIMEOUT_MS);
        tokio::time::timeout(deadline, async {
            loop {
                if let Some(end) = self.buffer.find("\n\n") {
                    let raw: String = self.buffer.drain(..end + 2).collect();
                    if let Some(event) = parse_event(&raw) {
                        return event;
                    }
                    continue;
                }
                let chunk = self
                    .body
                    .next()
                    .await
                    .expect("Event stream ended")
                    .expect("Event stream failed");
                self.buffer.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .expect("Timed out waiting for event")
    }

    /// Reads events until one named `name` arrives
    pub async fn next_named(&mut self, name: &str) -> SseEvent {
        loop {
            let event = self.next_event().await;
            if event.event == name {
                return event;
            }
        }
    }
}

fn parse_event(raw: &str) -> Option<SseEvent> {
    let mut event = String::from("message");
    let mut data = String::new();
    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push_str(value.trim_start());
        }
    }
    if data.is_empty() {
        return None;
    }
    let data = serde_json::from_str(&data).expect("Event data is not JSON");
    Some(SseEvent { event, data })
}
