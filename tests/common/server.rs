//! Test server lifecycle management
//!
//! Spawns a full shelfwatch server wired to a [`FakeUpstream`], with
//! file-backed databases in a temporary directory.

use super::constants::*;
use super::upstream::FakeUpstream;
use shelfwatch_server::config::QueueSettings;
use shelfwatch_server::content_source::HttpContentSource;
use shelfwatch_server::download_queue::{
    DownloadRecordStore, QueueEngine, QueueWorker, RetryPolicy, SqliteDownloadRecordStore,
};
use shelfwatch_server::notifications::{NotificationService, WebhookNotifier};
use shelfwatch_server::requests::{RequestChecker, RequestManager, SqliteRequestStore};
use shelfwatch_server::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use shelfwatch_server::updates::UpdateBroadcaster;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated databases and library directory
///
/// When dropped, the server and worker shut down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The fake content source this server talks to
    pub upstream: FakeUpstream,

    /// Download store for direct database access in tests
    pub download_store: Arc<dyn DownloadRecordStore>,

    /// Where completed downloads land
    pub library_dir: PathBuf,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Spawns a server with the queue worker running
    pub async fn spawn() -> Self {
        Self::spawn_with(true).await
    }

    /// Spawns a server whose queue is never drained
    ///
    /// Use this to observe queue positions without the worker racing the test.
    pub async fn spawn_without_worker() -> Self {
        Self::spawn_with(false).await
    }

    async fn spawn_with(run_worker: bool) -> Self {
        let upstream = FakeUpstream::spawn().await;
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let library_dir = temp_dir.path().join("library");

        let download_store = Arc::new(
            SqliteDownloadRecordStore::new(temp_dir.path().join("downloads.db"))
                .expect("Failed to open download store"),
        );
        let request_store = Arc::new(
            SqliteRequestStore::new(temp_dir.path().join("requests.db"))
                .expect("Failed to open request store"),
        );

        let updates = Arc::new(UpdateBroadcaster::new(
            download_store.clone(),
            request_store.clone(),
        ));
        let notifier = Arc::new(
            WebhookNotifier::new(upstream.webhook_url(), REQUEST_TIMEOUT_SECS)
                .expect("Failed to build webhook notifier"),
        );
        let notifications = Arc::new(NotificationService::new(notifier));
        let source = Arc::new(
            HttpContentSource::new(
                upstream.base_url.clone(),
                REQUEST_TIMEOUT_SECS,
                temp_dir.path().join("tmp"),
                library_dir.clone(),
            )
            .expect("Failed to build content source"),
        );

        let queue = Arc::new(QueueEngine::new(
            download_store.clone(),
            source.clone(),
            updates.clone(),
            notifications.clone(),
            RetryPolicy::new(&QueueSettings::default()),
        ));
        let requests = Arc::new(RequestManager::new(request_store, updates.clone()));
        let checker = Arc::new(RequestChecker::new(
            requests.clone(),
            queue.clone(),
            source,
            notifications,
            Duration::ZERO,
        ));

        let shutdown = CancellationToken::new();
        if run_worker {
            let worker = QueueWorker::new(queue.clone(), 1);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await });
        }

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let state = ServerState {
            config: ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                port,
            },
            start_time: Instant::now(),
            queue,
            requests,
            checker,
            updates,
            hash: "test".to_string(),
        };
        let app = make_app(state);

        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
                    .expect("Server failed");
            }
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            upstream,
            download_store,
            library_dir,
            _temp_dir: temp_dir,
            shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
