use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shelfwatch_server::config::{AppConfig, CliConfig, FileConfig};
use shelfwatch_server::content_source::HttpContentSource;
use shelfwatch_server::download_queue::{
    QueueEngine, QueueWorker, RetryPolicy, SqliteDownloadRecordStore,
};
use shelfwatch_server::notifications::{
    NoopNotifier, NotificationService, Notifier, WebhookNotifier,
};
use shelfwatch_server::requests::{RequestChecker, RequestManager, SqliteRequestStore};
use shelfwatch_server::server::{run_server, RequestsLoggingLevel, ServerConfig, ServerState};
use shelfwatch_server::updates::UpdateBroadcaster;

const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding downloads.db and requests.db.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Base URL of the content source used for searches and downloads.
    #[clap(long)]
    pub source_url: Option<String>,

    /// Timeout in seconds for content source requests.
    #[clap(long, default_value_t = 300)]
    pub source_timeout_sec: u64,

    /// Directory completed downloads are moved into. Defaults to <db-dir>/library.
    #[clap(long, value_parser = parse_path)]
    pub library_dir: Option<PathBuf>,

    /// Directory for in-progress transfers. Defaults to <db-dir>/tmp.
    #[clap(long, value_parser = parse_path)]
    pub temp_dir: Option<PathBuf>,

    /// URL that receives a JSON POST for every notification.
    #[clap(long)]
    pub notify_webhook_url: Option<String>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            source_url: self.source_url.clone(),
            source_timeout_sec: self.source_timeout_sec,
            library_dir: self.library_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            notify_webhook_url: self.notify_webhook_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;
    let source_url = config.source_url.clone().context(
        "source_url must be specified via --source-url or in config file",
    )?;

    info!("Opening downloads database at {:?}...", config.downloads_db_path());
    let download_store = Arc::new(SqliteDownloadRecordStore::new(config.downloads_db_path())?);
    info!("Opening requests database at {:?}...", config.requests_db_path());
    let request_store = Arc::new(SqliteRequestStore::new(config.requests_db_path())?);

    let updates = Arc::new(UpdateBroadcaster::new(
        download_store.clone(),
        request_store.clone(),
    ));

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            info!("Notifications will be posted to {}", url);
            Arc::new(WebhookNotifier::new(url.clone(), config.source_timeout_sec)?)
        }
        None => {
            info!("No notification webhook configured");
            Arc::new(NoopNotifier)
        }
    };
    let notifications = Arc::new(NotificationService::new(notifier));

    info!("Content source configured at {}", source_url);
    let source = Arc::new(HttpContentSource::new(
        source_url,
        config.source_timeout_sec,
        config.temp_dir.clone(),
        config.library_dir.clone(),
    )?);

    let queue = Arc::new(QueueEngine::new(
        download_store,
        source.clone(),
        updates.clone(),
        notifications.clone(),
        RetryPolicy::new(&config.queue),
    ));
    let recovered = queue.recover_interrupted()?;
    if recovered > 0 {
        info!("Recovered {} interrupted downloads", recovered);
    }

    let requests = Arc::new(RequestManager::new(request_store, updates.clone()));
    let checker = Arc::new(RequestChecker::new(
        requests.clone(),
        queue.clone(),
        source,
        notifications.clone(),
        Duration::from_millis(config.checker.delay_between_requests_ms),
    ));

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    let worker = QueueWorker::new(queue.clone(), config.queue.poll_interval_secs);
    tasks.push(tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    }));

    if config.checker.enabled {
        tasks.push(tokio::spawn(checker.clone().run(
            Duration::from_secs(config.checker.interval_secs),
            config.checker.run_on_startup,
            shutdown.clone(),
        )));
    } else {
        info!("Request checker disabled; checks run only on demand");
    }

    tasks.push(tokio::spawn({
        let updates = updates.clone();
        let shutdown = shutdown.clone();
        let interval = Duration::from_secs(config.updates.heartbeat_interval_secs);
        async move { updates.run_heartbeat(interval, shutdown).await }
    }));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C, shutting down..."),
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
            shutdown.cancel();
        }
    });

    let state = ServerState {
        config: ServerConfig {
            requests_logging_level: config.logging_level.clone(),
            port: config.port,
        },
        start_time: Instant::now(),
        queue,
        requests,
        checker,
        updates,
        hash: env!("GIT_HASH").to_string(),
    };

    info!("Ready to serve at port {}!", config.port);
    let result = run_server(state, shutdown.clone()).await;

    // The server can also stop on its own, e.g. failing to bind
    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!("Background task failed: {}", e);
        }
    }

    if notifications.pending() > 0 {
        info!("Waiting for {} notifications to be delivered...", notifications.pending());
        if !notifications.drain(NOTIFICATION_DRAIN_TIMEOUT).await {
            warn!("Dropping notifications still undelivered at shutdown");
        }
    }

    result
}
