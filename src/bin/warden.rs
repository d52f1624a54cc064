use clap::Parser;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use warden::alerting::{AlertDispatcher, InterventionController};
use warden::checks::{CheckEngine, ReqwestProbe};
use warden::config::{FileConfigSource, StorageSettings};
use warden::db::{MemoryStore, MonitorStore, PgStore};
use warden::notifications::NotificationService;
use warden::remote::{ConnectionManager, OpenSshDialer};
use warden::server::{MonitorState, Scheduler, wait_for_shutdown};
use warden::web::{AppState, run_http_server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding monitor.toml, severity.toml, servers.toml,
    /// groups.toml and websites.toml (or a default/ subdirectory with them)
    #[arg(short, long, default_value = "config")]
    config_dir: PathBuf,

    /// Run every target once, wait for alerts and interventions, then exit
    #[arg(long)]
    once: bool,
}

fn init_logging(log_dir: &Path) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "warden.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn connect_store(
    storage: &StorageSettings,
) -> Result<Arc<dyn MonitorStore>, Box<dyn std::error::Error + Send + Sync>> {
    match storage {
        StorageSettings::Memory => {
            info!("Using in-memory storage. Results are lost on exit.");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageSettings::Postgres {
            database_url,
            max_connections,
        } => {
            if database_url.is_empty() {
                return Err(
                    "storage.kind is postgres but no database_url or DATABASE_URL is set".into(),
                );
            }
            let store = PgStore::connect(database_url, *max_connections).await?;
            info!("Connected to Postgres.");
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    dotenv().ok();

    let source = FileConfigSource::new(&args.config_dir);
    let settings = source.settings()?;
    init_logging(&settings.log_dir);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_dir = %args.config_dir.display(),
        "Starting warden."
    );

    let store = connect_store(&settings.storage).await?;
    let dialer = Arc::new(OpenSshDialer::new()?);
    let connections = Arc::new(ConnectionManager::new(dialer));
    let tracker = TaskTracker::new();
    let alerts = Arc::new(AlertDispatcher::new(
        store.clone(),
        Arc::new(NotificationService::new()),
    ));
    let interventions = Arc::new(InterventionController::new(
        store.clone(),
        connections.clone(),
    ));
    let engine = Arc::new(CheckEngine::new(
        store.clone(),
        connections.clone(),
        Arc::new(ReqwestProbe::new()),
        alerts,
        interventions,
        tracker.clone(),
    ));
    let monitor_state = Arc::new(MonitorState::default());

    let mut scheduler = Scheduler::new(
        Box::new(source),
        monitor_state.clone(),
        store.clone(),
        connections,
        engine,
        tracker,
    );
    if let Err(e) = scheduler.start().await {
        error!(error = %e, "Failed to load configuration.");
        return Err(e.into());
    }

    if args.once {
        scheduler.run_once().await?;
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_shutdown().await;
            shutdown.cancel();
        }
    });

    let addr: SocketAddr = settings.status_listen.parse()?;
    let app_state = Arc::new(AppState {
        monitor_state,
        store,
    });
    let http_server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = run_http_server(addr, app_state, shutdown.cancelled_owned()).await {
                error!(%addr, error = %e, "Status endpoint failed.");
            }
        }
    });

    let result = scheduler.run(shutdown.clone().cancelled_owned()).await;
    shutdown.cancel();
    if let Err(e) = http_server.await {
        error!(error = %e, "Status endpoint task panicked.");
    }

    match result {
        Ok(()) => {
            info!("Warden stopped.");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Configuration reload failed, stopping.");
            Err(e.into())
        }
    }
}
