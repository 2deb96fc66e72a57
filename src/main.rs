use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use knowledge_refinery::api::{create_router, AppState};
use knowledge_refinery::config::Config;
use knowledge_refinery::db::{Database, VectorStore};
use knowledge_refinery::llm::LmStudioClient;

#[derive(Parser)]
#[command(name = "krd")]
#[command(about = "Local-first document knowledge daemon")]
struct Args {
    /// Override the workspace data directory (KR_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the TCP port to bind (KR_PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "knowledge_refinery=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Knowledge Refinery daemon...");

    let mut config = Config::from_env();
    if let Some(data_dir) = args.data_dir {
        config.set_data_dir(data_dir);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.ensure_dirs()?;
    tracing::info!(data_dir = %config.data_dir.display(), port = config.port, "Configuration loaded");

    let db = Database::new(&config.db_path).await?;
    tracing::info!(path = %config.db_path.display(), "Database initialized");

    let vectors = Arc::new(VectorStore::new(db.clone(), 768));
    vectors.load_all().await?;
    tracing::info!(count = vectors.count().await, "Vector store loaded");

    let lm = Arc::new(LmStudioClient::new(
        &config.lm_studio.base_url,
        config.lm_studio.timeout_secs,
    ));
    let models = lm.list_models().await;
    if models.is_empty() {
        tracing::warn!("LM Studio not available - embedding/annotation will fail");
    } else {
        let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
        tracing::info!(models = ids.join(", "), "LM Studio connected");
    }

    let config = Arc::new(config);
    let state = AppState::new(Arc::clone(&config), db, vectors, lm);
    let app = create_router(state);

    let pid_path = config.pid_path();
    std::fs::write(&pid_path, std::process::id().to_string())?;

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, lm_studio = %config.lm_studio.base_url, "Daemon ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    std::fs::remove_file(&pid_path).ok();
    tracing::info!("Daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received...");
}
