use anyhow::Result;
use clap::Parser;
use parley_core::AppState;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

use config::LogFormat;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parley=info,tower_http=debug"));
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let existed = std::path::Path::new(&args.config).exists();
    let config = config::Config::load(&args.config)?;
    init_tracing(config.logging.format);
    if !existed {
        tracing::info!("Generated default config at '{}'", args.config);
    }

    ensure_data_dirs(&config);

    let db = parley_db::create_pool(&config.database.url, config.database.max_connections).await?;
    parley_db::run_migrations(&db).await?;
    tracing::info!(engine = ?parley_db::active_database_engine(), "Database ready");

    let state = AppState::new(db, config.app_config());
    let app = parley_api::build_router()
        .merge(parley_ws::gateway_router())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        bind = %config.server.bind_address,
        public_url = %config.server.public_url,
        "Parley listening"
    );

    let shutdown_signal = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down (ctrl-c)...");
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Create the parent directory of a file-backed SQLite database.
fn ensure_data_dirs(config: &config::Config) {
    if let Some(db_path) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if parent.as_os_str().is_empty() {
                return;
            }
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Could not create database directory '{}': {}", parent.display(), e);
            }
        }
    }
}
