/*****************************************************************************************
 *
 *  recordsd – per-user match records with a recency index
 *  -------------------------------------------------------
 *
 *  Records and per-user indexes live in Redis (or process memory) with a
 *  rolling 42-day expiration.
 *
 *****************************************************************************************/

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::serve;
use tokio::net::TcpListener;
use tokio::task;

use recordsd::app;
use recordsd::backend::memory::{cleanup_loop, MemoryBackend};
use recordsd::backend::redis_backend::{RedisBackend, RedisSettings};
use recordsd::backend::RecordBackend;
use recordsd::clock::{offset_hours, Clock, SystemClock};
use recordsd::config::{AppConfig, BackendKind};
use recordsd::logging;
use recordsd::services::records_service::{RecordsService, ServiceSettings};
use recordsd::state::AppState;

/// config.json next to the executable, or one directory above it.
fn locate_config() -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let exe_dir = exe_path.parent()?;

    [exe_dir.join("config.json"), exe_dir.join("..").join("config.json")]
        .into_iter()
        .find(|p| p.exists())
}

#[tokio::main]
async fn main() {
    //
    // ────────────────────────────────────────────────────────
    //  Load configuration
    // ────────────────────────────────────────────────────────
    //
    let config_path = locate_config();
    let mut cfg = match config_path.as_deref() {
        Some(path) => match AppConfig::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        None => AppConfig::default(),
    };
    cfg.apply_env();

    //
    // ────────────────────────────────────────────────────────
    //  Configure logging
    // ────────────────────────────────────────────────────────
    //
    // Dropping the guard stops the file writer, so it lives until main returns.
    let _log_guard = logging::init(&cfg);

    match config_path.as_deref().map(Path::display) {
        Some(path) => tracing::info!("Loaded config.json from {}", path),
        None => tracing::warn!("config.json not found, using defaults"),
    }
    tracing::info!("Loaded configuration: {:?}", redacted(&cfg));

    //
    // ────────────────────────────────────────────────────────
    //  Connect the backend
    // ────────────────────────────────────────────────────────
    //
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let backend: Arc<dyn RecordBackend> = match cfg.backend {
        BackendKind::Redis => {
            let settings = RedisSettings {
                host: cfg.redis_host.clone(),
                port: cfg.redis_port,
                password: cfg.redis_password.clone(),
                db: cfg.redis_db,
            };
            match RedisBackend::connect(&settings).await {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    tracing::error!("Failed to connect to Redis at startup: {e}");
                    std::process::exit(1);
                }
            }
        }
        BackendKind::Memory => {
            let backend = MemoryBackend::new(clock.clone());
            if let Some(every) = cfg.cleanup_interval {
                tracing::info!("Starting cleanup loop: interval={}s", every);
                task::spawn(cleanup_loop(backend.clone(), every));
            }
            tracing::warn!("Using in-memory backend; records are lost on exit");
            Arc::new(backend)
        }
    };

    let settings = ServiceSettings {
        ttl: Duration::from_secs(cfg.record_ttl_seconds),
        utc_offset: offset_hours(cfg.utc_offset_hours),
    };
    let records = RecordsService::new(backend, clock, settings);

    //
    // ────────────────────────────────────────────────────────
    //  Build Axum app and start listening
    // ────────────────────────────────────────────────────────
    //
    let port = cfg.port;
    let version = cfg.server_version.clone();
    let app = app::build_app(AppState::new(records, cfg));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    tracing::info!("Server started version {} on http://{}", version, addr);

    serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await
        .expect("Server error");

    tracing::info!("Server stopped");
}

fn redacted(cfg: &AppConfig) -> AppConfig {
    AppConfig {
        redis_password: cfg.redis_password.as_ref().map(|_| "***".to_string()),
        ..cfg.clone()
    }
}

//
// ─────────────────────────────────────────────────────────────
//  Graceful shutdown handler (Ctrl-C or SIGTERM)
// ─────────────────────────────────────────────────────────────
//
async fn shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("Ctrl-C received, shutting down…"),
        _ = terminate => tracing::warn!("SIGTERM received, shutting down…"),
    }
}
