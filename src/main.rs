use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::Router;
use iiq_check_connect::config::Config;
use iiq_check_connect::departures::HostDatabase;
use iiq_check_connect::ftp::FtpUploader;
use iiq_check_connect::logging::{init_tracing, LogConfig};
use iiq_check_connect::routes::build_router;
use iiq_check_connect::state::AppState;
use iiq_check_connect::store::Store;
use iiq_check_connect::workers::WorkerManager;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const PLACEHOLDER_ADMIN_TOKEN: &str = "change_me_to_a_random_admin_token";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(&LogConfig::from(&config));
    tracing::info!(?config, "Starting iiq-check-connect");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "iiq-check-connect failed to start");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), BoxError> {
    if config.admin_token == PLACEHOLDER_ADMIN_TOKEN {
        tracing::warn!("ADMIN_TOKEN is the placeholder value; set a random token before exposing the API");
    }

    let store = Arc::new(Store::open(&config.sled_path)?);
    store.run_migrations()?;
    let host_db = HostDatabase::open(&config.departures_db_path)?;
    let uploader = FtpUploader::new(config.ftp.timeout())?;

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(
        store.clone(),
        host_db.clone(),
        uploader.clone(),
        &config,
        shutdown_tx.clone(),
    );

    let workers = config.worker.is_leader.then(|| {
        spawn_workers(WorkerManager::new(
            store.clone(),
            host_db,
            uploader,
            state.export_lock().clone(),
            shutdown_tx.subscribe(),
            &config.worker,
        ))
    });

    let app = with_http_layers(build_router(state), build_cors_layer(&config)?);

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server crashed");
        let _ = shutdown_tx.send(());
    }

    if let Some(handle) = workers {
        match handle.await {
            Err(e) => tracing::error!(error = %e, "Worker task panicked"),
            Ok(()) => tracing::info!("Worker manager exited normally"),
        }
    }

    tracing::info!("Flushing store before exit");
    store.flush()?;
    tracing::info!("Shutdown complete");
    Ok(served?)
}

/// Runs apart from the HTTP server; a scheduler failure is logged, the
/// admin API stays up.
fn spawn_workers(manager: WorkerManager) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = manager.start().await {
            tracing::error!(error = %e, "Worker manager failed");
        }
    })
}

fn with_http_layers(router: Router, cors: CorsLayer) -> Router {
    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

fn build_cors_layer(config: &Config) -> Result<CorsLayer, BoxError> {
    let base = CorsLayer::new()
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_methods(Any);

    if config.cors_origin.trim() == "*" {
        return Ok(base.allow_origin(Any));
    }
    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| format!("invalid CORS_ORIGIN '{}': {e}", config.cors_origin))?;
    Ok(base.allow_origin(origin))
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
