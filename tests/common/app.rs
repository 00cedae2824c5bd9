use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use iiq_check_connect::config::{Config, FtpClientConfig, WorkerConfig};
use iiq_check_connect::departures::HostDatabase;
use iiq_check_connect::ftp::FtpUploader;
use iiq_check_connect::routes::build_router;
use iiq_check_connect::state::AppState;
use iiq_check_connect::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

impl TestApp {
    pub fn store(&self) -> &Store {
        self.state.store()
    }

    pub fn host_db(&self) -> &HostDatabase {
        self.state.host_db()
    }
}

pub fn test_config(temp_dir: &TempDir) -> Config {
    // Built directly: set_var would race across parallel tests.
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: temp_dir
            .path()
            .join("iiq-check-test.sled")
            .to_string_lossy()
            .to_string(),
        departures_db_path: temp_dir
            .path()
            .join("host.sqlite")
            .to_string_lossy()
            .to_string(),
        admin_token: format!("integration-test-admin-token-{}", uuid::Uuid::new_v4()),
        cors_origin: "http://localhost:5173".to_string(),
        worker: WorkerConfig {
            is_leader: false,
            export_cron: "0 0 * * * *".to_string(),
        },
        ftp: FtpClientConfig { timeout_secs: 5 },
    }
}

pub fn test_uploader() -> FtpUploader {
    FtpUploader::new(Duration::from_secs(5)).expect("build uploader")
}

pub async fn spawn_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&temp_dir);

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");
    let host_db = HostDatabase::open(&config.departures_db_path).expect("open host db");

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(store, host_db, test_uploader(), &config, shutdown_tx);

    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_server() -> TestApp {
    spawn_test_app().await
}
