use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, Mutex};

use crate::config::Config;
use crate::departures::HostDatabase;
use crate::ftp::FtpUploader;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    host_db: HostDatabase,
    uploader: FtpUploader,
    export_lock: Arc<Mutex<()>>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        host_db: HostDatabase,
        uploader: FtpUploader,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            host_db,
            uploader,
            export_lock: Arc::new(Mutex::new(())),
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn host_db(&self) -> &HostDatabase {
        &self.host_db
    }

    pub fn uploader(&self) -> &FtpUploader {
        &self.uploader
    }

    /// Held for the duration of an export run, manual or scheduled.
    pub fn export_lock(&self) -> &Arc<Mutex<()>> {
        &self.export_lock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
