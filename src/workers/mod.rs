pub mod hourly_export;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::WorkerConfig;
use crate::departures::HostDatabase;
use crate::ftp::FtpUploader;
use crate::store::Store;

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    HourlyExport,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HourlyExport => "hourly_export",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: String,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    host_db: HostDatabase,
    uploader: FtpUploader,
    export_lock: Arc<Mutex<()>>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        host_db: HostDatabase,
        uploader: FtpUploader,
        export_lock: Arc<Mutex<()>>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            host_db,
            uploader,
            export_lock,
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// Single source of truth for all planned jobs and their cron schedules.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![JobSpec {
            name: WorkerName::HourlyExport,
            cron: self.config.export_cron.clone(),
            enabled: true,
        }]
    }

    /// Start the worker scheduler. Returns an error if the scheduler cannot be created or started.
    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.is_leader {
            tracing::info!("Worker leader disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            "Worker manager shutting down, draining for {}s",
            DRAIN_TIMEOUT.as_secs()
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        for spec in &self.planned_jobs() {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let name_str = spec.name.as_str();
            match spec.name {
                WorkerName::HourlyExport => {
                    let store = self.store.clone();
                    let host_db = self.host_db.clone();
                    let uploader = self.uploader.clone();
                    let export_lock = self.export_lock.clone();
                    add_job(scheduler, &spec.cron, name_str, move || {
                        let store = store.clone();
                        let host_db = host_db.clone();
                        let uploader = uploader.clone();
                        let export_lock = export_lock.clone();
                        async move {
                            let _running = export_lock.lock().await;
                            let now = chrono::Local::now().naive_local();
                            let outcome =
                                hourly_export::run_isolated(store, host_db, uploader, now).await;
                            tracing::info!(
                                status = ?outcome.status,
                                export_id = ?outcome.export_id,
                                message = %outcome.message,
                                "hourly_export: done"
                            );
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = %spec.cron, "Registered worker");
        }
    }
}

/// Set while an invocation runs; cleared on drop, including when the
/// invocation panics.
struct RunningFlag(Arc<AtomicBool>);

impl RunningFlag {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Wrap one invocation so overlapping ticks are skipped. The run is never
/// cancelled from here; the FTP client bounds each network step.
fn guarded<Fut>(
    running: &Arc<AtomicBool>,
    name: &'static str,
    run: impl FnOnce() -> Fut,
) -> Pin<Box<dyn Future<Output = ()> + Send>>
where
    Fut: Future<Output = ()> + Send + 'static,
{
    let Some(flag) = RunningFlag::acquire(running) else {
        tracing::warn!(
            worker = name,
            "Skipping worker invocation: previous run still in progress"
        );
        return Box::pin(async {});
    };
    let fut = run();
    Box::pin(async move {
        let _flag = flag;
        fut.await;
    })
}

/// Add a job to the scheduler with an overlap guard.
async fn add_job<Fut, F>(scheduler: &JobScheduler, cron: &str, name: &'static str, mut run: F)
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron, move |_uuid, _lock| guarded(&running, name, &mut run));

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error=%err, cron, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error=%err, cron, worker = name, "Failed to create worker job"),
    }
}
