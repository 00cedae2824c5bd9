//! The hourly trigger: decide whether this tick exports, run preparation and
//! the optional upload, and leave one activity-log entry behind.

use std::sync::Arc;

use chrono::{NaiveDateTime, Timelike};
use thiserror::Error;

use crate::constants::{ACTIVITY_SUBJECT, EXPORT_DOCTYPE};
use crate::departures::DepartureSource;
use crate::export::{prepare_export, ExportError, PrepareMode, PrepareOutcome};
use crate::ftp::FtpUploader;
use crate::store::operations::activity_log::{ActivityLogEntry, ActivityStatus};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
enum JobError {
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Export(#[from] ExportError),
}

/// What one invocation did; mirrored into the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerOutcome {
    pub status: Option<ActivityStatus>,
    pub message: String,
    pub export_id: Option<String>,
}

impl TriggerOutcome {
    fn new(status: Option<ActivityStatus>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            export_id: None,
        }
    }

    fn referencing(mut self, export_id: &str) -> Self {
        self.export_id = Some(export_id.to_string());
        self
    }
}

pub async fn run<S: DepartureSource>(
    store: &Store,
    source: &S,
    uploader: &FtpUploader,
    now: NaiveDateTime,
) -> TriggerOutcome {
    tracing::info!("Running iiQ-Check hourly job");
    let outcome = match execute(store, source, uploader, now).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "iiQ-Check hourly job error");
            TriggerOutcome::new(Some(ActivityStatus::Failed), format!("An error occurred: {e}"))
        }
    };
    log_activity(store, &outcome);
    outcome
}

/// [`run`] on its own task. A panic inside the run is recorded as a
/// `failed` activity entry instead of tearing down the caller.
pub async fn run_isolated<S>(
    store: Arc<Store>,
    source: S,
    uploader: FtpUploader,
    now: NaiveDateTime,
) -> TriggerOutcome
where
    S: DepartureSource + 'static,
{
    let task_store = store.clone();
    let handle = tokio::spawn(async move { run(&task_store, &source, &uploader, now).await });
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "iiQ-Check hourly job crashed");
            let outcome =
                TriggerOutcome::new(Some(ActivityStatus::Failed), format!("An error occurred: {e}"));
            log_activity(&store, &outcome);
            outcome
        }
    }
}

async fn execute<S: DepartureSource>(
    store: &Store,
    source: &S,
    uploader: &FtpUploader,
    now: NaiveDateTime,
) -> Result<TriggerOutcome, JobError> {
    let settings = store.get_export_settings()?;

    if !settings.enable_job {
        return Ok(TriggerOutcome::new(None, "Job is disabled. Nothing to do."));
    }

    let current_hour = now.hour();
    if settings.export_hour != current_hour {
        return Ok(TriggerOutcome::new(
            None,
            format!(
                "Current hour ({current_hour}) does not match export hour ({}). Skipping export.",
                settings.export_hour
            ),
        ));
    }

    tracing::info!("Job is enabled and the hour matches, starting export");
    let report = prepare_export(source, store, &settings, now, PrepareMode::Scheduled).await?;

    let export_id = match report.outcome {
        PrepareOutcome::Skipped(reason) => {
            return Ok(TriggerOutcome::new(
                Some(ActivityStatus::Skipped),
                reason.to_string(),
            ));
        }
        PrepareOutcome::Created(export_id) => export_id,
    };

    if !settings.enable_ftp_export {
        return Ok(
            TriggerOutcome::new(Some(ActivityStatus::Success), "FTP export is disabled.")
                .referencing(&export_id),
        );
    }

    let outcome = match uploader.upload_export(store, &settings, &export_id, now).await {
        Ok(_) => TriggerOutcome::new(
            Some(ActivityStatus::Success),
            format!("Export successful. Export name: {export_id}."),
        ),
        Err(e) => TriggerOutcome::new(
            Some(ActivityStatus::Failed),
            format!("An error occurred: {e}"),
        ),
    };
    Ok(outcome.referencing(&export_id))
}

/// Best effort: a failing write is logged, never raised.
fn log_activity(store: &Store, outcome: &TriggerOutcome) {
    let mut entry = ActivityLogEntry::new(ACTIVITY_SUBJECT, outcome.status, outcome.message.clone());
    if let Some(export_id) = &outcome.export_id {
        entry = entry.with_reference(EXPORT_DOCTYPE, export_id);
    }
    if let Err(e) = store.insert_activity(&entry) {
        tracing::error!(error = %e, "Failed to log activity");
    }
}
