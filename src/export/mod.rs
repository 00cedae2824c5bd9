//! Export preparation: query departures, build the spreadsheet, persist the
//! export record and attach the file.

pub mod repository;
pub mod spreadsheet;
pub mod transform;

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::constants::{
    EXPORT_COLUMNS, EXPORT_DOCTYPE, EXPORT_FILE_PREFIX, EXPORT_FOLDER_NAME, ROOT_FOLDER,
};
use crate::departures::{DepartureQuery, DepartureSource, DepartureWindow, SourceError};
use crate::store::operations::exports::{ExportRecord, ExportStatus};
use crate::store::operations::files::{FileRecord, NewFile};
use crate::store::operations::settings::ExportSettings;
use crate::store::StoreError;

pub use repository::ExportRepository;
pub use spreadsheet::SpreadsheetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareMode {
    /// Hourly job: honours `enable_job`, skips quietly.
    Scheduled,
    /// Operator-triggered: ignores `enable_job`, skips become errors.
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    MissingUnitCategories,
    MissingCustomerTypes,
    DuplicateDate(NaiveDate),
    NoRecipients,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("iiQ-Check export is disabled, exiting."),
            Self::MissingUnitCategories => f.write_str("No unit category selected for export."),
            Self::MissingCustomerTypes => f.write_str("No customer type selected for export."),
            Self::DuplicateDate(date) => write!(
                f,
                "An export for the departure date {date} already exists. Aborting the operation."
            ),
            Self::NoRecipients => f.write_str(
                "No data returned from the query. Seems like there are no departures for the \
                 configured filter, or the import from the host system is not working correctly.",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    Created(String),
    Skipped(SkipReason),
}

/// Outcome plus the progress messages shown to an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareReport {
    pub outcome: PrepareOutcome,
    pub messages: Vec<String>,
}

impl PrepareReport {
    pub fn export_id(&self) -> Option<&str> {
        match &self.outcome {
            PrepareOutcome::Created(id) => Some(id),
            PrepareOutcome::Skipped(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{0}")]
    Skipped(SkipReason),
    #[error("departure query failed: {0}")]
    Source(#[from] SourceError),
    #[error("failed to build spreadsheet: {0}")]
    Spreadsheet(#[from] SpreadsheetError),
    #[error("failed to save or attach export: {0}")]
    Store(#[from] StoreError),
    #[error("Retry failed: {0}")]
    RetryFailed(StoreError),
    #[error("exportDaysAfterDeparture {0} puts the departure day outside the supported calendar")]
    DayOffsetOutOfRange(i64),
}

pub fn export_file_name(departure_date: NaiveDate) -> String {
    format!("{EXPORT_FILE_PREFIX}{departure_date}.xlsx")
}

pub fn export_folder() -> String {
    format!("{ROOT_FOLDER}/{EXPORT_FOLDER_NAME}")
}

fn statistics_text(rows: usize, now: NaiveDateTime) -> String {
    format!(
        "Total Records: {rows}\nExport Date: {}\n",
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

struct Messages {
    mode: PrepareMode,
    lines: Vec<String>,
}

impl Messages {
    fn push(&mut self, message: String) {
        tracing::info!(mode = ?self.mode, "{message}");
        self.lines.push(message);
    }
}

fn skip(
    mode: PrepareMode,
    reason: SkipReason,
    messages: Messages,
) -> Result<PrepareReport, ExportError> {
    tracing::info!(mode = ?mode, reason = %reason, "Export preparation skipped");
    match mode {
        PrepareMode::Interactive => Err(ExportError::Skipped(reason)),
        PrepareMode::Scheduled => Ok(PrepareReport {
            outcome: PrepareOutcome::Skipped(reason),
            messages: messages.lines,
        }),
    }
}

/// Build the export for the departure day implied by `settings` and `now`.
///
/// Returns `Skipped` without side effects when there is nothing to export.
/// Once the export record exists every failure marks it `failed` before the
/// error is returned.
pub async fn prepare_export<S, R>(
    source: &S,
    repo: &R,
    settings: &ExportSettings,
    now: NaiveDateTime,
    mode: PrepareMode,
) -> Result<PrepareReport, ExportError>
where
    S: DepartureSource,
    R: ExportRepository,
{
    let mut messages = Messages {
        mode,
        lines: Vec::new(),
    };

    if mode == PrepareMode::Scheduled && !settings.enable_job {
        return skip(mode, SkipReason::Disabled, messages);
    }
    if settings.unit_categories.is_empty() {
        return skip(mode, SkipReason::MissingUnitCategories, messages);
    }
    if settings.customer_types.is_empty() {
        return skip(mode, SkipReason::MissingCustomerTypes, messages);
    }

    let offset = settings.export_days_after_departure;
    let window = DepartureWindow::days_before(now, offset)
        .ok_or(ExportError::DayOffsetOutOfRange(offset))?;
    let departure_date = window.departure_date();

    if repo.export_for_date(departure_date)?.is_some() {
        return skip(mode, SkipReason::DuplicateDate(departure_date), messages);
    }

    let query = DepartureQuery {
        window,
        unit_categories: settings.unit_categories.clone(),
        customer_types: settings.customer_types.clone(),
    };
    let recipients = source.fetch_recipients(&query).await?;
    if recipients.is_empty() {
        return skip(mode, SkipReason::NoRecipients, messages);
    }
    let row_count = recipients.len();
    messages.push(format!("Query returned {row_count} records."));

    let rows = transform::to_export_rows(recipients, settings, departure_date);
    let cells: Vec<Vec<&str>> = rows.iter().map(|r| r.cells().to_vec()).collect();
    let buffer = spreadsheet::write_xlsx(&EXPORT_COLUMNS, &cells)?;
    messages.push("Query executed successfully. Spreadsheet generated.".to_string());

    let record = ExportRecord::new(
        now,
        departure_date,
        row_count as u64,
        statistics_text(row_count, now),
    );
    match repo.create_export(&record) {
        Ok(()) => {}
        Err(e) if e.is_conflict() => {
            return skip(mode, SkipReason::DuplicateDate(departure_date), messages);
        }
        Err(e) => return Err(e.into()),
    }
    messages.push(format!(
        "New {EXPORT_DOCTYPE} document created: {}",
        record.id
    ));
    tracing::info!(
        export_id = %record.id,
        departure_date = %departure_date,
        rows = row_count,
        "Export record created"
    );

    match attach(repo, record.clone(), &buffer, &mut messages) {
        Ok(saved) => {
            messages.push(format!(
                "Export completed successfully. Export document: {}.",
                saved.id
            ));
            Ok(PrepareReport {
                outcome: PrepareOutcome::Created(saved.id),
                messages: messages.lines,
            })
        }
        Err(e) => {
            tracing::error!(export_id = %record.id, error = %e, "Export preparation failed");
            mark_failed(repo, &record.id);
            Err(e)
        }
    }
}

fn save_attachment<R: ExportRepository>(
    repo: &R,
    export_id: &str,
    file_name: &str,
    buffer: &[u8],
    folder: &str,
) -> Result<FileRecord, StoreError> {
    repo.save_file(NewFile {
        file_name,
        content: buffer,
        attached_to_doctype: Some(EXPORT_DOCTYPE),
        attached_to_name: Some(export_id),
        folder,
        is_private: true,
    })
}

/// Ensure the folder, store the file and flip the record to `exported`.
/// A write conflict is retried once against a freshly read record.
fn attach<R: ExportRepository>(
    repo: &R,
    mut record: ExportRecord,
    buffer: &[u8],
    messages: &mut Messages,
) -> Result<ExportRecord, ExportError> {
    let folder = export_folder();
    repo.ensure_folder(ROOT_FOLDER, "")?;
    if repo.ensure_folder(EXPORT_FOLDER_NAME, ROOT_FOLDER)? {
        messages.push(format!("Folder '{folder}' created."));
    }

    let file_name = export_file_name(record.departure_date);
    let mut stored: Option<FileRecord> = None;

    let first_attempt = save_attachment(repo, &record.id, &file_name, buffer, &folder).and_then(
        |file| {
            messages.push(format!(
                "File {file_name} attached to {EXPORT_DOCTYPE} document {} in folder {folder}",
                record.id
            ));
            record.xlsx_file = Some(file.file_url.clone());
            record.status = ExportStatus::Exported;
            stored = Some(file);
            repo.save_export(&record)
        },
    );

    match first_attempt {
        Ok(saved) => Ok(saved),
        Err(e) if e.is_conflict() => {
            tracing::warn!(export_id = %record.id, "Export record modified concurrently, retrying once");
            retry_attach(repo, &record.id, stored, &file_name, buffer, &folder, messages)
                .map_err(ExportError::RetryFailed)
        }
        Err(e) => Err(e.into()),
    }
}

fn retry_attach<R: ExportRepository>(
    repo: &R,
    export_id: &str,
    stored: Option<FileRecord>,
    file_name: &str,
    buffer: &[u8],
    folder: &str,
    messages: &mut Messages,
) -> Result<ExportRecord, StoreError> {
    let mut fresh = repo.get_export(export_id)?.ok_or_else(|| StoreError::NotFound {
        entity: "export".to_string(),
        key: export_id.to_string(),
    })?;
    let file = match stored {
        Some(file) => file,
        None => save_attachment(repo, export_id, file_name, buffer, folder)?,
    };
    messages.push(format!(
        "File {file_name} attached to {EXPORT_DOCTYPE} document {export_id} in folder {folder} after retrying"
    ));
    fresh.xlsx_file = Some(file.file_url);
    fresh.status = ExportStatus::Exported;
    repo.save_export(&fresh)
}

fn mark_failed<R: ExportRepository>(repo: &R, export_id: &str) {
    let result = repo.get_export(export_id).and_then(|current| match current {
        Some(mut record) => {
            record.status = ExportStatus::Failed;
            repo.save_export(&record).map(|_| ())
        }
        None => Ok(()),
    });
    if let Err(e) = result {
        tracing::warn!(export_id, error = %e, "Failed to mark export as failed");
    }
}
