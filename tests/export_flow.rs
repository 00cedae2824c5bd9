mod common;

use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::NaiveDate;

use common::fixtures::{at, export_settings, seed_departures};
use iiq_check_connect::departures::HostDatabase;
use iiq_check_connect::export::{
    export_folder, prepare_export, ExportError, ExportRepository, PrepareMode, PrepareOutcome,
    SkipReason,
};
use iiq_check_connect::store::operations::exports::{ExportRecord, ExportStatus};
use iiq_check_connect::store::operations::files::{FileRecord, NewFile};
use iiq_check_connect::store::{Store, StoreError};

fn open_store() -> (tempfile::TempDir, Store) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = Store::open(tmp.path().join("flow.sled").to_str().unwrap()).expect("open store");
    store.run_migrations().expect("migrations");
    (tmp, store)
}

fn seeded_host() -> HostDatabase {
    let db = HostDatabase::open_in_memory().expect("host db");
    seed_departures(&db);
    db
}

fn read_sheet(content: &[u8]) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(content)).expect("xlsx is a zip");
    let mut sheet = archive
        .by_name("xl/worksheets/sheet1.xml")
        .expect("sheet part");
    let mut xml = String::new();
    sheet.read_to_string(&mut xml).expect("sheet utf-8");
    xml
}

/// Store wrapper whose first `conflicts` calls to `save_export` report a
/// concurrent modification.
struct ConflictingRepo<'a> {
    store: &'a Store,
    conflicts: AtomicU32,
}

impl<'a> ConflictingRepo<'a> {
    fn new(store: &'a Store, conflicts: u32) -> Self {
        Self {
            store,
            conflicts: AtomicU32::new(conflicts),
        }
    }
}

impl ExportRepository for ConflictingRepo<'_> {
    fn export_for_date(&self, date: NaiveDate) -> Result<Option<ExportRecord>, StoreError> {
        self.store.get_export_by_date(date)
    }

    fn create_export(&self, export: &ExportRecord) -> Result<(), StoreError> {
        self.store.create_export(export)
    }

    fn get_export(&self, export_id: &str) -> Result<Option<ExportRecord>, StoreError> {
        self.store.get_export(export_id)
    }

    fn save_export(&self, export: &ExportRecord) -> Result<ExportRecord, StoreError> {
        let left = self.conflicts.load(Ordering::SeqCst);
        if left > 0 {
            self.conflicts.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Conflict {
                entity: "export".to_string(),
                key: export.id.clone(),
            });
        }
        self.store.save_export(export)
    }

    fn ensure_folder(&self, name: &str, parent: &str) -> Result<bool, StoreError> {
        self.store.ensure_folder(name, parent)
    }

    fn save_file(&self, file: NewFile<'_>) -> Result<FileRecord, StoreError> {
        self.store.save_file(file)
    }
}

#[tokio::test]
async fn scheduled_run_creates_export_with_spreadsheet() {
    let (_tmp, store) = open_store();
    let host = seeded_host();
    let settings = export_settings();

    let report = prepare_export(&host, &store, &settings, at("2024-06-10", 3), PrepareMode::Scheduled)
        .await
        .expect("prepare");
    let export_id = report.export_id().expect("export created").to_string();
    assert!(report
        .messages
        .iter()
        .any(|m| m == "Query returned 2 records."));

    let export = store.get_export(&export_id).unwrap().unwrap();
    assert_eq!(export.status, ExportStatus::Exported);
    assert_eq!(export.departure_date, NaiveDate::from_ymd_opt(2024, 6, 9).unwrap());
    assert_eq!(export.number_of_recipients, 2);
    assert!(export.statistics.starts_with("Total Records: 2\nExport Date: 2024-06-10 03:05:00\n"));

    let url = export.xlsx_file.expect("attachment url");
    let file = store.get_file_by_url(&url).unwrap().expect("file record");
    assert_eq!(file.file_name, "iiq-check-export-2024-06-09.xlsx");
    assert_eq!(file.folder, export_folder());
    assert!(file.is_private);
    assert_eq!(file.attached_to_name.as_deref(), Some(export_id.as_str()));

    let content = store.get_file_content(&file.id).unwrap().expect("content");
    let sheet = read_sheet(&content);
    assert!(sheet.contains("Müller"));
    assert!(sheet.contains("german"));
    assert!(sheet.contains("french"));
    assert!(sheet.contains("2024-06-09"));
    assert!(!sheet.contains("corp@example.com"));
}

#[tokio::test]
async fn second_run_for_same_day_is_skipped() {
    let (_tmp, store) = open_store();
    let host = seeded_host();
    let settings = export_settings();
    let now = at("2024-06-10", 3);

    prepare_export(&host, &store, &settings, now, PrepareMode::Scheduled)
        .await
        .expect("first run");
    let second = prepare_export(&host, &store, &settings, now, PrepareMode::Scheduled)
        .await
        .expect("second run");

    let date = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();
    assert_eq!(second.outcome, PrepareOutcome::Skipped(SkipReason::DuplicateDate(date)));
    assert_eq!(store.count_exports(), 1);

    let interactive = prepare_export(&host, &store, &settings, now, PrepareMode::Interactive).await;
    match interactive {
        Err(ExportError::Skipped(SkipReason::DuplicateDate(d))) => assert_eq!(d, date),
        other => panic!("expected duplicate error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_day_creates_nothing() {
    let (_tmp, store) = open_store();
    let host = seeded_host();
    let settings = export_settings();

    let report = prepare_export(&host, &store, &settings, at("2024-07-01", 3), PrepareMode::Scheduled)
        .await
        .expect("prepare");
    assert_eq!(report.outcome, PrepareOutcome::Skipped(SkipReason::NoRecipients));
    assert_eq!(store.count_exports(), 0);
    assert!(!store.folder_exists("iiq-check", "Home").unwrap());
}

#[tokio::test]
async fn interactive_run_ignores_disabled_job() {
    let (_tmp, store) = open_store();
    let host = seeded_host();
    let mut settings = export_settings();
    settings.enable_job = false;

    let scheduled = prepare_export(&host, &store, &settings, at("2024-06-10", 3), PrepareMode::Scheduled)
        .await
        .expect("scheduled");
    assert_eq!(scheduled.outcome, PrepareOutcome::Skipped(SkipReason::Disabled));

    let interactive = prepare_export(&host, &store, &settings, at("2024-06-10", 9), PrepareMode::Interactive)
        .await
        .expect("interactive");
    assert!(interactive.export_id().is_some());
}

#[tokio::test]
async fn missing_filters_are_reported() {
    let (_tmp, store) = open_store();
    let host = seeded_host();
    let mut settings = export_settings();
    settings.customer_types.clear();

    let err = prepare_export(&host, &store, &settings, at("2024-06-10", 3), PrepareMode::Interactive)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Skipped(SkipReason::MissingCustomerTypes)));
    assert_eq!(err.to_string(), "No customer type selected for export.");
}

#[tokio::test]
async fn concurrent_modification_is_retried_once() {
    let (_tmp, store) = open_store();
    let host = seeded_host();
    let settings = export_settings();
    let repo = ConflictingRepo::new(&store, 1);

    let report = prepare_export(&host, &repo, &settings, at("2024-06-10", 3), PrepareMode::Scheduled)
        .await
        .expect("retry succeeds");
    assert!(report.messages.iter().any(|m| m.ends_with("after retrying")));

    let export = store.get_export(report.export_id().unwrap()).unwrap().unwrap();
    assert_eq!(export.status, ExportStatus::Exported);
    assert!(export.xlsx_file.is_some());
}

#[tokio::test]
async fn second_conflict_fails_and_marks_export() {
    let (_tmp, store) = open_store();
    let host = seeded_host();
    let settings = export_settings();
    let repo = ConflictingRepo::new(&store, 2);

    let err = prepare_export(&host, &repo, &settings, at("2024-06-10", 3), PrepareMode::Scheduled)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::RetryFailed(_)));
    assert!(err.to_string().starts_with("Retry failed:"));

    let date = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();
    let export = store.get_export_by_date(date).unwrap().expect("record kept");
    assert_eq!(export.status, ExportStatus::Failed);
}
