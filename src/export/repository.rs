use chrono::NaiveDate;

use crate::store::operations::exports::ExportRecord;
use crate::store::operations::files::{FileRecord, NewFile};
use crate::store::{Store, StoreError};

/// Persistence needed by export preparation.
pub trait ExportRepository: Send + Sync {
    fn export_for_date(&self, departure_date: NaiveDate) -> Result<Option<ExportRecord>, StoreError>;
    fn create_export(&self, export: &ExportRecord) -> Result<(), StoreError>;
    fn get_export(&self, export_id: &str) -> Result<Option<ExportRecord>, StoreError>;
    fn save_export(&self, export: &ExportRecord) -> Result<ExportRecord, StoreError>;
    fn ensure_folder(&self, name: &str, parent: &str) -> Result<bool, StoreError>;
    fn save_file(&self, file: NewFile<'_>) -> Result<FileRecord, StoreError>;
}

impl ExportRepository for Store {
    fn export_for_date(&self, departure_date: NaiveDate) -> Result<Option<ExportRecord>, StoreError> {
        self.get_export_by_date(departure_date)
    }

    fn create_export(&self, export: &ExportRecord) -> Result<(), StoreError> {
        Store::create_export(self, export)
    }

    fn get_export(&self, export_id: &str) -> Result<Option<ExportRecord>, StoreError> {
        Store::get_export(self, export_id)
    }

    fn save_export(&self, export: &ExportRecord) -> Result<ExportRecord, StoreError> {
        Store::save_export(self, export)
    }

    fn ensure_folder(&self, name: &str, parent: &str) -> Result<bool, StoreError> {
        Store::ensure_folder(self, name, parent)
    }

    fn save_file(&self, file: NewFile<'_>) -> Result<FileRecord, StoreError> {
        Store::save_file(self, file)
    }
}
