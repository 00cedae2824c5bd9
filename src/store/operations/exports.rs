use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Prepared,
    Exported,
    Failed,
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Prepared => "prepared",
            Self::Exported => "exported",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for ExportStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prepared" => Ok(Self::Prepared),
            "exported" => Ok(Self::Exported),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::Validation(format!("unknown export status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub id: String,
    /// Local wall-clock time the export was prepared.
    pub created_on: NaiveDateTime,
    pub departure_date: NaiveDate,
    pub number_of_recipients: u64,
    pub status: ExportStatus,
    #[serde(default)]
    pub statistics: String,
    #[serde(default)]
    pub xlsx_file: Option<String>,
    /// Bumped on every successful write; stale writers get a conflict.
    #[serde(default)]
    pub version: u64,
    pub modified_at: DateTime<Utc>,
}

impl ExportRecord {
    pub fn new(
        created_on: NaiveDateTime,
        departure_date: NaiveDate,
        number_of_recipients: u64,
        statistics: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_on,
            departure_date,
            number_of_recipients,
            status: ExportStatus::Prepared,
            statistics,
            xlsx_file: None,
            version: 0,
            modified_at: Utc::now(),
        }
    }
}

fn export_conflict(id: &str) -> StoreError {
    StoreError::Conflict {
        entity: "export".to_string(),
        key: id.to_string(),
    }
}

fn export_not_found(id: &str) -> StoreError {
    StoreError::NotFound {
        entity: "export".to_string(),
        key: id.to_string(),
    }
}

impl Store {
    /// Insert a new export record. Fails with `Conflict` when a record for the
    /// same departure date already exists; nothing is written in that case.
    pub fn create_export(&self, export: &ExportRecord) -> Result<(), StoreError> {
        let date_key = keys::export_date_key(export.departure_date);

        let cas_result = self
            .export_dates
            .compare_and_swap(
                date_key.as_bytes(),
                None::<&[u8]>,
                Some(export.id.as_bytes().to_vec()),
            )
            .map_err(StoreError::Sled)?;

        if let Err(_current_value) = cas_result {
            return Err(StoreError::Conflict {
                entity: "export_departure_date".to_string(),
                key: date_key,
            });
        }

        let key = keys::export_key(&export.id);
        let bytes = Self::serialize(export)?;
        if let Err(e) = self.exports.insert(key.as_bytes(), bytes) {
            let _ = self.export_dates.remove(date_key.as_bytes());
            return Err(StoreError::Sled(e));
        }
        Ok(())
    }

    pub fn get_export(&self, export_id: &str) -> Result<Option<ExportRecord>, StoreError> {
        let key = keys::export_key(export_id);
        match self.exports.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_export_by_date(
        &self,
        departure_date: NaiveDate,
    ) -> Result<Option<ExportRecord>, StoreError> {
        let date_key = keys::export_date_key(departure_date);
        let Some(id_raw) = self.export_dates.get(date_key.as_bytes())? else {
            return Ok(None);
        };
        let export_id = match String::from_utf8(id_raw.to_vec()) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid UTF-8 in export date index");
                return Ok(None);
            }
        };
        self.get_export(&export_id)
    }

    /// Optimistic write: succeeds only if the stored record still carries
    /// `export.version`. Returns the persisted record with its new version.
    pub fn save_export(&self, export: &ExportRecord) -> Result<ExportRecord, StoreError> {
        let key = keys::export_key(&export.id);
        let current_raw = self
            .exports
            .get(key.as_bytes())?
            .ok_or_else(|| export_not_found(&export.id))?;
        let current: ExportRecord = Self::deserialize(&current_raw)?;
        if current.version != export.version {
            return Err(export_conflict(&export.id));
        }

        let mut next = export.clone();
        next.version = current.version + 1;
        next.modified_at = Utc::now();

        let cas_result = self.exports.compare_and_swap(
            key.as_bytes(),
            Some(&*current_raw),
            Some(Self::serialize(&next)?),
        )?;
        if cas_result.is_err() {
            return Err(export_conflict(&export.id));
        }
        Ok(next)
    }

    /// Append text to the statistics field, retrying on concurrent writers.
    pub fn append_export_statistics(
        &self,
        export_id: &str,
        text: &str,
    ) -> Result<ExportRecord, StoreError> {
        let key = keys::export_key(export_id);
        for _ in 0..MAX_CAS_RETRIES {
            let raw = self
                .exports
                .get(key.as_bytes())?
                .ok_or_else(|| export_not_found(export_id))?;
            let mut record: ExportRecord = Self::deserialize(&raw)?;
            record.statistics.push_str(text);
            record.version += 1;
            record.modified_at = Utc::now();

            let cas_result = self.exports.compare_and_swap(
                key.as_bytes(),
                Some(&*raw),
                Some(Self::serialize(&record)?),
            )?;
            if cas_result.is_ok() {
                return Ok(record);
            }
        }
        Err(StoreError::CasRetryExhausted {
            entity: "export".to_string(),
            key: export_id.to_string(),
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Newest departure date first.
    pub fn list_exports(&self, limit: usize) -> Result<Vec<ExportRecord>, StoreError> {
        let mut out = Vec::new();
        for item in self.export_dates.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (_, id_raw) = item?;
            let Ok(export_id) = String::from_utf8(id_raw.to_vec()) else {
                continue;
            };
            if let Some(export) = self.get_export(&export_id)? {
                out.push(export);
            }
        }
        Ok(out)
    }

    pub fn count_exports(&self) -> usize {
        self.export_dates.len()
    }
}
